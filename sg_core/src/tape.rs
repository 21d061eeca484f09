//! Flat instruction tapes executed by the compiled forward and backward passes.
//!
//! Each instruction is a small `Copy` record that addresses the value and
//! gradient buffers by index. A pass is a straight loop over its tape, so the
//! graph is walked once at compile time and never again.

use crate::error::{Error, Result};
use crate::node::SlotId;
use crate::ops::{BinaryOp, UnaryOp};

/// Location of an operand inside the value/gradient buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Addr {
    /// The operand lives in this slot.
    Direct(usize),
    /// This slot holds the index of the slot the operand lives in.
    Indirect(usize),
}

impl Addr {
    /// Resolve to a concrete buffer index, following one level of indirection.
    #[inline]
    pub(crate) fn resolve(self, values: &[f64]) -> Result<usize> {
        match self {
            Addr::Direct(slot) => Ok(slot),
            Addr::Indirect(slot) => {
                let raw = values[slot];
                let valid = raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0;
                let target = raw as usize;
                if valid && target < values.len() {
                    Ok(target)
                } else {
                    Err(Error::DanglingReference { slot: SlotId(slot) })
                }
            }
        }
    }
}

/// Right-hand operand of a binary instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Arg {
    At(Addr),
    Lit(f64),
}

impl Arg {
    #[inline]
    fn read(self, values: &[f64]) -> Result<f64> {
        match self {
            Arg::At(addr) => Ok(values[addr.resolve(values)?]),
            Arg::Lit(c) => Ok(c),
        }
    }
}

/// One lowered node. The same record drives both passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Instr {
    Binary {
        op: BinaryOp,
        out: usize,
        lhs: Addr,
        rhs: Arg,
    },
    Unary {
        op: UnaryOp,
        out: usize,
        input: Addr,
    },
}

impl Instr {
    /// Compute the output value from the operand values.
    #[inline]
    fn forward(&self, values: &mut [f64]) -> Result<()> {
        match *self {
            Instr::Binary { op, out, lhs, rhs } => {
                let a = values[lhs.resolve(values)?];
                let b = rhs.read(values)?;
                values[out] = op.eval(a, b);
            }
            Instr::Unary { op, out, input } => {
                let x = values[input.resolve(values)?];
                values[out] = op.eval(x);
            }
        }
        Ok(())
    }

    /// Add this node's gradient, scaled by each local partial, into its operands.
    #[inline]
    fn backward(&self, values: &[f64], gradients: &mut [f64]) -> Result<()> {
        match *self {
            Instr::Binary { op, out, lhs, rhs } => {
                let upstream = gradients[out];
                if upstream == 0.0 {
                    return Ok(());
                }
                let lhs_at = lhs.resolve(values)?;
                let a = values[lhs_at];
                let b = rhs.read(values)?;
                let (da, db) = op.partials(a, b, values[out]);
                gradients[lhs_at] += upstream * da;
                if let Arg::At(addr) = rhs {
                    gradients[addr.resolve(values)?] += upstream * db;
                }
            }
            Instr::Unary { op, out, input } => {
                let upstream = gradients[out];
                if upstream == 0.0 {
                    return Ok(());
                }
                let at = input.resolve(values)?;
                gradients[at] += upstream * op.derivative(values[at], values[out]);
            }
        }
        Ok(())
    }
}

/// The two tapes produced by compilation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    /// Instructions in dependency-first order.
    pub(crate) forward: Vec<Instr>,
    /// Instructions in parents-first order.
    pub(crate) backward: Vec<Instr>,
}

impl Program {
    pub(crate) fn run_forward(&self, values: &mut [f64]) -> Result<()> {
        for instr in &self.forward {
            instr.forward(values)?;
        }
        Ok(())
    }

    pub(crate) fn run_backward(&self, values: &[f64], gradients: &mut [f64]) -> Result<()> {
        for instr in &self.backward {
            instr.backward(values, gradients)?;
        }
        Ok(())
    }
}
