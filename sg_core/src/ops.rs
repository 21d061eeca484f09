//! The operator library.
//!
//! Every operator builds a brand-new node; operands are never mutated. Each
//! operation knows how to evaluate itself and its local partial derivatives,
//! which the tape uses to apply the chain rule during the backward pass.

use crate::error::{Error, Result};
use crate::node::{NodeData, NodeKind, SlotId, Var};

/// Configuration for [`Var::parametric_relu`]: `max(min, scale * x + shift)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreluParams {
    pub min: f64,
    pub scale: f64,
    pub shift: f64,
}

impl Default for PreluParams {
    fn default() -> Self {
        PreluParams {
            min: 0.0,
            scale: 1.0,
            shift: 0.0,
        }
    }
}

/// Two-operand operations. The right operand may be a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub(crate) fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    /// Local partials `(d out / d a, d out / d b)`; `out` is the forward result.
    pub(crate) fn partials(self, a: f64, b: f64, out: f64) -> (f64, f64) {
        match self {
            // z = a + b
            BinaryOp::Add => (1.0, 1.0),
            // z = a - b
            BinaryOp::Sub => (1.0, -1.0),
            // z = a * b
            BinaryOp::Mul => (b, a),
            // z = a / b: dz/db = -a / b^2
            BinaryOp::Div => (1.0 / b, -a / (b * b)),
            // z = a^b: dz/db = ln(a) * a^b
            BinaryOp::Pow => (b * a.powf(b - 1.0), out * a.ln()),
        }
    }

    /// Symbol used in node labels.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
        }
    }
}

/// Single-operand operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Abs,
    Exp,
    Log,
    Relu,
    ParametricRelu(PreluParams),
    Sign,
    Elu,
    Sigmoid,
    Tanh,
    Cosh,
    Atan,
    Acos,
}

impl UnaryOp {
    pub(crate) fn eval(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::ParametricRelu(p) => (p.scale * x + p.shift).max(p.min),
            UnaryOp::Sign => sign(x),
            UnaryOp::Elu => {
                if x > 0.0 {
                    x
                } else {
                    x.exp() - 1.0
                }
            }
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Cosh => x.cosh(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Acos => x.acos(),
        }
    }

    /// Local derivative `d out / d x`; `out` is the forward result.
    pub(crate) fn derivative(self, x: f64, out: f64) -> f64 {
        match self {
            UnaryOp::Neg => -1.0,
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
            UnaryOp::Abs => sign(x),
            UnaryOp::Exp => out,
            UnaryOp::Log => 1.0 / x,
            UnaryOp::Relu => step(x > 0.0),
            UnaryOp::ParametricRelu(p) => {
                if p.scale * x + p.shift > p.min {
                    p.scale
                } else {
                    0.0
                }
            }
            // Piecewise constant.
            UnaryOp::Sign => 0.0,
            UnaryOp::Elu => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
            UnaryOp::Sigmoid => out * (1.0 - out),
            UnaryOp::Tanh => 1.0 - out * out,
            UnaryOp::Cosh => x.sinh(),
            UnaryOp::Atan => 1.0 / (1.0 + x * x),
            UnaryOp::Acos => -1.0 / (1.0 - x * x).sqrt(),
        }
    }

    /// Label used by the dot renderer.
    pub fn label(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg()",
            UnaryOp::Sin => "sin()",
            UnaryOp::Cos => "cos()",
            UnaryOp::Abs => "abs()",
            UnaryOp::Exp => "exp()",
            UnaryOp::Log => "log()",
            UnaryOp::Relu => "ReLU()",
            UnaryOp::ParametricRelu(_) => "ParametricReLU()",
            UnaryOp::Sign => "sign()",
            UnaryOp::Elu => "ELU()",
            UnaryOp::Sigmoid => "sigmoid()",
            UnaryOp::Tanh => "tanh()",
            UnaryOp::Cosh => "cosh()",
            UnaryOp::Atan => "atan()",
            UnaryOp::Acos => "acos()",
        }
    }
}

/// `-1`, `0` or `1`; zero maps to zero.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

fn step(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Right operand of an operator as recorded in the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Source {
    Slot(SlotId),
    Const(f64),
}

/// The forward/backward rule a node carries, in terms of slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    Binary {
        op: BinaryOp,
        lhs: SlotId,
        rhs: Source,
    },
    Unary {
        op: UnaryOp,
        input: SlotId,
    },
}

/// Right-hand side accepted by the binary operators: another node or a
/// finite constant.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Node(&'a Var),
    Const(f64),
}

impl<'a> From<&'a Var> for Operand<'a> {
    fn from(var: &'a Var) -> Self {
        Operand::Node(var)
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Const(value)
    }
}

impl From<f32> for Operand<'_> {
    fn from(value: f32) -> Self {
        Operand::Const(value as f64)
    }
}

impl From<i32> for Operand<'_> {
    fn from(value: i32) -> Self {
        Operand::Const(value as f64)
    }
}

fn check_constant(op: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidOperand { op, value })
    }
}

#[allow(clippy::should_implement_trait)]
impl Var {
    fn binary(&self, op: BinaryOp, rhs: Operand<'_>) -> Result<Var> {
        let (rhs, children, label) = match rhs {
            Operand::Node(other) => {
                if !self.storage().same_as(other.storage()) {
                    return Err(Error::ForeignNode);
                }
                let mut children = vec![self.slot()];
                if other.slot() != self.slot() {
                    children.push(other.slot());
                }
                (Source::Slot(other.slot()), children, op.symbol().to_string())
            }
            Operand::Const(value) => {
                let value = check_constant(op.name(), value)?;
                let label = format!("{} {}", op.symbol(), value);
                (Source::Const(value), vec![self.slot()], label)
            }
        };
        let kind = NodeKind::Op(Op::Binary {
            op,
            lhs: self.slot(),
            rhs,
        });
        let slot = self.storage().allocate(NodeData::new(kind, children, label));
        Ok(Var::from_parts(self.storage().clone(), slot))
    }

    fn unary(&self, op: UnaryOp) -> Var {
        let kind = NodeKind::Op(Op::Unary {
            op,
            input: self.slot(),
        });
        let slot = self
            .storage()
            .allocate(NodeData::new(kind, vec![self.slot()], op.label()));
        Var::from_parts(self.storage().clone(), slot)
    }

    // === Binary operations ===

    /// `self + rhs`
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Var> {
        self.binary(BinaryOp::Add, rhs.into())
    }

    /// `self - rhs`
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Var> {
        self.binary(BinaryOp::Sub, rhs.into())
    }

    /// `self * rhs`
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Var> {
        self.binary(BinaryOp::Mul, rhs.into())
    }

    /// `self / rhs`
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Var> {
        self.binary(BinaryOp::Div, rhs.into())
    }

    /// `self ^ rhs`. A node exponent also receives gradient
    /// (`ln(self) * self^rhs`), which requires a positive base.
    pub fn pow<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Var> {
        self.binary(BinaryOp::Pow, rhs.into())
    }

    // === Unary operations ===

    /// `-self`
    pub fn neg(&self) -> Var {
        self.unary(UnaryOp::Neg)
    }

    pub fn sin(&self) -> Var {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> Var {
        self.unary(UnaryOp::Cos)
    }

    /// Absolute value; the gradient at zero is zero.
    pub fn abs(&self) -> Var {
        self.unary(UnaryOp::Abs)
    }

    pub fn exp(&self) -> Var {
        self.unary(UnaryOp::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Var {
        self.unary(UnaryOp::Log)
    }

    /// `max(0, self)`
    pub fn relu(&self) -> Var {
        self.unary(UnaryOp::Relu)
    }

    /// `max(min, scale * self + shift)`. Every parameter must be finite.
    pub fn parametric_relu(&self, params: PreluParams) -> Result<Var> {
        check_constant("parametric_relu", params.min)?;
        check_constant("parametric_relu", params.scale)?;
        check_constant("parametric_relu", params.shift)?;
        Ok(self.unary(UnaryOp::ParametricRelu(params)))
    }

    /// `-1`, `0` or `1`. Passes no gradient.
    pub fn sign(&self) -> Var {
        self.unary(UnaryOp::Sign)
    }

    /// Exponential linear unit with `alpha = 1`.
    pub fn elu(&self) -> Var {
        self.unary(UnaryOp::Elu)
    }

    pub fn sigmoid(&self) -> Var {
        self.unary(UnaryOp::Sigmoid)
    }

    pub fn tanh(&self) -> Var {
        self.unary(UnaryOp::Tanh)
    }

    pub fn cosh(&self) -> Var {
        self.unary(UnaryOp::Cosh)
    }

    pub fn atan(&self) -> Var {
        self.unary(UnaryOp::Atan)
    }

    /// Arc cosine; the gradient is only finite on `(-1, 1)`.
    pub fn acos(&self) -> Var {
        self.unary(UnaryOp::Acos)
    }
}

// === Operator overloads ===
//
// These only combine nodes of the same storage; mixing storages is a
// programmer error and panics. Use the named methods for a `Result`.

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Var> for &Var {
            type Output = Var;

            fn $method(self, rhs: &Var) -> Var {
                assert!(
                    self.storage().same_as(rhs.storage()),
                    "cannot combine nodes from different storages"
                );
                match self.binary($op, Operand::Node(rhs)) {
                    Ok(var) => var,
                    Err(err) => panic!("{err}"),
                }
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);

impl std::ops::Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        self.unary(UnaryOp::Neg)
    }
}
