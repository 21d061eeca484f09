//! # sg_core - Compiled Reverse-mode Automatic Differentiation
//!
//! This crate builds graphs of scalar operations and compiles them into two
//! flat instruction tapes: a forward pass that evaluates every node and a
//! backward pass that accumulates gradients with the chain rule. Both passes
//! run over pre-allocated, slot-indexed `f64` buffers, so the graph is walked
//! once at compile time instead of on every evaluation.
//!
//! ## Quick Start
//!
//! ```
//! use sg_core::Storage;
//!
//! let vs = Storage::new();
//! let a = vs.variable().with_label("a");
//! let b = vs.variable().with_label("b");
//!
//! // f = (a + b) * a
//! let f = &(&a + &b) * &a;
//! f.compile().unwrap();
//!
//! a.set_value(2.0).unwrap();
//! b.set_value(3.0).unwrap();
//! f.forward().unwrap();
//! assert_eq!(f.value().unwrap(), 10.0);
//!
//! f.set_gradient(1.0).unwrap();
//! f.backward().unwrap();
//! assert_eq!(a.gradient().unwrap(), 7.0); // 2a + b
//! assert_eq!(b.gradient().unwrap(), 2.0); // a
//! ```
//!
//! ## Lifecycle
//!
//! 1. Create a [`Storage`] and register leaves with [`Storage::variable`].
//! 2. Combine nodes with the operator methods on [`Var`].
//! 3. Call [`Var::compile`] on the root. This fixes the slot count and
//!    allocates the buffers; it happens once per storage.
//! 4. Write inputs, run [`Var::forward`], seed the root gradient, run
//!    [`Var::backward`], read gradients.
//!
//! Backward passes add into the gradient buffer. Clear it with
//! [`Storage::zero_gradients`] between independent passes.
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Arithmetic | [`Var::add`], [`Var::sub`], [`Var::mul`], [`Var::div`], [`Var::neg`], `+ - * /` on `&Var` |
//! | Power | [`Var::pow`] (node or constant exponent) |
//! | Transcendental | [`Var::exp`], [`Var::log`], [`Var::sin`], [`Var::cos`], [`Var::cosh`], [`Var::atan`], [`Var::acos`] |
//! | Activations | [`Var::relu`], [`Var::parametric_relu`], [`Var::elu`], [`Var::sigmoid`], [`Var::tanh`], [`Var::abs`], [`Var::sign`] |
//!
//! ## Reference nodes
//!
//! A node created with [`Storage::reference`] stores another node's slot id
//! instead of a value. Anything computed from it reads the target's value and
//! sends gradient to the target, and the target can be switched between
//! passes without recompiling:
//!
//! ```
//! use sg_core::Storage;
//!
//! let vs = Storage::new();
//! let p0 = vs.variable();
//! let p1 = vs.variable();
//! let picked = vs.reference();
//! let loss = picked.log().neg();
//! loss.compile().unwrap();
//!
//! p0.set_value(0.25).unwrap();
//! p1.set_value(0.75).unwrap();
//!
//! picked.set_reference(&p1).unwrap();
//! loss.forward().unwrap();
//! loss.set_gradient(1.0).unwrap();
//! loss.backward().unwrap();
//! assert!((p1.gradient().unwrap() + 1.0 / 0.75).abs() < 1e-12);
//! assert_eq!(p0.gradient().unwrap(), 0.0);
//! ```
//!
//! A plain reference only accepts leaves as targets. When the possible targets
//! are computed nodes, create the reference with [`Storage::reference_among`].
//! Listing the candidates orders both tapes around them, so a candidate is
//! evaluated before the reference is read and its gradient is complete before
//! it propagates further.

mod compile;
mod dot;
mod error;
mod finite_diff;
mod node;
mod ops;
mod storage;
mod tape;
pub mod topo;

pub use dot::DotOptions;
pub use error::{Error, Result};
pub use finite_diff::{analytic_grad, finite_diff_grad, max_grad_error};
pub use node::{SlotId, Var};
pub use ops::{BinaryOp, Operand, PreluParams, UnaryOp};
pub use storage::Storage;
