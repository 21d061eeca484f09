//! Finite difference utilities for gradient verification.
//!
//! These perturb input values of a compiled graph and re-run the forward pass,
//! which makes them a direct check of the analytic backward pass.

use crate::error::Result;
use crate::node::Var;

/// Compute d(output)/d(input) for each input using central differences.
///
/// The graph containing `output` must already be compiled. Every input is
/// restored to its original value and a final forward pass is run, so the
/// graph is left as it was found.
///
/// # Example
/// ```
/// use sg_core::{finite_diff_grad, Storage};
///
/// // f(x, y) = x * y + x
/// let vs = Storage::new();
/// let x = vs.variable();
/// let y = vs.variable();
/// let f = (&x * &y).add(&x).unwrap();
/// f.compile().unwrap();
/// x.set_value(3.0).unwrap();
/// y.set_value(4.0).unwrap();
///
/// let grads = finite_diff_grad(&f, &[&x, &y], 1e-6).unwrap();
/// assert!((grads[0] - 5.0).abs() < 1e-5); // y + 1
/// assert!((grads[1] - 3.0).abs() < 1e-5); // x
/// ```
pub fn finite_diff_grad(output: &Var, inputs: &[&Var], eps: f64) -> Result<Vec<f64>> {
    let mut grads = Vec::with_capacity(inputs.len());

    for input in inputs {
        let original = input.value()?;

        input.set_value(original + eps)?;
        output.forward()?;
        let f_plus = output.value()?;

        input.set_value(original - eps)?;
        output.forward()?;
        let f_minus = output.value()?;

        input.set_value(original)?;
        grads.push((f_plus - f_minus) / (2.0 * eps));
    }

    output.forward()?;
    Ok(grads)
}

/// Gradients of `output` with respect to `inputs` from one backward pass
/// seeded with `1.0`. Existing gradients are cleared first.
pub fn analytic_grad(output: &Var, inputs: &[&Var]) -> Result<Vec<f64>> {
    output.forward()?;
    output.storage().zero_gradients()?;
    output.set_gradient(1.0)?;
    output.backward()?;
    inputs.iter().map(|input| input.gradient()).collect()
}

/// Compute the maximum absolute difference between two gradient vectors.
pub fn max_grad_error(grad1: &[f64], grad2: &[f64]) -> f64 {
    assert_eq!(grad1.len(), grad2.len());
    grad1
        .iter()
        .zip(grad2.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}
