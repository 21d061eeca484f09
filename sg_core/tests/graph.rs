//! End-to-end behaviour of compiled graphs: lifecycle, references,
//! visualization and training.

use sg_core::{DotOptions, Error, Storage};

#[test]
fn test_scenario_sum_times_operand() {
    let vs = Storage::new();
    let a = vs.variable();
    let b = vs.variable();
    let f = &(&a + &b) * &a;
    f.compile().unwrap();

    a.set_value(2.0).unwrap();
    b.set_value(3.0).unwrap();
    f.forward().unwrap();
    assert_eq!(f.value().unwrap(), 10.0);

    f.set_gradient(1.0).unwrap();
    f.backward().unwrap();
    assert_eq!(a.gradient().unwrap(), 7.0);
    assert_eq!(b.gradient().unwrap(), 2.0);
}

#[test]
fn test_scenario_divide_by_constant() {
    let vs = Storage::new();
    let a = vs.variable();
    let out = a.div(3.0).unwrap();
    out.compile().unwrap();
    a.set_value(2.0).unwrap();
    out.forward().unwrap();
    assert!((out.value().unwrap() - 0.667).abs() < 1e-3);

    out.set_gradient(2.0).unwrap();
    out.backward().unwrap();
    assert!((a.gradient().unwrap() - 0.667).abs() < 1e-3);
}

#[test]
fn test_scenario_power_of_variables() {
    let vs = Storage::new();
    let a = vs.variable();
    let b = vs.variable();
    let out = a.pow(&b).unwrap();
    out.compile().unwrap();
    a.set_value(2.0).unwrap();
    b.set_value(3.0).unwrap();
    out.forward().unwrap();
    assert_eq!(out.value().unwrap(), 8.0);

    out.set_gradient(2.0).unwrap();
    out.backward().unwrap();
    assert!((a.gradient().unwrap() - 24.0).abs() < 1e-10);
    assert!((b.gradient().unwrap() - 11.09).abs() < 1e-2);
}

#[test]
fn test_scenario_dot_output() {
    let vs = Storage::new();
    let a = vs.variable().with_label("a");
    let b = vs.variable().with_label("b");
    let f = &(&a + &b) * &a;
    f.compile().unwrap();

    a.set_value(2.0).unwrap();
    b.set_value(3.0).unwrap();
    f.forward().unwrap();
    f.set_gradient(1.0).unwrap();
    f.backward().unwrap();

    assert_eq!(
        f.to_dot().unwrap(),
        r#"digraph G {
0 [label="*\n10.00 | 1.00"]
1 [label="+\n5.00 | 2.00"]
2 [label="a\n2.00 | 7.00"]
3 [label="b\n3.00 | 2.00"]
0 -> 1
0 -> 2
1 -> 2
1 -> 3
}"#
    );
}

#[test]
fn test_dot_custom_formatting() {
    let vs = Storage::new();
    let a = vs.variable().with_label("a");
    let f = a.exp();
    f.compile().unwrap();
    f.forward().unwrap();

    let options = DotOptions {
        format_value: |v| format!("{v:.1}"),
        format_gradient: |g| format!("(grad {g})"),
    };
    assert_eq!(
        f.to_dot_with(&options).unwrap(),
        "digraph G {\n0 [label=\"exp()\\n1.0 (grad 0)\"]\n1 [label=\"a\\n0.0 (grad 0)\"]\n0 -> 1\n}"
    );
}

#[test]
fn test_reference_routes_gradient_to_target() {
    let vs = Storage::new();
    let a = vs.variable();
    let b = vs.variable();
    let a_ref = vs.reference();

    let out = b.mul(&a_ref).unwrap();
    out.compile().unwrap();
    a_ref.set_reference(&a).unwrap();
    a_ref.set_value(2.0).unwrap();
    b.set_value(3.0).unwrap();

    // The write went through to `a`; the reference slot only holds a's id.
    assert_eq!(a.value().unwrap(), 2.0);
    assert_eq!(a_ref.value().unwrap(), 2.0);
    assert_eq!(vs.slot_value(a_ref.slot()).unwrap(), a.slot().index() as f64);

    out.forward().unwrap();
    assert_eq!(out.value().unwrap(), 6.0);

    out.set_gradient(2.0).unwrap();
    out.backward().unwrap();
    assert_eq!(out.gradient().unwrap(), 2.0);
    assert_eq!(a.gradient().unwrap(), 3.0 * 2.0);
    assert_eq!(b.gradient().unwrap(), 2.0 * 2.0);
    assert_eq!(vs.slot_gradient(a_ref.slot()).unwrap(), 0.0);
}

#[test]
fn test_reference_can_be_retargeted_between_passes() {
    // Log-loss that picks the probability of the true class at runtime.
    let vs = Storage::new();
    let p0 = vs.variable();
    let p1 = vs.variable();
    let picked = vs.reference();
    picked.set_reference(&p0).unwrap();
    let loss = picked.log().neg();
    loss.compile().unwrap();

    p0.set_value(0.2).unwrap();
    p1.set_value(0.8).unwrap();

    loss.forward().unwrap();
    assert!((loss.value().unwrap() + 0.2_f64.ln()).abs() < 1e-12);
    loss.set_gradient(1.0).unwrap();
    loss.backward().unwrap();
    assert!((p0.gradient().unwrap() + 5.0).abs() < 1e-12);
    assert_eq!(p1.gradient().unwrap(), 0.0);

    picked.set_reference(&p1).unwrap();
    assert_eq!(picked.target(), Some(p1.clone()));
    vs.zero_gradients().unwrap();
    loss.forward().unwrap();
    assert!((loss.value().unwrap() + 0.8_f64.ln()).abs() < 1e-12);
    loss.set_gradient(1.0).unwrap();
    loss.backward().unwrap();
    assert_eq!(p0.gradient().unwrap(), 0.0);
    assert!((p1.gradient().unwrap() + 1.25).abs() < 1e-12);
}

#[test]
fn test_reference_to_computed_node_reaches_its_operands() {
    // loss = -log(sigmoid(logit_k)) for a runtime-chosen k.
    let vs = Storage::new();
    let logits = [vs.variable(), vs.variable()];
    let probs = [logits[0].sigmoid(), logits[1].sigmoid()];
    let picked = vs.reference_among(&[&probs[0], &probs[1]]).unwrap();
    let loss = picked.log().neg();
    loss.compile().unwrap();
    logits[0].set_value(0.5).unwrap();
    logits[1].set_value(-1.0).unwrap();

    for k in 0..2 {
        picked.set_reference(&probs[k]).unwrap();
        vs.zero_gradients().unwrap();
        loss.forward().unwrap();
        loss.set_gradient(1.0).unwrap();
        loss.backward().unwrap();

        // d/dz -log(sigmoid(z)) = sigmoid(z) - 1
        let expected = probs[k].value().unwrap() - 1.0;
        assert!((logits[k].gradient().unwrap() - expected).abs() < 1e-12);
        assert_eq!(logits[1 - k].gradient().unwrap(), 0.0);
    }
}

#[test]
fn test_reference_shares_a_computed_node_with_its_consumers() {
    // loss = s + log(s) with s = sigmoid(x), the second term read through a
    // reference. d loss / dx = (1 - s) * (1 + s).
    let vs = Storage::new();
    let x = vs.variable();
    let s = x.sigmoid();

    let unlisted = vs.reference();
    assert_eq!(
        unlisted.set_reference(&s),
        Err(Error::UnorderedTarget {
            slot: unlisted.slot(),
            target: s.slot()
        })
    );

    let r = vs.reference_among(&[&s]).unwrap();
    r.set_reference(&s).unwrap();
    let loss = &s + &r.log();
    loss.compile().unwrap();
    x.set_value(0.5).unwrap();

    loss.forward().unwrap();
    let sv = 1.0 / (1.0 + (-0.5_f64).exp());
    assert!((loss.value().unwrap() - (sv + sv.ln())).abs() < 1e-12);
    assert!((loss.value().unwrap() - 0.1484).abs() < 1e-4);

    loss.set_gradient(1.0).unwrap();
    loss.backward().unwrap();
    assert!((x.gradient().unwrap() - (1.0 - sv * sv)).abs() < 1e-12);
    assert!((x.gradient().unwrap() - 0.6125).abs() < 1e-4);
}

#[test]
fn test_unset_reference_fails_the_pass() {
    let vs = Storage::new();
    let x = vs.reference();
    let y = x.exp();
    y.compile().unwrap();
    assert_eq!(
        y.forward(),
        Err(Error::DanglingReference { slot: x.slot() })
    );
}

#[test]
fn test_forward_is_deterministic() {
    let vs = Storage::new();
    let x = vs.variable();
    let y = vs.variable();
    let f = &(&x.sin() * &y.exp()) / &x.add(&y).unwrap().sigmoid();
    f.compile().unwrap();
    x.set_value(0.3).unwrap();
    y.set_value(-1.2).unwrap();

    f.forward().unwrap();
    let first = f.value().unwrap();
    for _ in 0..5 {
        f.forward().unwrap();
        assert_eq!(f.value().unwrap().to_bits(), first.to_bits());
    }
}

#[test]
fn test_compile_twice_keeps_state() {
    let vs = Storage::new();
    let x = vs.variable();
    let f = x.mul(&x).unwrap();
    f.compile().unwrap();
    x.set_value(5.0).unwrap();
    f.forward().unwrap();
    let slots = vs.len();

    f.compile().unwrap();
    x.compile().unwrap();
    assert!(vs.is_compiled());
    assert_eq!(vs.len(), slots);
    assert_eq!(x.value().unwrap(), 5.0);
    assert_eq!(f.value().unwrap(), 25.0);
}

#[test]
fn test_use_before_compile_fails() {
    let vs = Storage::new();
    let x = vs.variable();
    let f = x.cos();
    assert_eq!(f.forward(), Err(Error::NotCompiled));
    assert_eq!(f.backward(), Err(Error::NotCompiled));
    assert_eq!(x.set_value(1.0), Err(Error::NotCompiled));
    assert_eq!(f.value(), Err(Error::NotCompiled));
    assert!(Error::NotCompiled.to_string().contains("compile()"));

    // The dot renderer still works without values.
    assert_eq!(
        f.to_dot().unwrap(),
        "digraph G {\n0 [label=\"cos()\"]\n1 [label=\"var\"]\n0 -> 1\n}"
    );
}

#[test]
fn test_gradient_descent_fits_a_line() {
    // Minimise sum_i (w * x_i + b - y_i)^2 for y = 2x - 1.
    let vs = Storage::new();
    let w = vs.variable();
    let b = vs.variable();
    let mut terms = Vec::new();
    for x in [-1.0, 0.0, 1.0, 2.0] {
        let y = 2.0 * x - 1.0;
        let residual = w.mul(x).unwrap().add(&b).unwrap().sub(y).unwrap();
        terms.push(&residual * &residual);
    }
    let loss = terms
        .iter()
        .skip(1)
        .fold(terms[0].clone(), |acc, term| &acc + term);
    loss.compile().unwrap();

    let mut previous = f64::INFINITY;
    for _ in 0..200 {
        loss.forward().unwrap();
        let current = loss.value().unwrap();
        assert!(current <= previous);
        previous = current;

        vs.zero_gradients().unwrap();
        loss.set_gradient(1.0).unwrap();
        loss.backward().unwrap();
        w.gradient_step(0.05).unwrap();
        b.gradient_step(0.05).unwrap();
    }
    assert!((w.value().unwrap() - 2.0).abs() < 1e-3);
    assert!((b.value().unwrap() + 1.0).abs() < 1e-3);
}
