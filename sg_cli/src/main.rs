//! CLI demo for the compiled autodiff engine.
//!
//! Builds a few graphs, runs the compiled forward/backward passes, validates
//! the gradients against finite differences and trains a small model with
//! plain gradient descent.

use clap::Parser;
use tracing::{debug, info, Level};

use sg_core::{analytic_grad, finite_diff_grad, max_grad_error, Result, Storage, Var};

#[derive(Parser, Debug)]
#[command(name = "slotgrad")]
#[command(about = "Compile scalar graphs into forward/backward tapes and differentiate them")]
struct Cli {
    /// Gradient descent steps for the training demo
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Learning rate for the training demo
    #[arg(long, default_value_t = 0.02)]
    learning_rate: f64,

    /// Maximum tolerated |autodiff - finite difference| error
    #[arg(long, default_value_t = 1e-5)]
    tolerance: f64,

    /// Print the graphs in Graphviz dot format
    #[arg(long)]
    dot: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}

/// Runs every demo; returns `false` if a gradient check failed.
fn run(cli: &Cli) -> Result<bool> {
    println!("=== Compiled Reverse-Mode Autodiff Demo ===\n");
    let passed = gradient_check(cli)?;
    reference_demo(cli)?;
    training_demo(cli)?;
    Ok(passed)
}

fn gradient_check(cli: &Cli) -> Result<bool> {
    // z = (x*y + sin(x)) / (y + 2)
    let vs = Storage::new();
    let x = vs.variable().with_label("x");
    let y = vs.variable().with_label("y");
    let numerator = &(&x * &y) + &x.sin();
    let z = numerator.div(&y.add(2.0)?)?;
    z.compile()?;
    debug!(slots = vs.len(), "compiled gradient-check graph");

    let (x_val, y_val) = (1.5, 2.5);
    x.set_value(x_val)?;
    y.set_value(y_val)?;

    let grads = analytic_grad(&z, &[&x, &y])?;
    println!("Expression: z = (x*y + sin(x)) / (y + 2)");
    println!("At point:   x = {}, y = {}", x_val, y_val);
    println!("Value:      z = {:.10}\n", z.value()?);

    println!("Autodiff gradients:");
    println!("  dz/dx = {:.10}", grads[0]);
    println!("  dz/dy = {:.10}\n", grads[1]);

    let fd_grads = finite_diff_grad(&z, &[&x, &y], 1e-7)?;
    println!("Finite difference gradients (eps=1e-7):");
    println!("  dz/dx = {:.10}", fd_grads[0]);
    println!("  dz/dy = {:.10}\n", fd_grads[1]);

    let max_err = max_grad_error(&grads, &fd_grads);
    let passed = max_err < cli.tolerance;
    if passed {
        println!("PASS: Max error ({:.2e}) < tolerance ({:.2e})\n", max_err, cli.tolerance);
    } else {
        println!("FAIL: Max error ({:.2e}) >= tolerance ({:.2e})\n", max_err, cli.tolerance);
    }

    if cli.dot {
        // Re-seed so the rendered gradients belong to z alone.
        analytic_grad(&z, &[])?;
        println!("{}\n", z.to_dot()?);
    }
    Ok(passed)
}

fn reference_demo(cli: &Cli) -> Result<()> {
    println!("=== Reference node: log-loss of the true class ===\n");
    let vs = Storage::new();
    let logits: Vec<Var> = (0..3)
        .map(|i| vs.variable().with_label(format!("logit{i}")))
        .collect();
    let probs: Vec<Var> = logits.iter().map(|l| l.sigmoid()).collect();
    let candidates: Vec<&Var> = probs.iter().collect();
    let picked = vs.reference_among(&candidates)?.with_label("true class");
    let loss = picked.log().neg().with_label("loss");
    loss.compile()?;

    for (logit, value) in logits.iter().zip([0.5, -1.0, 2.0]) {
        logit.set_value(value)?;
    }

    for (class, prob) in probs.iter().enumerate() {
        picked.set_reference(prob)?;
        vs.zero_gradients()?;
        loss.forward()?;
        loss.set_gradient(1.0)?;
        loss.backward()?;

        let grads = logits
            .iter()
            .map(|l| l.gradient().map(|g| format!("{g:+.4}")))
            .collect::<Result<Vec<_>>>()?;
        println!(
            "  class {class}: loss = {:.4}, d loss / d logits = [{}]",
            loss.value()?,
            grads.join(", ")
        );
    }
    println!();

    if cli.dot {
        println!("{}\n", loss.to_dot()?);
    }
    Ok(())
}

fn training_demo(cli: &Cli) -> Result<()> {
    println!("=== Gradient descent: fit y = 2x - 1 ===\n");
    let vs = Storage::new();
    let w = vs.variable().with_label("w");
    let b = vs.variable().with_label("b");

    let mut loss: Option<Var> = None;
    for x in [-1.0, 0.0, 1.0, 2.0, 3.0] {
        let target = 2.0 * x - 1.0;
        let residual = w.mul(x)?.add(&b)?.sub(target)?;
        let term = residual.pow(2)?;
        loss = Some(match loss {
            Some(acc) => &acc + &term,
            None => term,
        });
    }
    let Some(loss) = loss else {
        return Ok(());
    };
    let loss = loss.with_label("loss");
    loss.compile()?;

    for step in 0..cli.steps {
        loss.forward()?;
        vs.zero_gradients()?;
        loss.set_gradient(1.0)?;
        loss.backward()?;
        if step % 50 == 0 {
            info!(step, loss = loss.value()?, "training");
        }
        w.gradient_step(cli.learning_rate)?;
        b.gradient_step(cli.learning_rate)?;
    }
    loss.forward()?;

    println!("  after {} steps (lr = {}):", cli.steps, cli.learning_rate);
    println!("  w = {:.6} (expected 2)", w.value()?);
    println!("  b = {:.6} (expected -1)", b.value()?);
    println!("  loss = {:.3e}", loss.value()?);
    Ok(())
}
