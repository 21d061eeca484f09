//! Graphviz rendering of a computation graph, for debugging.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::node::{SlotId, Var};
use crate::topo;

/// Formatting used by [`Var::to_dot_with`] when the graph is compiled.
#[derive(Debug, Clone, Copy)]
pub struct DotOptions {
    pub format_value: fn(f64) -> String,
    pub format_gradient: fn(f64) -> String,
}

impl Default for DotOptions {
    fn default() -> Self {
        DotOptions {
            format_value: |v| format!("{v:.2}"),
            format_gradient: |g| format!("| {g:.2}"),
        }
    }
}

/// Render `root` and its dependency closure as a `digraph`.
///
/// Nodes are numbered in parents-first order, so the root is always `0`.
/// Values and gradients are only shown once the storage is compiled.
pub(crate) fn render(root: &Var, options: &DotOptions) -> Result<String> {
    let storage = root.storage();
    let order = {
        let inner = storage.inner.borrow();
        let nodes = &inner.nodes;
        topo::backward_order(root.slot(), |slot| nodes[slot.index()].children.as_slice())?
    };
    let compiled = storage.is_compiled();
    let graph_ids: HashMap<SlotId, usize> =
        order.iter().enumerate().map(|(i, &slot)| (slot, i)).collect();

    let mut dot = String::from("digraph G {\n");
    let nodes: Vec<Var> = order
        .iter()
        .map(|&slot| Var::from_parts(storage.clone(), slot))
        .collect();

    for (id, node) in nodes.iter().enumerate() {
        let label = escape(&node.label());
        if compiled {
            let value = (options.format_value)(node.value()?);
            let gradient = (options.format_gradient)(node.gradient()?);
            dot.push_str(&format!("{id} [label=\"{label}\\n{value} {gradient}\"]\n"));
        } else {
            dot.push_str(&format!("{id} [label=\"{label}\"]\n"));
        }
    }

    let mut edges = HashSet::new();
    for (id, node) in nodes.iter().enumerate() {
        for child in node.children() {
            let child_id = graph_ids[&child.slot()];
            if edges.insert((id, child_id)) {
                dot.push_str(&format!("{id} -> {child_id}\n"));
            }
        }
    }

    dot.push('}');
    Ok(dot)
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
