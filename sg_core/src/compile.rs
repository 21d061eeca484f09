//! Graph compiler: lowers a node's dependency closure into the two tapes and
//! allocates the value/gradient buffers.

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{NodeData, NodeKind, SlotId};
use crate::ops::{Op, Source};
use crate::storage::{Compiled, Storage};
use crate::tape::{Arg, Instr, Program};
use crate::topo;

/// Compile the graph rooted at `root` into `storage`.
///
/// Does nothing if the storage is already compiled. On error the storage is
/// left exactly as it was.
pub(crate) fn compile(storage: &Storage, root: SlotId) -> Result<()> {
    if storage.is_compiled() {
        debug!(%root, "storage already compiled; skipping");
        return Ok(());
    }

    let compiled = {
        let inner = storage.inner.borrow();
        let nodes = &inner.nodes;
        let order = topo::backward_order(root, |slot| nodes[slot.index()].children.as_slice())?;

        // Forward runs dependencies first, backward runs parents first.
        let forward: Vec<Instr> = order.iter().rev().filter_map(|&s| lower(nodes, s)).collect();
        let backward: Vec<Instr> = order.iter().filter_map(|&s| lower(nodes, s)).collect();

        let len = nodes.len();
        let mut values = vec![0.0; len];
        for (index, node) in nodes.iter().enumerate() {
            if let NodeKind::Reference { target } = node.kind {
                values[index] = target.map_or(f64::NAN, |t| t.index() as f64);
            }
        }

        debug!(
            %root,
            slots = len,
            reachable = order.len(),
            forward = forward.len(),
            backward = backward.len(),
            "compiled graph"
        );

        Compiled {
            values,
            gradients: vec![0.0; len],
            program: Program { forward, backward },
        }
    };

    storage.inner.borrow_mut().compiled = Some(compiled);

    if !storage.is_compiled() {
        return Err(Error::Internal(
            "storage does not report compiled after compilation".to_string(),
        ));
    }
    Ok(())
}

/// Lower one node into an instruction. Leaves, references and groups have no
/// pass logic of their own.
fn lower(nodes: &[NodeData], slot: SlotId) -> Option<Instr> {
    let addr = |s: SlotId| nodes[s.index()].kind.addr(s);
    match nodes[slot.index()].kind {
        NodeKind::Op(Op::Binary { op, lhs, rhs }) => Some(Instr::Binary {
            op,
            out: slot.index(),
            lhs: addr(lhs),
            rhs: match rhs {
                Source::Slot(s) => Arg::At(addr(s)),
                Source::Const(c) => Arg::Lit(c),
            },
        }),
        NodeKind::Op(Op::Unary { op, input }) => Some(Instr::Unary {
            op,
            out: slot.index(),
            input: addr(input),
        }),
        NodeKind::Leaf | NodeKind::Reference { .. } | NodeKind::Group => None,
    }
}
