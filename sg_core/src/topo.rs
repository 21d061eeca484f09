//! Non-recursive topological ordering of a node's dependency closure.
//!
//! The sort is Kahn's algorithm driven by parent counts: a first pass
//! discovers every node reachable from the root and counts how many of its
//! parents are reachable too; the second pass emits a node once all of its
//! parents have been emitted. The result lists every node before its
//! children, which is the order the backward pass needs. Reversing it gives
//! the forward order.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::error::{Error, Result};
use crate::node::SlotId;

/// Order the closure of `root` so every node precedes all of its children.
///
/// `children` returns the direct dependencies of a node. Ties between nodes
/// that become ready together are broken by discovery order, so the result
/// is stable for a fixed graph shape. A cycle leaves some nodes with pending
/// parents forever and is reported as [`Error::Cycle`].
pub fn backward_order<'a, F>(root: SlotId, children: F) -> Result<Vec<SlotId>>
where
    F: Fn(SlotId) -> &'a [SlotId],
{
    // Pass 1: discover the closure and count reachable parents.
    let mut pending: HashMap<SlotId, usize> = HashMap::new();
    let mut discovered = vec![root];
    pending.insert(root, 0);

    let mut cursor = 0;
    while cursor < discovered.len() {
        let node = discovered[cursor];
        cursor += 1;
        for &child in children(node) {
            match pending.entry(child) {
                Entry::Occupied(mut count) => *count.get_mut() += 1,
                Entry::Vacant(slot) => {
                    slot.insert(1);
                    discovered.push(child);
                }
            }
        }
    }

    // Pass 2: emit nodes whose parents have all been emitted.
    let mut order = Vec::with_capacity(discovered.len());
    let mut ready = VecDeque::new();
    if pending[&root] == 0 {
        ready.push_back(root);
    }
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &child in children(node) {
            if let Some(count) = pending.get_mut(&child) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(child);
                }
            }
        }
    }

    if order.len() != discovered.len() {
        return Err(Error::Cycle {
            remaining: discovered.len() - order.len(),
        });
    }
    trace!(nodes = order.len(), "topological order computed");
    Ok(order)
}

/// Dependency-first order: every node after all of its children.
pub fn forward_order<'a, F>(root: SlotId, children: F) -> Result<Vec<SlotId>>
where
    F: Fn(SlotId) -> &'a [SlotId],
{
    let mut order = backward_order(root, children)?;
    order.reverse();
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[&[usize]]) -> Vec<Vec<SlotId>> {
        edges
            .iter()
            .map(|children| children.iter().map(|&c| SlotId(c)).collect())
            .collect()
    }

    fn position(order: &[SlotId], slot: usize) -> usize {
        order.iter().position(|&s| s == SlotId(slot)).unwrap()
    }

    #[test]
    fn test_diamond_order() {
        // 0 = a, 1 = b, 2 = a + b, 3 = (a + b) * a
        let g = graph(&[&[], &[], &[0, 1], &[2, 0]]);
        let order = backward_order(SlotId(3), |s| g[s.index()].as_slice()).unwrap();
        assert_eq!(order, vec![SlotId(3), SlotId(2), SlotId(0), SlotId(1)]);

        let forward = forward_order(SlotId(3), |s| g[s.index()].as_slice()).unwrap();
        assert_eq!(forward, vec![SlotId(1), SlotId(0), SlotId(2), SlotId(3)]);
    }

    #[test]
    fn test_children_precede_parents_in_forward_order() {
        // 4 depends on 3 and 1; 3 on 2; 2 on 0 and 1.
        let g = graph(&[&[], &[], &[0, 1], &[2], &[3, 1]]);
        let order = forward_order(SlotId(4), |s| g[s.index()].as_slice()).unwrap();
        assert_eq!(order.len(), 5);
        for (parent, children) in g.iter().enumerate() {
            for child in children {
                assert!(position(&order, child.index()) < position(&order, parent));
            }
        }
    }

    #[test]
    fn test_only_reachable_nodes() {
        // Node 1 is not reachable from node 2.
        let g = graph(&[&[], &[], &[0]]);
        let order = backward_order(SlotId(2), |s| g[s.index()].as_slice()).unwrap();
        assert_eq!(order, vec![SlotId(2), SlotId(0)]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        // 0 -> 1 -> 2 -> 1
        let g = graph(&[&[1], &[2], &[1]]);
        let err = backward_order(SlotId(0), |s| g[s.index()].as_slice()).unwrap_err();
        assert_eq!(err, Error::Cycle { remaining: 2 });
    }

    #[test]
    fn test_cycle_through_root_is_rejected() {
        let g = graph(&[&[1], &[0]]);
        let err = backward_order(SlotId(0), |s| g[s.index()].as_slice()).unwrap_err();
        assert_eq!(err, Error::Cycle { remaining: 2 });

        let self_loop = graph(&[&[0]]);
        let err = backward_order(SlotId(0), |s| self_loop[s.index()].as_slice()).unwrap_err();
        assert_eq!(err, Error::Cycle { remaining: 1 });
    }

    #[test]
    fn test_order_is_deterministic() {
        let g = graph(&[&[], &[0], &[0], &[1, 2], &[3, 0]]);
        let first = backward_order(SlotId(4), |s| g[s.index()].as_slice()).unwrap();
        for _ in 0..10 {
            let again = backward_order(SlotId(4), |s| g[s.index()].as_slice()).unwrap();
            assert_eq!(first, again);
        }
    }
}
