//! Graph nodes and the [`Var`] handle callers build graphs with.
//!
//! Node structure lives in the storage arena as [`NodeData`]; a `Var` is just
//! the storage handle plus a slot id. Children are stored as slot ids, never
//! as owning references.

use std::fmt;

use crate::compile;
use crate::error::{Error, Result};
use crate::ops::Op;
use crate::storage::Storage;
use crate::tape::Addr;

/// Index of a node's value and gradient in the storage buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// The raw buffer index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    /// Input or parameter; its value is written by the caller.
    Leaf,
    /// Alias whose value slot stores the slot id of `target`.
    Reference { target: Option<SlotId> },
    /// Depends on its children without computing anything.
    Group,
    /// Result of an operator.
    Op(Op),
}

impl NodeKind {
    pub(crate) fn addr(&self, slot: SlotId) -> Addr {
        match self {
            NodeKind::Reference { .. } => Addr::Indirect(slot.index()),
            _ => Addr::Direct(slot.index()),
        }
    }
}

/// Arena entry for one node.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    /// Operand slots, de-duplicated, in insertion order.
    pub(crate) children: Vec<SlotId>,
    pub(crate) label: String,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind, children: Vec<SlotId>, label: impl Into<String>) -> Self {
        NodeData {
            kind,
            children,
            label: label.into(),
        }
    }
}

/// Handle to a node in a computation graph.
///
/// Cloning a `Var` is O(1) and yields another handle to the same node. All
/// value and gradient accessors fail with [`Error::NotCompiled`] until one of
/// the graph's nodes has been compiled.
#[derive(Clone)]
pub struct Var {
    storage: Storage,
    slot: SlotId,
}

impl Var {
    pub(crate) fn from_parts(storage: Storage, slot: SlotId) -> Self {
        Var { storage, slot }
    }

    /// The storage this node is registered in.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// This node's slot id.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Display label used by the dot renderer.
    pub fn label(&self) -> String {
        self.storage.node(self.slot).label.clone()
    }

    /// Replace the display label.
    pub fn set_label(&self, label: impl Into<String>) {
        self.storage.inner.borrow_mut().nodes[self.slot.index()].label = label.into();
    }

    /// Builder form of [`Var::set_label`].
    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.set_label(label);
        self
    }

    /// Direct dependencies of this node.
    pub fn children(&self) -> Vec<Var> {
        self.storage
            .node(self.slot)
            .children
            .iter()
            .map(|&slot| Var::from_parts(self.storage.clone(), slot))
            .collect()
    }

    /// Returns `true` for nodes created with [`Storage::reference`].
    pub fn is_reference(&self) -> bool {
        matches!(self.storage.node(self.slot).kind, NodeKind::Reference { .. })
    }

    /// Compile the graph rooted at this node.
    ///
    /// Only the first compile of a storage has any effect; later calls, from
    /// this node or any other, return `Ok(())` without touching the buffers.
    pub fn compile(&self) -> Result<()> {
        compile::compile(&self.storage, self.slot)
    }

    /// Run the storage's forward pass.
    pub fn forward(&self) -> Result<()> {
        self.storage.forward()
    }

    /// Run the storage's backward pass.
    pub fn backward(&self) -> Result<()> {
        self.storage.backward()
    }

    /// Current value. References read their target's value.
    pub fn value(&self) -> Result<f64> {
        let addr = self.storage.addr_of(self.slot);
        self.storage
            .with_buffers(|values, _| Ok(values[addr.resolve(values)?]))
    }

    /// Overwrite the value. References write their target's value.
    pub fn set_value(&self, value: f64) -> Result<()> {
        let addr = self.storage.addr_of(self.slot);
        self.storage.with_buffers_mut(|values, _| {
            let at = addr.resolve(values)?;
            values[at] = value;
            Ok(())
        })
    }

    /// Accumulated gradient. References read their target's gradient.
    pub fn gradient(&self) -> Result<f64> {
        let addr = self.storage.addr_of(self.slot);
        self.storage
            .with_buffers(|values, gradients| Ok(gradients[addr.resolve(values)?]))
    }

    /// Overwrite the gradient, typically to seed the root before `backward()`.
    pub fn set_gradient(&self, gradient: f64) -> Result<()> {
        let addr = self.storage.addr_of(self.slot);
        self.storage.with_buffers_mut(|values, gradients| {
            gradients[addr.resolve(values)?] = gradient;
            Ok(())
        })
    }

    /// One gradient-descent step: `value -= learning_rate * gradient`.
    pub fn gradient_step(&self, learning_rate: f64) -> Result<()> {
        let addr = self.storage.addr_of(self.slot);
        self.storage.with_buffers_mut(|values, gradients| {
            let at = addr.resolve(values)?;
            values[at] -= learning_rate * gradients[at];
            Ok(())
        })
    }

    /// Point this reference node at `target`.
    ///
    /// Before compilation the target is remembered and written into the
    /// value buffer when it is allocated; afterwards it takes effect
    /// immediately, so the next pass routes through the new target.
    pub fn set_reference(&self, target: &Var) -> Result<()> {
        if !self.storage.same_as(&target.storage) {
            return Err(Error::ForeignNode);
        }
        self.storage.point_reference(self.slot, target.slot)
    }

    /// The node this reference currently points at, if any.
    pub fn target(&self) -> Option<Var> {
        match self.storage.node(self.slot).kind {
            NodeKind::Reference { target } => {
                target.map(|slot| Var::from_parts(self.storage.clone(), slot))
            }
            _ => None,
        }
    }

    /// Render the graph rooted at this node in Graphviz dot format.
    pub fn to_dot(&self) -> Result<String> {
        crate::dot::render(self, &crate::dot::DotOptions::default())
    }

    /// Like [`Var::to_dot`] with custom value/gradient formatting.
    pub fn to_dot_with(&self, options: &crate::dot::DotOptions) -> Result<String> {
        crate::dot::render(self, options)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.storage.same_as(&other.storage)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("slot", &self.slot)
            .field("label", &self.label())
            .finish()
    }
}
