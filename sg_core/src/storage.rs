//! Slot allocation and the flat value/gradient buffers.
//!
//! A [`Storage`] is the arena every node of one graph registers against. Node
//! handles ([`Var`]) only carry a [`SlotId`]; the graph structure lives in
//! the arena and the numeric data lives in two `Vec<f64>` buffers that are
//! created when the graph is compiled.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::node::{NodeData, NodeKind, SlotId, Var};
use crate::tape::{Addr, Program};

/// Buffers and tapes that exist only after compilation.
#[derive(Debug)]
pub(crate) struct Compiled {
    pub(crate) values: Vec<f64>,
    pub(crate) gradients: Vec<f64>,
    pub(crate) program: Program,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    /// Node arena, indexed by slot.
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) compiled: Option<Compiled>,
}

/// Shared handle to one graph's node arena and numeric buffers.
///
/// Cloning a `Storage` is cheap and yields another handle to the same graph.
/// Every node created through a storage keeps a handle to it, so the buffers
/// live as long as any node does.
#[derive(Clone, Default)]
pub struct Storage {
    pub(crate) inner: Rc<RefCell<Inner>>,
}

impl Storage {
    /// Create an empty, uncompiled storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new leaf node (an input or parameter).
    pub fn variable(&self) -> Var {
        let slot = self.allocate(NodeData::new(NodeKind::Leaf, Vec::new(), "var"));
        Var::from_parts(self.clone(), slot)
    }

    /// Create a reference node. Point it at a leaf with
    /// [`Var::set_reference`] before running a pass that reads it.
    ///
    /// Computed targets are rejected with [`Error::UnorderedTarget`]; use
    /// [`Storage::reference_among`] for those.
    pub fn reference(&self) -> Var {
        let kind = NodeKind::Reference { target: None };
        let slot = self.allocate(NodeData::new(kind, Vec::new(), "Ref(var)"));
        Var::from_parts(self.clone(), slot)
    }

    /// Create a reference node restricted to `candidates`.
    ///
    /// The candidates become the reference's children, so the compiled tapes
    /// evaluate every candidate before the reference is read and propagate a
    /// candidate's gradient only after everything reading the reference has
    /// contributed to it. Use this whenever a possible target is itself
    /// computed from other nodes.
    pub fn reference_among(&self, candidates: &[&Var]) -> Result<Var> {
        let mut children = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !self.same_as(candidate.storage()) {
                return Err(Error::ForeignNode);
            }
            if candidate.is_reference() {
                return Err(Error::NestedReference(candidate.slot()));
            }
            if !children.contains(&candidate.slot()) {
                children.push(candidate.slot());
            }
        }
        let kind = NodeKind::Reference { target: None };
        let slot = self.allocate(NodeData::new(kind, children, "Ref(var)"));
        Ok(Var::from_parts(self.clone(), slot))
    }

    /// Create a node that depends on `members` but computes nothing.
    ///
    /// Compiling a group compiles every member, which is how several outputs
    /// share one pair of passes.
    pub fn group(&self, members: &[&Var]) -> Result<Var> {
        let mut children = Vec::with_capacity(members.len());
        for member in members {
            if !self.same_as(member.storage()) {
                return Err(Error::ForeignNode);
            }
            if !children.contains(&member.slot()) {
                children.push(member.slot());
            }
        }
        let slot = self.allocate(NodeData::new(NodeKind::Group, children, "group"));
        Ok(Var::from_parts(self.clone(), slot))
    }

    /// Register a node and return its slot.
    ///
    /// # Panics
    ///
    /// Panics if the storage has already been compiled; its slot count is
    /// fixed at that point.
    pub(crate) fn allocate(&self, data: NodeData) -> SlotId {
        let mut inner = self.inner.borrow_mut();
        assert!(
            inner.compiled.is_none(),
            "cannot add node `{}` to a storage that is already compiled",
            data.label
        );
        let slot = SlotId(inner.nodes.len());
        trace!(%slot, label = %data.label, "allocated slot");
        inner.nodes.push(data);
        slot
    }

    /// Number of slots handed out so far.
    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// Returns `true` if no node has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once both buffers exist.
    pub fn is_compiled(&self) -> bool {
        self.inner.borrow().compiled.is_some()
    }

    /// Run the compiled forward pass.
    pub fn forward(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let compiled = inner.compiled.as_mut().ok_or(Error::NotCompiled)?;
        compiled.program.run_forward(&mut compiled.values)
    }

    /// Run the compiled backward pass.
    ///
    /// Gradients are accumulated on top of whatever the buffer already holds;
    /// call [`Storage::zero_gradients`] between independent passes.
    pub fn backward(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let compiled = inner.compiled.as_mut().ok_or(Error::NotCompiled)?;
        compiled
            .program
            .run_backward(&compiled.values, &mut compiled.gradients)
    }

    /// Reset every gradient slot to zero.
    pub fn zero_gradients(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let compiled = inner.compiled.as_mut().ok_or(Error::NotCompiled)?;
        compiled.gradients.fill(0.0);
        Ok(())
    }

    /// Raw read of a value slot, without following references.
    ///
    /// A slot this storage never handed out is reported as
    /// [`Error::ForeignNode`].
    pub fn slot_value(&self, slot: SlotId) -> Result<f64> {
        self.with_buffers(|values, _| {
            values
                .get(slot.index())
                .copied()
                .ok_or(Error::ForeignNode)
        })
    }

    /// Raw read of a gradient slot, without following references.
    pub fn slot_gradient(&self, slot: SlotId) -> Result<f64> {
        self.with_buffers(|_, gradients| {
            gradients
                .get(slot.index())
                .copied()
                .ok_or(Error::ForeignNode)
        })
    }

    pub(crate) fn same_as(&self, other: &Storage) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn node(&self, slot: SlotId) -> Ref<'_, NodeData> {
        Ref::map(self.inner.borrow(), |inner| &inner.nodes[slot.index()])
    }

    /// Where the data for `slot` lives: references go through their own slot.
    pub(crate) fn addr_of(&self, slot: SlotId) -> Addr {
        self.node(slot).kind.addr(slot)
    }

    pub(crate) fn with_buffers<R>(
        &self,
        f: impl FnOnce(&[f64], &[f64]) -> Result<R>,
    ) -> Result<R> {
        let inner = self.inner.borrow();
        let compiled = inner.compiled.as_ref().ok_or(Error::NotCompiled)?;
        f(&compiled.values, &compiled.gradients)
    }

    pub(crate) fn with_buffers_mut<R>(
        &self,
        f: impl FnOnce(&mut [f64], &mut [f64]) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.borrow_mut();
        let compiled = inner.compiled.as_mut().ok_or(Error::NotCompiled)?;
        f(&mut compiled.values, &mut compiled.gradients)
    }

    /// Point the reference in `slot` at `target`.
    pub(crate) fn point_reference(&self, slot: SlotId, target: SlotId) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.nodes[slot.index()].kind, NodeKind::Reference { .. }) {
            return Err(Error::NotAReference(slot));
        }
        let target_kind = &inner.nodes[target.index()].kind;
        if matches!(target_kind, NodeKind::Reference { .. }) {
            return Err(Error::NestedReference(target));
        }
        let candidates = &inner.nodes[slot.index()].children;
        if candidates.is_empty() {
            // Leaves are the only targets that need no tape ordering.
            if !matches!(target_kind, NodeKind::Leaf) {
                return Err(Error::UnorderedTarget { slot, target });
            }
        } else if !candidates.contains(&target) {
            return Err(Error::UnlistedTarget { slot, target });
        }
        inner.nodes[slot.index()].kind = NodeKind::Reference {
            target: Some(target),
        };
        if let Some(compiled) = inner.compiled.as_mut() {
            compiled.values[slot.index()] = target.index() as f64;
        }
        debug!(%slot, %target, "reference updated");
        Ok(())
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("slots", &self.len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}
