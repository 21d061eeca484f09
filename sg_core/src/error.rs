//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

use crate::node::SlotId;

/// Errors raised while building, compiling or running a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A value, gradient or pass was requested before the storage was compiled.
    #[error("the graph was not compiled yet; call `compile()` on a node before using it")]
    NotCompiled,

    /// A constant operand was NaN or infinite.
    #[error("invalid constant operand for `{op}`: {value}")]
    InvalidOperand { op: &'static str, value: f64 },

    /// Two nodes from different storages were combined.
    #[error("node belongs to a different storage instance")]
    ForeignNode,

    /// `set_reference` was called on a node that is not a reference.
    #[error("node {0} is not a reference node")]
    NotAReference(SlotId),

    /// A reference would point at another reference node, which is the slot
    /// reported.
    #[error("node {0} is a reference and cannot be the target of another reference")]
    NestedReference(SlotId),

    /// A reference without candidates was pointed at a computed node. Only
    /// leaves are safe targets there; list computed targets with
    /// `Storage::reference_among`.
    #[error("reference node {slot} has no candidates and cannot target computed node {target}")]
    UnorderedTarget { slot: SlotId, target: SlotId },

    /// The target is not among the candidates the reference was created with.
    #[error("node {target} is not a candidate of reference node {slot}")]
    UnlistedTarget { slot: SlotId, target: SlotId },

    /// A reference node was read or written without a valid target.
    #[error("reference node {slot} does not point at a valid slot")]
    DanglingReference { slot: SlotId },

    /// The dependency closure of the compiled root is not acyclic.
    #[error("dependency graph contains a cycle ({remaining} nodes never became ready)")]
    Cycle { remaining: usize },

    /// The compiler finished but left the storage in an inconsistent state.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

/// Result alias used throughout `sg_core`.
pub type Result<T> = std::result::Result<T, Error>;
