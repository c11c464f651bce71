//! Host-facing error types.
//!
//! Only failures of the host API surface become `Err` values. Recoverable
//! patch-runtime diagnostics (duplicate endpoint names, type-mismatched
//! messages, unsupported features) go through the engine console hook
//! instead and never abort processing.

use thiserror::Error;

use crate::graph::GraphId;
use crate::object::ObjectId;

/// Errors from the engine's host API.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The referenced graph does not exist (or was deleted).
    #[error("graph {0:?} not found")]
    GraphNotFound(GraphId),

    /// The referenced object does not exist (or was deleted).
    #[error("object {0:?} not found")]
    ObjectNotFound(ObjectId),

    /// A connection endpoint index is out of range for its object.
    #[error("no such port: object {object:?} {kind} {index}")]
    NoSuchPort {
        /// Object carrying the missing port.
        object: ObjectId,
        /// `"outlet"` or `"inlet"`.
        kind: &'static str,
        /// The out-of-range port index.
        index: usize,
    },

    /// A connection statement referenced an object ordinal the graph does
    /// not have.
    #[error("connection references object #{index} but graph has {len} objects")]
    BadObjectIndex {
        /// Ordinal used by the connection.
        index: usize,
        /// Number of objects in the graph.
        len: usize,
    },
}
