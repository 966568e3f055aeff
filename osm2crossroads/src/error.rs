use thiserror::Error;

use crate::NodeID;

/// The recoverable failure modes of the pipeline. Geometry primitives never
/// fail; the enrichment skips the affected feature and keeps going, so most
/// of these surface as warnings rather than aborting a run.
#[derive(Debug, Error, PartialEq)]
pub enum CrossroadError {
    /// The segmentation document has the wrong shape, references unknown
    /// nodes, or lacks a "crossroad" entry. Fatal for that document.
    #[error("malformed segmentation: {0}")]
    MalformedSegmentation(String),

    /// A traversal that must close or connect didn't: the border walk never
    /// returned to its start, or a shortest path was requested between
    /// disconnected node sets. The feature relying on it is skipped.
    #[error("unreachable graph state: {0}")]
    UnreachableGraphState(String),

    /// A tag that should be numeric or well-formed isn't. The edge falls back
    /// to the default lane rule.
    #[error("invalid value {value:?} for tag {key}")]
    InvalidTag { key: String, value: String },

    /// An edge was found in only one orientation where both were expected.
    /// Resolved by trying the reverse; never fatal.
    #[error("edge {0}-{1} only stored in one orientation")]
    AmbiguousEdgeDirection(NodeID, NodeID),
}
