//! Persistent document model.
//!
//! This module provides the immutable, schema-checked document tree:
//!
//! - [`Schema`], [`NodeType`] and [`MarkType`] - the registry built from a
//!   [`SchemaSpec`]
//! - [`ContentMatch`] - the automaton compiled from a content expression
//! - [`Fragment`] and [`Node`] - the tree itself, shared structurally
//! - [`Mark`] - inline annotations kept in rank-ordered sets
//! - [`ResolvedPos`] and [`NodeRange`] - context for an integer position
//! - [`Slice`] - an excerpt with open sides, the unit of replacement

mod content;
mod fragment;
mod mark;
mod node;
mod replace;
mod resolved_pos;
mod schema;
mod slice;

pub use content::{ContentMatch, MatchEdge};
pub use fragment::{Fragment, IndexOffset};
pub use mark::{Mark, MarkType};
pub use node::{ChildAt, Node};
pub use resolved_pos::{NodeRange, ResolvedPos};
pub use schema::{
    AttributeSpec, Attrs, MarkSpec, NodeSpec, NodeType, Schema, SchemaSpec, Whitespace,
};
pub use slice::Slice;

pub(crate) use fragment::char_slice;

/// Errors raised by the document model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Usage errors: out-of-range positions, malformed JSON, invalid schemas.
    #[error("{0}")]
    Range(String),
    /// Malformed content or mark expressions in a schema spec.
    #[error("{0}")]
    Syntax(String),
    /// A replacement that would produce an invalid document.
    #[error(transparent)]
    Replace(#[from] ReplaceError),
}

impl ModelError {
    pub(crate) fn range(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }
}

/// Raised when a slice cannot validly occupy the replaced range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ReplaceError(pub String);

impl ReplaceError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
