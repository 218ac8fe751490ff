//! rich-doc: a schema-checked rich-text document model with invertible,
//! remappable edit steps.
//!
//! This crate provides the core of a structured editor:
//!
//! - **Document model** - schemas compiled from content expressions,
//!   persistent node trees, marks, resolved positions and slices
//! - **Steps** - atomic, serializable changes that report how positions move
//!   and can be inverted and rebased over other changes
//! - **Transforms** - step accumulation plus fitting replace, lift, wrap,
//!   split, join and mark editing
//!
//! # Quick Start
//!
//! ```rust
//! use rich_doc::{basic, Slice, Transform};
//! use serde_json::json;
//!
//! let schema = basic::schema();
//! let doc = schema.node_from_json(&json!({
//!     "type": "doc",
//!     "content": [
//!         {"type": "paragraph", "content": [{"type": "text", "text": "ab"}]},
//!         {"type": "paragraph", "content": [{"type": "text", "text": "cd"}]}
//!     ]
//! }))?;
//!
//! // Delete across the paragraph boundary; the blocks are joined.
//! let mut tr = Transform::new(doc);
//! tr.replace(2, 6, &Slice::empty())?;
//! assert_eq!(tr.doc().to_string(), r#"doc(paragraph("ad"))"#);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Document model
pub mod model;

// Steps, mappings and transforms
pub mod transform;

// Ready-made schema
pub mod basic;

pub use model::{
    Fragment, Mark, MarkType, ModelError, Node, NodeRange, NodeType, ReplaceError, ResolvedPos,
    Schema, SchemaSpec, Slice,
};
pub use transform::{Mapping, Step, StepMap, StepResult, Transform, TransformError};
