//! Document changes as data.
//!
//! Every change to a document is a [`Step`]: it applies to a document,
//! produces a [`StepMap`] describing how positions moved, can be inverted
//! against the document it applied to, and can be mapped through other
//! changes. [`Transform`] accumulates steps and offers the higher-level
//! editing operations (fitting replace, lift, wrap, split, join, marks).

mod attr_step;
mod map;
mod mark;
mod mark_step;
mod replace;
mod replace_step;
mod step;
mod structure;
#[allow(clippy::module_inception)]
mod transform;

pub use attr_step::{AttrStep, DocAttrStep};
pub use map::{Assoc, MapResult, Mappable, Mapping, StepMap};
pub use mark::MarkMatch;
pub use mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
pub use replace::replace_step;
pub use replace_step::{ReplaceAroundStep, ReplaceStep};
pub use step::{CustomStep, Step, StepDecoder, StepRegistry, StepResult};
pub use structure::{
    can_join, can_split, drop_point, find_wrapping, insert_point, join_point, joinable,
    lift_target, Wrapper,
};
pub use transform::Transform;

use crate::model::ModelError;

/// Errors raised while building a [`Transform`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// A step could not be applied to the current document.
    #[error("step failed: {0}")]
    StepFailed(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}
