//! The step family and its JSON form.

use super::attr_step::{AttrStep, DocAttrStep};
use super::map::{Mappable, StepMap};
use super::mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
use super::replace_step::{ReplaceAroundStep, ReplaceStep};
use crate::model::{Mark, ModelError, Node, Schema, Slice};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of applying a step: the new document, or why it did not apply.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Done(Node),
    Failed(String),
}

impl StepResult {
    pub fn ok(doc: Node) -> Self {
        StepResult::Done(doc)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        StepResult::Failed(message.into())
    }

    /// Replaces `from..to` in `doc` with `slice`, turning any error into a
    /// failed result.
    pub fn from_replace(doc: &Node, from: usize, to: usize, slice: &Slice) -> Self {
        match doc.replace(from, to, slice) {
            Ok(doc) => StepResult::Done(doc),
            Err(ModelError::Replace(e)) => StepResult::Failed(e.0),
            Err(e) => StepResult::Failed(e.to_string()),
        }
    }

    pub fn doc(&self) -> Option<&Node> {
        match self {
            StepResult::Done(doc) => Some(doc),
            StepResult::Failed(_) => None,
        }
    }

    pub fn failed(&self) -> Option<&str> {
        match self {
            StepResult::Done(_) => None,
            StepResult::Failed(message) => Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Done(_))
    }
}

/// A step kind defined outside this crate.
///
/// Custom steps travel through [`Step::Custom`] and are decoded from JSON
/// through a [`StepRegistry`].
pub trait CustomStep: fmt::Debug + Send + Sync {
    /// The `stepType` this step serializes under.
    fn json_id(&self) -> &str;

    fn apply(&self, doc: &Node) -> StepResult;

    fn get_map(&self) -> StepMap {
        StepMap::empty()
    }

    fn invert(&self, doc: &Node) -> Result<Step, ModelError>;

    fn map(&self, mapping: &dyn Mappable) -> Option<Step>;

    fn merge(&self, _other: &Step) -> Option<Step> {
        None
    }

    /// JSON form, including the `stepType` field.
    fn to_json(&self) -> Value;
}

/// An atomic, invertible change to a document.
#[derive(Debug, Clone)]
pub enum Step {
    Replace(ReplaceStep),
    ReplaceAround(ReplaceAroundStep),
    AddMark(AddMarkStep),
    RemoveMark(RemoveMarkStep),
    AddNodeMark(AddNodeMarkStep),
    RemoveNodeMark(RemoveNodeMarkStep),
    Attr(AttrStep),
    DocAttr(DocAttrStep),
    Custom(Arc<dyn CustomStep>),
}

const BUILTIN_IDS: [&str; 8] = [
    "replace",
    "replaceAround",
    "addMark",
    "removeMark",
    "addNodeMark",
    "removeNodeMark",
    "attr",
    "docAttr",
];

impl Step {
    pub fn apply(&self, doc: &Node) -> StepResult {
        match self {
            Step::Replace(s) => s.apply(doc),
            Step::ReplaceAround(s) => s.apply(doc),
            Step::AddMark(s) => s.apply(doc),
            Step::RemoveMark(s) => s.apply(doc),
            Step::AddNodeMark(s) => s.apply(doc),
            Step::RemoveNodeMark(s) => s.apply(doc),
            Step::Attr(s) => s.apply(doc),
            Step::DocAttr(s) => s.apply(doc),
            Step::Custom(s) => s.apply(doc),
        }
    }

    /// How this step moves positions.
    pub fn get_map(&self) -> StepMap {
        match self {
            Step::Replace(s) => s.get_map(),
            Step::ReplaceAround(s) => s.get_map(),
            Step::Custom(s) => s.get_map(),
            _ => StepMap::empty(),
        }
    }

    /// The step that undoes this one. `doc` is the document this step was
    /// applied to.
    pub fn invert(&self, doc: &Node) -> Result<Step, ModelError> {
        match self {
            Step::Replace(s) => s.invert(doc).map(Step::Replace),
            Step::ReplaceAround(s) => s.invert(doc).map(Step::ReplaceAround),
            Step::AddMark(s) => Ok(Step::RemoveMark(s.invert())),
            Step::RemoveMark(s) => Ok(Step::AddMark(s.invert())),
            Step::AddNodeMark(s) => Ok(s.invert(doc)),
            Step::RemoveNodeMark(s) => Ok(s.invert(doc)),
            Step::Attr(s) => s.invert(doc).map(Step::Attr),
            Step::DocAttr(s) => Ok(Step::DocAttr(s.invert(doc))),
            Step::Custom(s) => s.invert(doc),
        }
    }

    /// Rebases this step over `mapping`. `None` when the content it applied
    /// to was deleted.
    pub fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        match self {
            Step::Replace(s) => s.map(mapping).map(Step::Replace),
            Step::ReplaceAround(s) => s.map(mapping).map(Step::ReplaceAround),
            Step::AddMark(s) => s.map(mapping).map(Step::AddMark),
            Step::RemoveMark(s) => s.map(mapping).map(Step::RemoveMark),
            Step::AddNodeMark(s) => s.map(mapping).map(Step::AddNodeMark),
            Step::RemoveNodeMark(s) => s.map(mapping).map(Step::RemoveNodeMark),
            Step::Attr(s) => s.map(mapping).map(Step::Attr),
            Step::DocAttr(s) => Some(Step::DocAttr(s.clone())),
            Step::Custom(s) => s.map(mapping),
        }
    }

    /// Combines this step with one applied directly after it, when the pair
    /// can be expressed as a single step.
    pub fn merge(&self, other: &Step) -> Option<Step> {
        match (self, other) {
            (Step::Replace(a), Step::Replace(b)) => a.merge(b).map(Step::Replace),
            (Step::AddMark(a), Step::AddMark(b)) => a.merge(b).map(Step::AddMark),
            (Step::RemoveMark(a), Step::RemoveMark(b)) => a.merge(b).map(Step::RemoveMark),
            (Step::Custom(a), other) => a.merge(other),
            _ => None,
        }
    }

    pub fn json_id(&self) -> &str {
        match self {
            Step::Replace(_) => "replace",
            Step::ReplaceAround(_) => "replaceAround",
            Step::AddMark(_) => "addMark",
            Step::RemoveMark(_) => "removeMark",
            Step::AddNodeMark(_) => "addNodeMark",
            Step::RemoveNodeMark(_) => "removeNodeMark",
            Step::Attr(_) => "attr",
            Step::DocAttr(_) => "docAttr",
            Step::Custom(s) => s.json_id(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Step::Replace(s) => s.to_json(),
            Step::ReplaceAround(s) => s.to_json(),
            Step::AddMark(s) => s.to_json(),
            Step::RemoveMark(s) => s.to_json(),
            Step::AddNodeMark(s) => s.to_json(),
            Step::RemoveNodeMark(s) => s.to_json(),
            Step::Attr(s) => s.to_json(),
            Step::DocAttr(s) => s.to_json(),
            Step::Custom(s) => s.to_json(),
        }
    }

    /// Decodes a built-in step. Use a [`StepRegistry`] for custom ones.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, ModelError> {
        let raw = StepJson::deserialize(json)
            .map_err(|e| ModelError::range(format!("Invalid input for Step.fromJSON: {e}")))?;
        let step = match raw {
            StepJson::Replace {
                from,
                to,
                slice,
                structure,
            } => Step::Replace(ReplaceStep::new(
                from,
                to,
                Slice::from_json(schema, slice.as_ref())?,
                structure,
            )),
            StepJson::ReplaceAround {
                from,
                to,
                gap_from,
                gap_to,
                insert,
                slice,
                structure,
            } => Step::ReplaceAround(ReplaceAroundStep::new(
                from,
                to,
                gap_from,
                gap_to,
                Slice::from_json(schema, slice.as_ref())?,
                insert,
                structure,
            )),
            StepJson::AddMark { mark, from, to } => {
                Step::AddMark(AddMarkStep::new(from, to, Mark::from_json(schema, &mark)?))
            }
            StepJson::RemoveMark { mark, from, to } => {
                Step::RemoveMark(RemoveMarkStep::new(from, to, Mark::from_json(schema, &mark)?))
            }
            StepJson::AddNodeMark { pos, mark } => {
                Step::AddNodeMark(AddNodeMarkStep::new(pos, Mark::from_json(schema, &mark)?))
            }
            StepJson::RemoveNodeMark { pos, mark } => Step::RemoveNodeMark(
                RemoveNodeMarkStep::new(pos, Mark::from_json(schema, &mark)?),
            ),
            StepJson::Attr { pos, attr, value } => Step::Attr(AttrStep::new(pos, attr, value)),
            StepJson::DocAttr { attr, value } => Step::DocAttr(DocAttrStep::new(attr, value)),
        };
        step.check_range()?;
        Ok(step)
    }

    /// Rejects positions that are out of order.
    fn check_range(&self) -> Result<(), ModelError> {
        let (from, to) = match self {
            Step::Replace(s) => return s.check_range(),
            Step::ReplaceAround(s) => return s.check_range(),
            Step::AddMark(s) => (s.from, s.to),
            Step::RemoveMark(s) => (s.from, s.to),
            _ => return Ok(()),
        };
        if from > to {
            return Err(ModelError::range(format!("Mark range {from}..{to} is reversed")));
        }
        Ok(())
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Step::Replace(a), Step::Replace(b)) => a == b,
            (Step::ReplaceAround(a), Step::ReplaceAround(b)) => a == b,
            (Step::AddMark(a), Step::AddMark(b)) => a == b,
            (Step::RemoveMark(a), Step::RemoveMark(b)) => a == b,
            (Step::AddNodeMark(a), Step::AddNodeMark(b)) => a == b,
            (Step::RemoveNodeMark(a), Step::RemoveNodeMark(b)) => a == b,
            (Step::Attr(a), Step::Attr(b)) => a == b,
            (Step::DocAttr(a), Step::DocAttr(b)) => a == b,
            (Step::Custom(a), Step::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl serde::Serialize for Step {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<ReplaceStep> for Step {
    fn from(step: ReplaceStep) -> Self {
        Step::Replace(step)
    }
}

impl From<ReplaceAroundStep> for Step {
    fn from(step: ReplaceAroundStep) -> Self {
        Step::ReplaceAround(step)
    }
}

/// Wire form of the built-in steps, tagged by `stepType`.
#[derive(Debug, Deserialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
enum StepJson {
    Replace {
        from: usize,
        to: usize,
        #[serde(default)]
        slice: Option<Value>,
        #[serde(default)]
        structure: bool,
    },
    #[serde(rename_all = "camelCase")]
    ReplaceAround {
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
        insert: usize,
        #[serde(default)]
        slice: Option<Value>,
        #[serde(default)]
        structure: bool,
    },
    AddMark {
        mark: Value,
        from: usize,
        to: usize,
    },
    RemoveMark {
        mark: Value,
        from: usize,
        to: usize,
    },
    AddNodeMark {
        pos: usize,
        mark: Value,
    },
    RemoveNodeMark {
        pos: usize,
        mark: Value,
    },
    Attr {
        pos: usize,
        attr: String,
        #[serde(default)]
        value: Value,
    },
    DocAttr {
        attr: String,
        #[serde(default)]
        value: Value,
    },
}

/// Decodes a custom step from its JSON form.
pub type StepDecoder = Box<dyn Fn(&Schema, &Value) -> Result<Step, ModelError> + Send + Sync>;

/// Maps `stepType` ids to decoders, on top of the built-in step kinds.
#[derive(Default)]
pub struct StepRegistry {
    decoders: HashMap<String, StepDecoder>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decoder for `id`. Ids are unique, and the built-in ids
    /// are taken.
    pub fn register<F>(&mut self, id: impl Into<String>, decoder: F) -> Result<(), ModelError>
    where
        F: Fn(&Schema, &Value) -> Result<Step, ModelError> + Send + Sync + 'static,
    {
        let id = id.into();
        if BUILTIN_IDS.contains(&id.as_str()) || self.decoders.contains_key(&id) {
            return Err(ModelError::range(format!("Duplicate use of step JSON ID {id}")));
        }
        self.decoders.insert(id, Box::new(decoder));
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        BUILTIN_IDS.contains(&id) || self.decoders.contains_key(id)
    }

    pub fn from_json(&self, schema: &Schema, json: &Value) -> Result<Step, ModelError> {
        let id = json
            .get("stepType")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::range("Invalid input for Step.fromJSON"))?;
        if BUILTIN_IDS.contains(&id) {
            return Step::from_json(schema, json);
        }
        let decoder = self
            .decoders
            .get(id)
            .ok_or_else(|| ModelError::range(format!("No step type {id} defined")))?;
        decoder(schema, json)
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.decoders.keys().collect();
        ids.sort();
        f.debug_struct("StepRegistry").field("custom", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use serde_json::json;

    /// Replaces the whole document with itself; only here to exercise the
    /// extension point.
    #[derive(Debug)]
    struct Noop;

    impl CustomStep for Noop {
        fn json_id(&self) -> &str {
            "noop"
        }

        fn apply(&self, doc: &Node) -> StepResult {
            StepResult::ok(doc.clone())
        }

        fn invert(&self, _doc: &Node) -> Result<Step, ModelError> {
            Ok(Step::Custom(Arc::new(Noop)))
        }

        fn map(&self, _mapping: &dyn Mappable) -> Option<Step> {
            Some(Step::Custom(Arc::new(Noop)))
        }

        fn to_json(&self) -> Value {
            json!({"stepType": "noop"})
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = StepRegistry::new();
        registry
            .register("noop", |_, _| Ok(Step::Custom(Arc::new(Noop))))
            .unwrap();
        assert!(registry.register("noop", |_, _| Ok(Step::Custom(Arc::new(Noop)))).is_err());
        assert!(registry.register("replace", |_, _| Ok(Step::Custom(Arc::new(Noop)))).is_err());
        assert!(registry.contains("noop") && registry.contains("attr"));
    }

    #[test]
    fn test_registry_decodes_custom_and_builtin() {
        let schema = basic::schema();
        let mut registry = StepRegistry::new();
        registry
            .register("noop", |_, _| Ok(Step::Custom(Arc::new(Noop))))
            .unwrap();
        let step = registry.from_json(&schema, &json!({"stepType": "noop"})).unwrap();
        assert_eq!(step.json_id(), "noop");
        assert_eq!(step.to_json(), json!({"stepType": "noop"}));

        let replace = registry
            .from_json(&schema, &json!({"stepType": "replace", "from": 1, "to": 2}))
            .unwrap();
        assert_eq!(replace.json_id(), "replace");

        let err = registry
            .from_json(&schema, &json!({"stepType": "unknown"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "No step type unknown defined");
        assert!(registry.from_json(&schema, &json!({"from": 1})).is_err());
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let schema = basic::schema();
        assert!(Step::from_json(&schema, &json!({"stepType": "replace", "from": "x"})).is_err());
        assert!(Step::from_json(&schema, &json!({"stepType": "addMark", "from": 1, "to": 2})).is_err());
    }

    #[test]
    fn test_from_json_rejects_reversed_positions() {
        let schema = basic::schema();
        let reversed = json!({"stepType": "replace", "from": 5, "to": 2});
        assert!(matches!(Step::from_json(&schema, &reversed), Err(ModelError::Range(_))));
        let gap = json!({"stepType": "replaceAround", "from": 1, "to": 2,
                         "gapFrom": 1, "gapTo": 7, "insert": 0});
        assert!(Step::from_json(&schema, &gap).is_err());
        let mark = json!({"stepType": "addMark", "from": 4, "to": 1, "mark": {"type": "em"}});
        assert!(Step::from_json(&schema, &mark).is_err());
    }

    #[test]
    fn test_from_replace_reports_failure() {
        let schema = basic::schema();
        let doc = schema
            .node_from_json(&json!({"type": "doc", "content": [{"type": "paragraph"}]}))
            .unwrap();
        let result = StepResult::from_replace(&doc, 0, 2, &Slice::empty());
        assert!(result.failed().is_some());
        let result = StepResult::from_replace(&doc, 0, 9, &Slice::empty());
        assert!(!result.is_ok());
    }
}
