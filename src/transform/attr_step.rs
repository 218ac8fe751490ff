use super::map::{Assoc, Mappable};
use super::step::StepResult;
use crate::model::{Fragment, ModelError, Node, Slice};
use serde_json::{json, Value};

/// Sets one attribute of the node at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrStep {
    pub pos: usize,
    pub attr: String,
    pub value: Value,
}

impl AttrStep {
    pub fn new(pos: usize, attr: impl Into<String>, value: Value) -> Self {
        Self {
            pos,
            attr: attr.into(),
            value,
        }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let Some(node) = doc.node_at(self.pos) else {
            return StepResult::fail("No node at attribute step's position");
        };
        let mut attrs = node.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = match node
            .node_type()
            .create(Some(&attrs), Fragment::empty(), node.marks())
        {
            Ok(updated) => updated,
            Err(e) => return StepResult::fail(e.to_string()),
        };
        let open_end = usize::from(!node.is_leaf());
        StepResult::from_replace(
            doc,
            self.pos,
            self.pos + 1,
            &Slice::new(Fragment::from(updated), 0, open_end),
        )
    }

    pub fn invert(&self, doc: &Node) -> Result<AttrStep, ModelError> {
        let node = doc.node_at(self.pos).ok_or_else(|| {
            ModelError::range("No node at attribute step's position")
        })?;
        let old = node.attrs().get(&self.attr).cloned().unwrap_or(Value::Null);
        Ok(AttrStep::new(self.pos, self.attr.clone(), old))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AttrStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| AttrStep::new(pos.pos, self.attr.clone(), self.value.clone()))
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "attr",
            "pos": self.pos,
            "attr": self.attr,
            "value": self.value,
        })
    }
}

/// Sets one attribute of the document node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DocAttrStep {
    pub attr: String,
    pub value: Value,
}

impl DocAttrStep {
    pub fn new(attr: impl Into<String>, value: Value) -> Self {
        Self {
            attr: attr.into(),
            value,
        }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let mut attrs = doc.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        match doc
            .node_type()
            .create(Some(&attrs), doc.content().clone(), doc.marks())
        {
            Ok(updated) => StepResult::ok(updated),
            Err(e) => StepResult::fail(e.to_string()),
        }
    }

    pub fn invert(&self, doc: &Node) -> DocAttrStep {
        let old = doc.attrs().get(&self.attr).cloned().unwrap_or(Value::Null);
        DocAttrStep::new(self.attr.clone(), old)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "docAttr",
            "attr": self.attr,
            "value": self.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use crate::model::{AttributeSpec, NodeSpec, Schema, SchemaSpec};

    fn doc() -> Node {
        basic::schema()
            .node_from_json(&json!({
                "type": "doc",
                "content": [
                    {"type": "heading", "attrs": {"level": 1},
                     "content": [{"type": "text", "text": "Title"}]},
                    {"type": "paragraph"}
                ]
            }))
            .unwrap()
    }

    #[test]
    fn test_attr_step_keeps_content() {
        let d = doc();
        let step = AttrStep::new(0, "level", json!(3));
        let after = step.apply(&d).doc().cloned().unwrap();
        let heading = after.child(0);
        assert_eq!(heading.attrs()["level"], json!(3));
        assert_eq!(heading.text_content(), "Title");

        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.value, json!(1));
        assert_eq!(inverse.apply(&after).doc(), Some(&d));
    }

    #[test]
    fn test_attr_step_failures() {
        let d = doc();
        assert_eq!(
            AttrStep::new(99, "level", json!(2)).apply(&d).failed(),
            Some("No node at attribute step's position")
        );
        assert!(AttrStep::new(99, "level", json!(2)).invert(&d).is_err());
        // Text nodes cannot be rebuilt through their type.
        assert!(!AttrStep::new(1, "level", json!(2)).apply(&d).is_ok());
    }

    #[test]
    fn test_doc_attr_step() {
        let schema = Schema::new(
            SchemaSpec::new()
                .node(
                    "doc",
                    NodeSpec::new()
                        .content("paragraph+")
                        .attr("lang", AttributeSpec::with_default(Value::Null)),
                )
                .node("paragraph", NodeSpec::new().content("text*"))
                .node("text", NodeSpec::new()),
        )
        .unwrap();
        let d = schema
            .node_from_json(&json!({"type": "doc", "content": [{"type": "paragraph"}]}))
            .unwrap();
        let step = DocAttrStep::new("lang", json!("en"));
        let after = step.apply(&d).doc().cloned().unwrap();
        assert_eq!(after.attrs()["lang"], json!("en"));
        assert_eq!(after.content(), d.content());
        let inverse = step.invert(&d);
        assert_eq!(inverse.value, Value::Null);
        assert_eq!(inverse.apply(&after).doc(), Some(&d));
    }
}
