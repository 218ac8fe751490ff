use super::attr_step::{AttrStep, DocAttrStep};
use super::map::Mapping;
use super::mark::{self, MarkMatch};
use super::mark_step::{AddNodeMarkStep, RemoveNodeMarkStep};
use super::replace::{self, replace_step};
use super::step::{Step, StepResult};
use super::structure::{self, Wrapper};
use super::TransformError;
use crate::model::{Attrs, ContentMatch, Fragment, Mark, ModelError, Node, NodeRange, NodeType, Slice};
use serde_json::Value;
use tracing::debug;

/// Accumulates steps applied to a document, keeping every intermediate
/// document and the combined position mapping.
///
/// Builder methods return `&mut Self` so edits chain with `?`:
///
/// ```
/// use rich_doc::{basic, transform::Transform};
///
/// let schema = basic::schema();
/// let para = schema.node("paragraph", None, schema.text("hi", &[]).unwrap(), &[]).unwrap();
/// let doc = schema.node("doc", None, para, &[]).unwrap();
///
/// let mut tr = Transform::new(doc);
/// tr.insert(1, schema.text("oh, ", &[]).unwrap())?.delete(5, 6)?;
/// assert_eq!(tr.doc().text_content(), "oh, i");
/// # Ok::<(), rich_doc::transform::TransformError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Transform {
    doc: Node,
    steps: Vec<Step>,
    docs: Vec<Node>,
    mapping: Mapping,
}

impl Transform {
    pub fn new(doc: Node) -> Self {
        Self {
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            mapping: Mapping::new(),
        }
    }

    /// The current document.
    pub fn doc(&self) -> &Node {
        &self.doc
    }

    /// The document before any step was applied.
    pub fn before(&self) -> &Node {
        self.docs.first().unwrap_or(&self.doc)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The document before each step, parallel to [`steps`](Self::steps).
    pub fn docs(&self) -> &[Node] {
        &self.docs
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Applies `step`, failing with [`TransformError::StepFailed`] when it
    /// does not apply.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        match self.maybe_step(step) {
            StepResult::Done(_) => Ok(self),
            StepResult::Failed(message) => Err(TransformError::StepFailed(message)),
        }
    }

    /// Tries to apply `step`, recording it only on success.
    pub fn maybe_step(&mut self, step: Step) -> StepResult {
        let result = step.apply(&self.doc);
        match &result {
            StepResult::Done(doc) => self.add_step(step, doc.clone()),
            StepResult::Failed(message) => {
                debug!(step = step.json_id(), %message, "step rejected");
            }
        }
        result
    }

    fn add_step(&mut self, step: Step, doc: Node) {
        let previous = std::mem::replace(&mut self.doc, doc);
        self.docs.push(previous);
        self.mapping.append_map(step.get_map(), None);
        self.steps.push(step);
    }

    /// Replaces `from..to` with `slice`, fitting it into the surrounding
    /// structure. Does nothing when the replacement is a no-op.
    pub fn replace(&mut self, from: usize, to: usize, slice: &Slice) -> Result<&mut Self, TransformError> {
        if let Some(step) = replace_step(&self.doc, from, to, slice)? {
            self.step(step)?;
        }
        Ok(self)
    }

    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: impl Into<Fragment>,
    ) -> Result<&mut Self, TransformError> {
        self.replace(from, to, &Slice::new(content.into(), 0, 0))
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.replace(from, to, &Slice::empty())
    }

    pub fn insert(&mut self, pos: usize, content: impl Into<Fragment>) -> Result<&mut Self, TransformError> {
        self.replace_with(pos, pos, content)
    }

    /// Like [`replace`](Self::replace), but widens the range over parent
    /// nodes the slice can replace or that would be left empty.
    pub fn replace_range(&mut self, from: usize, to: usize, slice: &Slice) -> Result<&mut Self, TransformError> {
        replace::replace_range(self, from, to, slice)?;
        Ok(self)
    }

    /// Replaces `from..to` with a single node, moving out of the parent
    /// to find a valid insertion point when the range is empty.
    pub fn replace_range_with(&mut self, from: usize, to: usize, node: Node) -> Result<&mut Self, TransformError> {
        replace::replace_range_with(self, from, to, node)?;
        Ok(self)
    }

    /// Deletes `from..to`, widening over whole nodes where that is the
    /// cleaner result.
    pub fn delete_range(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        replace::delete_range(self, from, to)?;
        Ok(self)
    }

    /// Lifts `range` out of its parents down to depth `target`; see
    /// [`lift_target`](super::lift_target).
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> Result<&mut Self, TransformError> {
        structure::lift(self, range, target)?;
        Ok(self)
    }

    /// Joins the blocks around `pos`, closing `depth` levels.
    pub fn join(&mut self, pos: usize, depth: usize) -> Result<&mut Self, TransformError> {
        structure::join(self, pos, depth)?;
        Ok(self)
    }

    pub fn wrap(&mut self, range: &NodeRange, wrappers: &[Wrapper]) -> Result<&mut Self, TransformError> {
        structure::wrap(self, range, wrappers)?;
        Ok(self)
    }

    /// Turns every textblock between `from` and `to` into `node_type`.
    pub fn set_block_type(
        &mut self,
        from: usize,
        to: usize,
        node_type: &NodeType,
        attrs: Option<&Attrs>,
    ) -> Result<&mut Self, TransformError> {
        structure::set_block_type(self, from, to, node_type, attrs)?;
        Ok(self)
    }

    /// Changes the type, attributes or marks of the node at `pos`. `None`
    /// keeps the node's type or marks.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        node_type: Option<&NodeType>,
        attrs: Option<&Attrs>,
        marks: Option<&[Mark]>,
    ) -> Result<&mut Self, TransformError> {
        structure::set_node_markup(self, pos, node_type, attrs, marks)?;
        Ok(self)
    }

    pub fn set_node_attribute(
        &mut self,
        pos: usize,
        attr: impl Into<String>,
        value: Value,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Attr(AttrStep::new(pos, attr, value)))
    }

    pub fn set_doc_attribute(&mut self, attr: impl Into<String>, value: Value) -> Result<&mut Self, TransformError> {
        self.step(Step::DocAttr(DocAttrStep::new(attr, value)))
    }

    pub fn add_node_mark(&mut self, pos: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.step(Step::AddNodeMark(AddNodeMarkStep::new(pos, mark)))
    }

    /// Removes the marks `which` selects from the node at `pos`.
    pub fn remove_node_mark(&mut self, pos: usize, which: &MarkMatch) -> Result<&mut Self, TransformError> {
        let node = self
            .doc
            .node_at(pos)
            .ok_or_else(|| ModelError::range(format!("No node at position {pos}")))?;
        for mark in which.select(node.marks()).into_iter().rev() {
            self.step(Step::RemoveNodeMark(RemoveNodeMarkStep::new(pos, mark)))?;
        }
        Ok(self)
    }

    /// Splits the node at `pos`, `depth` levels deep. Entries of
    /// `types_after` override the type of the split-off nodes, outermost
    /// first.
    pub fn split(
        &mut self,
        pos: usize,
        depth: usize,
        types_after: &[Option<Wrapper>],
    ) -> Result<&mut Self, TransformError> {
        structure::split(self, pos, depth, types_after)?;
        Ok(self)
    }

    pub fn add_mark(&mut self, from: usize, to: usize, mark: &Mark) -> Result<&mut Self, TransformError> {
        mark::add_mark(self, from, to, mark)?;
        Ok(self)
    }

    pub fn remove_mark(&mut self, from: usize, to: usize, which: &MarkMatch) -> Result<&mut Self, TransformError> {
        mark::remove_mark(self, from, to, which)?;
        Ok(self)
    }

    /// Strips content of the node at `pos` that `parent_type` does not
    /// allow, starting from `content_match` (the type's start state by
    /// default).
    pub fn clear_incompatible(
        &mut self,
        pos: usize,
        parent_type: &NodeType,
        content_match: Option<ContentMatch>,
    ) -> Result<&mut Self, TransformError> {
        self.clear_incompatible_with(pos, parent_type, content_match, true)
    }

    pub(crate) fn clear_incompatible_with(
        &mut self,
        pos: usize,
        parent_type: &NodeType,
        content_match: Option<ContentMatch>,
        clear_newlines: bool,
    ) -> Result<&mut Self, TransformError> {
        mark::clear_incompatible(self, pos, parent_type, content_match, clear_newlines)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use crate::transform::{find_wrapping, lift_target, Assoc, Mappable};
    use serde_json::json;

    fn doc(content: Value) -> Node {
        basic::schema()
            .node_from_json(&json!({"type": "doc", "content": content}))
            .unwrap()
    }

    fn p(text: &str) -> Value {
        json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
    }

    #[test]
    fn test_steps_docs_and_mapping_track_each_other() {
        let d = doc(json!([p("hello")]));
        let mut tr = Transform::new(d.clone());
        assert!(!tr.doc_changed());
        tr.delete(1, 3).unwrap().insert(1, basic::schema().text("J", &[]).unwrap()).unwrap();
        assert_eq!(tr.doc().text_content(), "Jllo");
        assert_eq!(tr.steps().len(), 2);
        assert_eq!(tr.docs().len(), 2);
        assert_eq!(tr.before(), &d);
        assert_eq!(tr.mapping().map(6, Assoc::After), 5);
    }

    #[test]
    fn test_failed_step_is_not_recorded() {
        let d = doc(json!([p("ab"), p("cd")]));
        let mut tr = Transform::new(d.clone());
        let err = tr.join(3, 1).unwrap_err();
        assert!(matches!(err, TransformError::StepFailed(_)));
        assert!(!tr.doc_changed());
        assert_eq!(tr.doc(), &d);
        assert!(tr.maybe_step(Step::Attr(AttrStep::new(99, "level", json!(1)))).failed().is_some());
    }

    #[test]
    fn test_no_op_replace_adds_nothing() {
        let mut tr = Transform::new(doc(json!([p("ab")])));
        tr.replace(2, 2, &Slice::empty()).unwrap();
        assert!(tr.steps().is_empty());
    }

    #[test]
    fn test_wrap_then_lift() {
        let schema = basic::schema();
        let d = doc(json!([p("one")]));
        let rpos = d.resolve(2).unwrap();
        let range = rpos.block_range(&rpos).unwrap();
        let quote = schema.node_type("blockquote").unwrap();
        let wrappers = find_wrapping(&range, &quote, None, None).unwrap();

        let mut tr = Transform::new(d.clone());
        tr.wrap(&range, &wrappers).unwrap();
        assert_eq!(tr.doc().to_string(), r#"doc(blockquote(paragraph("one")))"#);

        let rpos = tr.doc().resolve(3).unwrap();
        let range = rpos.block_range(&rpos).unwrap();
        let target = lift_target(&range).unwrap();
        tr.lift(&range, target).unwrap();
        assert_eq!(tr.doc(), &d);
    }

    #[test]
    fn test_lift_middle_item_splits_parent() {
        let d = doc(json!([{"type": "blockquote", "content": [p("a"), p("b"), p("c")]}]));
        let rpos = d.resolve(5).unwrap();
        let range = rpos.block_range(&rpos).unwrap();
        let mut tr = Transform::new(d);
        tr.lift(&range, 0).unwrap();
        assert_eq!(
            tr.doc().to_string(),
            r#"doc(blockquote(paragraph("a")), paragraph("b"), blockquote(paragraph("c")))"#
        );
    }

    #[test]
    fn test_split_and_join() {
        let d = doc(json!([p("abcd")]));
        let mut tr = Transform::new(d.clone());
        tr.split(3, 1, &[]).unwrap();
        assert_eq!(tr.doc().to_string(), r#"doc(paragraph("ab"), paragraph("cd"))"#);
        tr.join(4, 1).unwrap();
        assert_eq!(tr.doc(), &d);
    }

    #[test]
    fn test_split_with_type_after() {
        let schema = basic::schema();
        let d = doc(json!([{"type": "heading", "attrs": {"level": 2},
                            "content": [{"type": "text", "text": "ab"}]}]));
        let para = Wrapper::from(schema.node_type("paragraph").unwrap());
        let mut tr = Transform::new(d);
        tr.split(2, 1, &[Some(para)]).unwrap();
        assert_eq!(tr.doc().child(0).node_type().name(), "heading");
        assert_eq!(tr.doc().child(1).node_type().name(), "paragraph");
        assert_eq!(tr.doc().child(1).text_content(), "b");
    }

    #[test]
    fn test_set_block_type_over_range() {
        let schema = basic::schema();
        let d = doc(json!([p("a"), p("b"), {"type": "horizontal_rule"}]));
        let heading = schema.node_type("heading").unwrap();
        let attrs: Attrs = [("level".to_string(), json!(2))].into_iter().collect();
        let mut tr = Transform::new(d);
        tr.set_block_type(0, 7, &heading, Some(&attrs)).unwrap();
        let out = tr.doc();
        assert_eq!(out.child(0).node_type().name(), "heading");
        assert_eq!(out.child(1).node_type().name(), "heading");
        assert_eq!(out.child(1).attrs()["level"], json!(2));
        assert_eq!(out.child(2).node_type().name(), "horizontal_rule");
        assert_eq!(out.text_content(), "ab");
    }

    #[test]
    fn test_set_block_type_rejects_non_textblock() {
        let schema = basic::schema();
        let mut tr = Transform::new(doc(json!([p("a")])));
        let quote = schema.node_type("blockquote").unwrap();
        assert!(matches!(
            tr.set_block_type(0, 3, &quote, None),
            Err(TransformError::Model(_))
        ));
    }

    #[test]
    fn test_set_node_markup_and_attribute() {
        let schema = basic::schema();
        let d = doc(json!([p("a")]));
        let heading = schema.node_type("heading").unwrap();
        let mut tr = Transform::new(d);
        tr.set_node_markup(0, Some(&heading), None, None).unwrap();
        assert_eq!(tr.doc().child(0).attrs()["level"], json!(1));
        tr.set_node_attribute(0, "level", json!(4)).unwrap();
        assert_eq!(tr.doc().child(0).attrs()["level"], json!(4));
        assert_eq!(tr.doc().text_content(), "a");
    }

    #[test]
    fn test_node_marks() {
        let schema = basic::schema();
        let d = doc(json!([{"type": "paragraph", "content": [
            {"type": "image", "attrs": {"src": "x.png"}}
        ]}]));
        let em = schema.mark("em", None).unwrap();
        let strong = schema.mark("strong", None).unwrap();
        let mut tr = Transform::new(d.clone());
        tr.add_node_mark(1, em).unwrap().add_node_mark(1, strong).unwrap();
        assert_eq!(tr.doc().node_at(1).unwrap().marks().len(), 2);
        tr.remove_node_mark(1, &MarkMatch::All).unwrap();
        assert_eq!(tr.doc(), &d);
        assert!(tr.remove_node_mark(50, &MarkMatch::All).is_err());
    }

    #[test]
    fn test_add_and_remove_mark() {
        let schema = basic::schema();
        let d = doc(json!([p("hello")]));
        let em = schema.mark("em", None).unwrap();
        let mut tr = Transform::new(d.clone());
        tr.add_mark(2, 4, &em).unwrap();
        assert_eq!(tr.doc().child(0).child_count(), 3);
        tr.remove_mark(1, 6, &MarkMatch::Mark(em)).unwrap();
        assert_eq!(tr.doc(), &d);
    }
}
