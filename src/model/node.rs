use super::fragment::fmt_children;
use super::mark::MarkJson;
use super::{
    char_slice, replace, Attrs, ContentMatch, Fragment, Mark, MarkType, ModelError, NodeType,
    ResolvedPos, Schema, Slice,
};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};

pub(crate) struct NodeInner {
    node_type: NodeType,
    attrs: Attrs,
    content: Fragment,
    marks: Vec<Mark>,
    text: Option<String>,
    /// Length of `text` in chars.
    text_len: usize,
}

/// A node in a document tree. Cloning is cheap and shares the subtree.
///
/// Text nodes carry a string instead of content; their size is the number
/// of chars in it. Every other leaf has size 1, and non-leaf nodes have
/// size `content.size() + 2` for their opening and closing tokens.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

/// A child of a node together with its index and start offset.
#[derive(Debug, Clone)]
pub struct ChildAt {
    pub node: Option<Node>,
    pub index: usize,
    pub offset: usize,
}

/// Wire form of a node.
#[derive(Debug, Deserialize)]
struct NodeJson {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    attrs: Option<Attrs>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    marks: Option<Vec<MarkJson>>,
    #[serde(default)]
    text: Option<Value>,
}

impl Node {
    pub(crate) fn new(node_type: NodeType, attrs: Attrs, content: Fragment, marks: Vec<Mark>) -> Self {
        Node(Arc::new(NodeInner {
            node_type,
            attrs,
            content,
            marks,
            text: None,
            text_len: 0,
        }))
    }

    pub(crate) fn new_text(node_type: NodeType, text: &str, marks: Vec<Mark>) -> Self {
        Node(Arc::new(NodeInner {
            node_type,
            attrs: Attrs::new(),
            content: Fragment::empty(),
            marks,
            text_len: text.chars().count(),
            text: Some(text.to_string()),
        }))
    }

    pub(crate) fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn is_same_as(&self, weak: &Weak<NodeInner>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.0), weak.as_ptr())
    }

    pub fn node_type(&self) -> &NodeType {
        &self.0.node_type
    }

    pub fn attrs(&self) -> &Attrs {
        &self.0.attrs
    }

    pub fn content(&self) -> &Fragment {
        &self.0.content
    }

    pub fn marks(&self) -> &[Mark] {
        &self.0.marks
    }

    /// The string of a text node.
    pub fn text(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    pub fn node_size(&self) -> usize {
        if self.0.text.is_some() {
            self.0.text_len
        } else if self.is_leaf() {
            1
        } else {
            2 + self.0.content.size()
        }
    }

    pub fn child_count(&self) -> usize {
        self.0.content.child_count()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn child(&self, index: usize) -> &Node {
        self.0.content.child(index)
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.0.content.maybe_child(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.0.content.first_child()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.0.content.last_child()
    }

    pub fn is_block(&self) -> bool {
        self.0.node_type.is_block()
    }

    pub fn is_textblock(&self) -> bool {
        self.0.node_type.is_textblock()
    }

    pub fn inline_content(&self) -> bool {
        self.0.node_type.inline_content()
    }

    pub fn is_inline(&self) -> bool {
        self.0.node_type.is_inline()
    }

    pub fn is_text(&self) -> bool {
        self.0.text.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.0.node_type.is_leaf()
    }

    pub fn is_atom(&self) -> bool {
        self.0.node_type.is_atom()
    }

    /// Calls `f` for every descendant overlapping `from..to` (relative to
    /// this node's content). Returning `false` skips a node's children.
    pub fn nodes_between<F>(&self, from: usize, to: usize, mut f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.0.content.nodes_between(from, to, &mut f, 0, Some(self));
    }

    pub fn descendants<F>(&self, f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.0.content.size(), f);
    }

    pub fn text_content(&self) -> String {
        if let Some(text) = self.text() {
            return text.to_string();
        }
        if self.is_leaf() {
            if let Some(leaf) = &self.0.node_type.spec().leaf_text {
                return leaf.clone();
            }
        }
        self.text_between(0, self.0.content.size(), Some(""), None)
    }

    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        match self.text() {
            Some(text) => char_slice(text, from, to).to_string(),
            None => self
                .0
                .content
                .text_between(from, to, block_separator, leaf_text),
        }
    }

    /// Same type, attributes and marks.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.has_markup(other.node_type(), Some(other.attrs()), Some(other.marks()))
    }

    pub fn has_markup(&self, node_type: &NodeType, attrs: Option<&Attrs>, marks: Option<&[Mark]>) -> bool {
        let empty = Attrs::new();
        let attrs = attrs.or(node_type.default_attrs()).unwrap_or(&empty);
        &self.0.node_type == node_type
            && &self.0.attrs == attrs
            && Mark::same_set(&self.0.marks, marks.unwrap_or(&[]))
    }

    /// This node with different content. Text nodes are returned as is.
    pub fn copy(&self, content: Fragment) -> Node {
        if self.is_text() {
            return self.clone();
        }
        Node::new(
            self.0.node_type.clone(),
            self.0.attrs.clone(),
            content,
            self.0.marks.clone(),
        )
    }

    /// This node with the given mark set.
    pub fn mark(&self, marks: Vec<Mark>) -> Node {
        if Mark::same_set(&marks, &self.0.marks) {
            return self.clone();
        }
        Node(Arc::new(NodeInner {
            node_type: self.0.node_type.clone(),
            attrs: self.0.attrs.clone(),
            content: self.0.content.clone(),
            marks,
            text: self.0.text.clone(),
            text_len: self.0.text_len,
        }))
    }

    /// A text node with the same markup and different (non-empty) text.
    pub fn with_text(&self, text: &str) -> Node {
        if self.text() == Some(text) {
            return self.clone();
        }
        Node::new_text(self.0.node_type.clone(), text, self.0.marks.clone())
    }

    pub(crate) fn merge_text(&self, other: &Node) -> Node {
        let mut joined = String::from(self.text().unwrap_or(""));
        joined.push_str(other.text().unwrap_or(""));
        self.with_text(&joined)
    }

    /// The part of this node between `from` and `to`.
    pub fn cut(&self, from: usize, to: usize) -> Node {
        match self.text() {
            Some(text) => {
                if from == 0 && to == self.0.text_len {
                    self.clone()
                } else {
                    self.with_text(char_slice(text, from, to))
                }
            }
            None => {
                if from == 0 && to == self.0.content.size() {
                    self.clone()
                } else {
                    self.copy(self.0.content.cut(from, to))
                }
            }
        }
    }

    pub fn slice(&self, from: usize, to: usize) -> Result<Slice, ModelError> {
        self.slice_with_parents(from, to, false)
    }

    /// Cuts out `from..to` as a slice. With `include_parents`, the slice
    /// is opened all the way to this node instead of to the innermost
    /// shared ancestor.
    pub fn slice_with_parents(
        &self,
        from: usize,
        to: usize,
        include_parents: bool,
    ) -> Result<Slice, ModelError> {
        if from == to {
            return Ok(Slice::empty());
        }
        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        let depth = if include_parents { 0 } else { rfrom.shared_depth(to) };
        let start = rfrom.start(depth);
        let content = rfrom
            .node(depth)
            .content()
            .cut(rfrom.pos() - start, rto.pos() - start);
        Ok(Slice::new(content, rfrom.depth() - depth, rto.depth() - depth))
    }

    /// Replaces `from..to` with `slice`, which must fit.
    pub fn replace(&self, from: usize, to: usize, slice: &Slice) -> Result<Node, ModelError> {
        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        Ok(replace::replace(&rfrom, &rto, slice)?)
    }

    /// The node starting at `pos`, if any.
    pub fn node_at(&self, pos: usize) -> Option<Node> {
        let mut node = self.clone();
        let mut pos = pos;
        loop {
            let found = node.content().find_index(pos, -1).ok()?;
            let child = node.maybe_child(found.index)?.clone();
            if found.offset == pos || child.is_text() {
                return Some(child);
            }
            pos -= found.offset + 1;
            node = child;
        }
    }

    pub fn child_after(&self, pos: usize) -> Result<ChildAt, ModelError> {
        let found = self.0.content.find_index(pos, -1)?;
        Ok(ChildAt {
            node: self.maybe_child(found.index).cloned(),
            index: found.index,
            offset: found.offset,
        })
    }

    pub fn child_before(&self, pos: usize) -> Result<ChildAt, ModelError> {
        if pos == 0 {
            return Ok(ChildAt {
                node: None,
                index: 0,
                offset: 0,
            });
        }
        let found = self.0.content.find_index(pos, -1)?;
        if found.offset < pos {
            return Ok(ChildAt {
                node: Some(self.child(found.index).clone()),
                index: found.index,
                offset: found.offset,
            });
        }
        let node = self.child(found.index - 1).clone();
        Ok(ChildAt {
            index: found.index - 1,
            offset: found.offset - node.node_size(),
            node: Some(node),
        })
    }

    /// Resolves `pos`, consulting the schema's resolve cache.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, ModelError> {
        ResolvedPos::resolve_cached(self, pos)
    }

    pub fn resolve_no_cache(&self, pos: usize) -> Result<ResolvedPos, ModelError> {
        ResolvedPos::resolve(self, pos)
    }

    /// Whether a mark of `mark_type` appears anywhere in `from..to`.
    pub fn range_has_mark(&self, from: usize, to: usize, mark_type: &MarkType) -> bool {
        let mut found = false;
        if to > from {
            self.nodes_between(from, to, |node, _, _, _| {
                if mark_type.is_in_set(node.marks()).is_some() {
                    found = true;
                }
                !found
            });
        }
        found
    }

    /// The content match state after the first `index` children.
    pub fn content_match_at(&self, index: usize) -> Result<ContentMatch, ModelError> {
        self.0
            .node_type
            .content_match()
            .match_fragment_range(&self.0.content, 0, index)
            .ok_or_else(|| {
                ModelError::range("Called contentMatchAt on a node with invalid content")
            })
    }

    /// Whether replacing children `from..to` with `replacement` leaves valid
    /// content.
    pub fn can_replace(&self, from: usize, to: usize, replacement: &Fragment) -> bool {
        self.can_replace_range(from, to, replacement, 0, replacement.child_count())
    }

    /// Like [`can_replace`](Self::can_replace), using only children
    /// `start..end` of `replacement`.
    pub fn can_replace_range(
        &self,
        from: usize,
        to: usize,
        replacement: &Fragment,
        start: usize,
        end: usize,
    ) -> bool {
        let Ok(here) = self.content_match_at(from) else {
            return false;
        };
        let valid = here
            .match_fragment_range(replacement, start, end)
            .and_then(|one| one.match_fragment_range(&self.0.content, to, self.child_count()))
            .is_some_and(|two| two.valid_end());
        valid
            && replacement.children()[start..end]
                .iter()
                .all(|child| self.0.node_type.allows_marks(child.marks()))
    }

    /// Whether children `from..to` can be replaced by a node of `node_type`.
    pub fn can_replace_with(
        &self,
        from: usize,
        to: usize,
        node_type: &NodeType,
        marks: Option<&[Mark]>,
    ) -> bool {
        if let Some(marks) = marks {
            if !self.0.node_type.allows_marks(marks) {
                return false;
            }
        }
        let Ok(here) = self.content_match_at(from) else {
            return false;
        };
        here.match_type(node_type)
            .and_then(|start| start.match_fragment_range(&self.0.content, to, self.child_count()))
            .is_some_and(|end| end.valid_end())
    }

    /// Whether `other`'s content could be appended to this node's.
    pub fn can_append(&self, other: &Node) -> bool {
        if other.content().size() > 0 {
            self.can_replace(self.child_count(), self.child_count(), other.content())
        } else {
            self.0.node_type.compatible_content(other.node_type())
        }
    }

    /// Checks this node and its descendants against the schema.
    pub fn check(&self) -> Result<(), ModelError> {
        self.0.node_type.check_content(&self.0.content)?;
        self.0.node_type.check_attrs(&self.0.attrs)?;
        let mut copy = Vec::new();
        for mark in &self.0.marks {
            mark.mark_type().check_attrs(mark.attrs())?;
            copy = mark.add_to_set(&copy);
        }
        if !Mark::same_set(&copy, &self.0.marks) {
            let names: Vec<&str> = self.0.marks.iter().map(|m| m.mark_type().name()).collect();
            return Err(ModelError::range(format!(
                "Invalid collection of marks for node {}: {}",
                self.0.node_type.name(),
                names.join(",")
            )));
        }
        self.0.content.iter().try_for_each(Node::check)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.0.node_type.name().into()));
        if !self.0.attrs.is_empty() {
            obj.insert(
                "attrs".into(),
                Value::Object(self.0.attrs.clone().into_iter().collect()),
            );
        }
        if let Some(content) = self.0.content.to_json() {
            obj.insert("content".into(), content);
        }
        if !self.0.marks.is_empty() {
            obj.insert(
                "marks".into(),
                Value::Array(self.0.marks.iter().map(Mark::to_json).collect()),
            );
        }
        if let Some(text) = &self.0.text {
            obj.insert("text".into(), Value::String(text.clone()));
        }
        Value::Object(obj)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Node, ModelError> {
        let raw = NodeJson::deserialize(json)
            .map_err(|e| ModelError::range(format!("Invalid input for Node.fromJSON: {e}")))?;
        let marks = raw
            .marks
            .unwrap_or_default()
            .into_iter()
            .map(|m| Mark::from_raw(schema, m))
            .collect::<Result<Vec<_>, _>>()?;
        let node_type = schema.node_type(&raw.type_name).ok_or_else(|| {
            ModelError::range(format!("Unknown node type: {}", raw.type_name))
        })?;
        if node_type.is_text() {
            let Some(Value::String(text)) = raw.text else {
                return Err(ModelError::range("Invalid text node in JSON"));
            };
            return schema.text(&text, &marks);
        }
        let content = Fragment::from_json(schema, raw.content.as_ref())?;
        let node = node_type.create(raw.attrs.as_ref(), content, &marks)?;
        node_type.check_attrs(node.attrs())?;
        Ok(node)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.same_markup(other)
                && self.0.text == other.0.text
                && self.0.content == other.0.content)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn wrap_marks(marks: &[Mark], inner: String) -> String {
    marks
        .iter()
        .rev()
        .fold(inner, |acc, mark| format!("{}({acc})", mark.mark_type().name()))
}

struct Inner<'a>(&'a Fragment);

impl fmt::Display for Inner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_children(self.0, f)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match &self.0.text {
            Some(text) => Value::String(text.clone()).to_string(),
            None if self.0.content.size() > 0 => {
                format!("{}({})", self.0.node_type.name(), Inner(&self.0.content))
            }
            None => self.0.node_type.name().to_string(),
        };
        f.write_str(&wrap_marks(&self.0.marks, base))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use serde_json::json;

    fn doc() -> Node {
        let schema = basic::schema();
        schema
            .node_from_json(&json!({
                "type": "doc",
                "content": [
                    {"type": "paragraph", "content": [
                        {"type": "text", "text": "one "},
                        {"type": "text", "text": "two", "marks": [{"type": "em"}]}
                    ]},
                    {"type": "horizontal_rule"},
                    {"type": "blockquote", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "q"}]}
                    ]}
                ]
            }))
            .unwrap()
    }

    #[test]
    fn test_sizes() {
        let doc = doc();
        assert_eq!(doc.child(0).node_size(), 9);
        assert_eq!(doc.child(1).node_size(), 1);
        assert_eq!(doc.child(2).node_size(), 5);
        assert_eq!(doc.content().size(), 15);
        assert_eq!(doc.node_size(), 17);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            doc().to_string(),
            r#"doc(paragraph("one ", em("two")), horizontal_rule, blockquote(paragraph("q")))"#
        );
    }

    #[test]
    fn test_text_between() {
        let doc = doc();
        assert_eq!(doc.text_content(), "one twoq");
        assert_eq!(doc.text_between(0, doc.content().size(), Some("|"), Some("-")), "one two|-|q");
        assert_eq!(doc.text_between(2, 6, None, None), "ne t");
    }

    #[test]
    fn test_node_at_and_children() {
        let doc = doc();
        assert_eq!(doc.node_at(0).unwrap().node_type().name(), "paragraph");
        assert_eq!(doc.node_at(1).unwrap().text(), Some("one "));
        assert_eq!(doc.node_at(9).unwrap().node_type().name(), "horizontal_rule");
        assert!(doc.node_at(15).is_none());
        let after = doc.child_after(9).unwrap();
        assert_eq!(after.index, 1);
        let before = doc.child_before(9).unwrap();
        assert_eq!((before.index, before.offset), (0, 0));
    }

    #[test]
    fn test_range_has_mark() {
        let doc = doc();
        let em = doc.node_type().schema().mark_type("em").unwrap();
        assert!(doc.range_has_mark(0, 9, &em));
        assert!(!doc.range_has_mark(1, 4, &em));
    }

    #[test]
    fn test_slice_and_eq() {
        let doc = doc();
        let slice = doc.slice(3, 12).unwrap();
        assert_eq!((slice.open_start(), slice.open_end()), (1, 2));
        assert_eq!(slice.content().child_count(), 3);
        assert_eq!(doc, Node::from_json(doc.node_type().schema(), &doc.to_json()).unwrap());
    }

    #[test]
    fn test_check_rejects_bad_content() {
        let schema = basic::schema();
        let doc = schema.node("doc", None, Fragment::empty(), &[]).unwrap();
        assert!(doc.check().is_err());
        let para = schema.node("paragraph", None, Fragment::empty(), &[]).unwrap();
        assert!(para.check().is_ok());
    }

    #[test]
    fn test_from_json_errors() {
        let schema = basic::schema();
        assert!(Node::from_json(&schema, &json!({"type": "text"})).is_err());
        assert!(Node::from_json(&schema, &json!({"type": "bogus"})).is_err());
        assert!(Node::from_json(&schema, &json!(3)).is_err());
        assert!(Node::from_json(&schema, &json!({"type": "text", "text": ""})).is_err());
    }
}
