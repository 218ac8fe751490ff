use super::{ModelError, Node, Schema};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Child index and the offset at which that child starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOffset {
    pub index: usize,
    pub offset: usize,
}

/// An immutable sequence of sibling nodes.
///
/// Adjacent text nodes with the same marks never appear side by side; they
/// are merged when a fragment is built with [`Fragment::from_array`] or
/// [`Fragment::append`].
#[derive(Clone)]
pub struct Fragment {
    content: Arc<[Node]>,
    size: usize,
}

impl Default for Fragment {
    fn default() -> Self {
        Self::empty()
    }
}

impl Fragment {
    pub fn empty() -> Self {
        Self {
            content: Arc::from(Vec::new()),
            size: 0,
        }
    }

    /// Builds a fragment from nodes already known to be normalized.
    pub(crate) fn from_parts(nodes: Vec<Node>) -> Self {
        let size = nodes.iter().map(Node::node_size).sum();
        Self {
            content: Arc::from(nodes),
            size,
        }
    }

    /// Builds a fragment, merging adjacent same-markup text nodes.
    pub fn from_array(nodes: Vec<Node>) -> Self {
        let mut joined: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(last) = joined.last_mut() {
                if node.is_text() && node.same_markup(last) {
                    *last = last.merge_text(&node);
                    continue;
                }
            }
            joined.push(node);
        }
        Self::from_parts(joined)
    }

    /// Total size of the content, in position units.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn child(&self, index: usize) -> &Node {
        &self.content[index]
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.content.get(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last()
    }

    pub fn children(&self) -> &[Node] {
        &self.content
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.content.iter()
    }

    /// Calls `f` for every node overlapping `from..to`, with the node, its
    /// start position, its parent and its index. Returning `false` skips the
    /// node's children.
    pub fn nodes_between<F>(
        &self,
        from: usize,
        to: usize,
        f: &mut F,
        node_start: usize,
        parent: Option<&Node>,
    ) where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        let mut pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos, parent, i) && child.content().size() > 0 {
                let start = pos + 1;
                child.content().nodes_between(
                    from.saturating_sub(start),
                    child.content().size().min(to.saturating_sub(start)),
                    f,
                    node_start + start,
                    Some(child),
                );
            }
            pos = end;
        }
    }

    /// Calls `f` for every descendant node.
    pub fn descendants<F>(&self, mut f: F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.size, &mut f, 0, None);
    }

    /// Text between `from` and `to`, with `block_separator` between
    /// textblocks and `leaf_text` standing in for non-text leaves that do
    /// not define their own.
    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(
            from,
            to,
            &mut |node: &Node, pos: usize, _: Option<&Node>, _: usize| {
                let node_text = if let Some(t) = node.text() {
                    char_slice(t, from.saturating_sub(pos), to.saturating_sub(pos)).to_string()
                } else if !node.is_leaf() {
                    String::new()
                } else if let Some(leaf) = leaf_text {
                    leaf.to_string()
                } else {
                    node.node_type().spec().leaf_text.clone().unwrap_or_default()
                };
                let starts_block =
                    (node.is_block() && node.is_leaf() && !node_text.is_empty()) || node.is_textblock();
                if let (true, Some(sep)) = (starts_block, block_separator) {
                    if first {
                        first = false;
                    } else {
                        text.push_str(sep);
                    }
                }
                text.push_str(&node_text);
                true
            },
            0,
            None,
        );
        text
    }

    /// Concatenates two fragments, joining touching same-markup text.
    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.size == 0 {
            return self.clone();
        }
        if self.size == 0 {
            return other.clone();
        }
        let mut content: Vec<Node> = self.content.to_vec();
        let mut rest = other.content.iter();
        if let (Some(last), Some(first)) = (content.last_mut(), other.first_child()) {
            if last.is_text() && last.same_markup(first) {
                *last = last.merge_text(first);
                rest.next();
            }
        }
        content.extend(rest.cloned());
        Fragment {
            content: Arc::from(content),
            size: self.size + other.size,
        }
    }

    /// The part of this fragment between `from` and `to`.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to == self.size {
            return self.clone();
        }
        let mut result = Vec::new();
        let mut size = 0;
        if to > from {
            let mut pos = 0;
            for child in self.content.iter() {
                if pos >= to {
                    break;
                }
                let end = pos + child.node_size();
                if end > from {
                    let piece = if pos < from || end > to {
                        if child.is_text() {
                            child.cut(from.saturating_sub(pos), child.node_size().min(to - pos))
                        } else {
                            child.cut(
                                from.saturating_sub(pos + 1),
                                child.content().size().min(to.saturating_sub(pos + 1)),
                            )
                        }
                    } else {
                        child.clone()
                    };
                    size += piece.node_size();
                    result.push(piece);
                }
                pos = end;
            }
        }
        Fragment {
            content: Arc::from(result),
            size,
        }
    }

    pub fn cut_from(&self, from: usize) -> Fragment {
        self.cut(from, self.size)
    }

    /// Children `from..to` as a new fragment.
    pub fn cut_by_index(&self, from: usize, to: usize) -> Fragment {
        if from == to {
            return Fragment::empty();
        }
        if from == 0 && to == self.content.len() {
            return self.clone();
        }
        Fragment::from_parts(self.content[from..to].to_vec())
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let current = &self.content[index];
        if current.ptr_eq(&node) {
            return self.clone();
        }
        let size = self.size + node.node_size() - current.node_size();
        let mut content = self.content.to_vec();
        content[index] = node;
        Fragment {
            content: Arc::from(content),
            size,
        }
    }

    pub fn add_to_start(&self, node: Node) -> Fragment {
        let size = self.size + node.node_size();
        let mut content = Vec::with_capacity(self.content.len() + 1);
        content.push(node);
        content.extend(self.content.iter().cloned());
        Fragment {
            content: Arc::from(content),
            size,
        }
    }

    pub fn add_to_end(&self, node: Node) -> Fragment {
        let size = self.size + node.node_size();
        let mut content = self.content.to_vec();
        content.push(node);
        Fragment {
            content: Arc::from(content),
            size,
        }
    }

    /// Finds the child containing or touching `pos`. With `round > 0`, a
    /// position inside a child resolves to the index after it.
    pub fn find_index(&self, pos: usize, round: i32) -> Result<IndexOffset, ModelError> {
        if pos == 0 {
            return Ok(IndexOffset { index: 0, offset: pos });
        }
        if pos == self.size {
            return Ok(IndexOffset {
                index: self.content.len(),
                offset: pos,
            });
        }
        if pos > self.size {
            return Err(ModelError::range(format!(
                "Position {pos} outside of fragment ({self})"
            )));
        }
        let mut cur_pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            let end = cur_pos + child.node_size();
            if end >= pos {
                if end == pos || round > 0 {
                    return Ok(IndexOffset {
                        index: i + 1,
                        offset: end,
                    });
                }
                return Ok(IndexOffset {
                    index: i,
                    offset: cur_pos,
                });
            }
            cur_pos = end;
        }
        Err(ModelError::range(format!(
            "Position {pos} outside of fragment ({self})"
        )))
    }

    /// First position at which this fragment and `other` differ.
    pub fn find_diff_start(&self, other: &Fragment, pos: usize) -> Option<usize> {
        let mut pos = pos;
        let mut i = 0;
        loop {
            if i == self.child_count() || i == other.child_count() {
                return if self.child_count() == other.child_count() {
                    None
                } else {
                    Some(pos)
                };
            }
            let (a, b) = (self.child(i), other.child(i));
            if a.ptr_eq(b) {
                pos += a.node_size();
                i += 1;
                continue;
            }
            if !a.same_markup(b) {
                return Some(pos);
            }
            if let (Some(ta), Some(tb)) = (a.text(), b.text()) {
                if ta != tb {
                    let same = ta.chars().zip(tb.chars()).take_while(|(x, y)| x == y).count();
                    return Some(pos + same);
                }
            }
            if a.content().size() > 0 || b.content().size() > 0 {
                if let Some(inner) = a.content().find_diff_start(b.content(), pos + 1) {
                    return Some(inner);
                }
            }
            pos += a.node_size();
            i += 1;
        }
    }

    /// Last positions (in this fragment and in `other`) at which they differ,
    /// scanning from the end.
    pub fn find_diff_end(
        &self,
        other: &Fragment,
        pos: usize,
        other_pos: usize,
    ) -> Option<(usize, usize)> {
        let (mut pos_a, mut pos_b) = (pos, other_pos);
        let (mut i_a, mut i_b) = (self.child_count(), other.child_count());
        loop {
            if i_a == 0 || i_b == 0 {
                return if i_a == i_b { None } else { Some((pos_a, pos_b)) };
            }
            i_a -= 1;
            i_b -= 1;
            let (a, b) = (self.child(i_a), other.child(i_b));
            let size = a.node_size();
            if a.ptr_eq(b) {
                pos_a -= size;
                pos_b -= size;
                continue;
            }
            if !a.same_markup(b) {
                return Some((pos_a, pos_b));
            }
            if let (Some(ta), Some(tb)) = (a.text(), b.text()) {
                if ta != tb {
                    let same = ta
                        .chars()
                        .rev()
                        .zip(tb.chars().rev())
                        .take_while(|(x, y)| x == y)
                        .count();
                    return Some((pos_a - same, pos_b - same));
                }
            }
            if a.content().size() > 0 || b.content().size() > 0 {
                if let Some(inner) = a.content().find_diff_end(b.content(), pos_a - 1, pos_b - 1) {
                    return Some(inner);
                }
            }
            pos_a -= size;
            pos_b -= size;
        }
    }

    /// JSON array of the children, or `None` when empty.
    pub fn to_json(&self) -> Option<Value> {
        if self.content.is_empty() {
            return None;
        }
        Some(Value::Array(self.content.iter().map(Node::to_json).collect()))
    }

    pub fn from_json(schema: &Schema, json: Option<&Value>) -> Result<Fragment, ModelError> {
        match json {
            None | Some(Value::Null) => Ok(Fragment::empty()),
            Some(Value::Array(items)) => {
                let nodes = items
                    .iter()
                    .map(|item| Node::from_json(schema, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Fragment::from_array(nodes))
            }
            Some(_) => Err(ModelError::range("Invalid input for Fragment.fromJSON")),
        }
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.content.len() == other.content.len()
            && self.content.iter().zip(other.content.iter()).all(|(a, b)| a == b)
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Self {
        Fragment::from_parts(vec![node])
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment::from_array(nodes)
    }
}

impl From<Option<Node>> for Fragment {
    fn from(node: Option<Node>) -> Self {
        node.map(Fragment::from).unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a Fragment {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.iter()
    }
}

impl Serialize for Fragment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().unwrap_or(Value::Array(Vec::new())).serialize(serializer)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        fmt_children(self, f)?;
        f.write_str(">")
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Writes children comma-separated, without brackets.
pub(crate) fn fmt_children(fragment: &Fragment, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, child) in fragment.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(child, f)?;
    }
    Ok(())
}

/// Slices `text` by char offsets, clamping to its length.
pub(crate) fn char_slice(text: &str, from: usize, to: usize) -> &str {
    let start = byte_offset(text, from);
    let end = byte_offset(text, to.max(from));
    &text[start..end]
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(i, _)| i)
}
