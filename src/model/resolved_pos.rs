use super::node::NodeInner;
use super::{Mark, ModelError, Node};
use std::fmt;
use std::sync::Weak;
use tracing::trace;

/// Number of resolved positions remembered per schema.
pub(crate) const RESOLVE_CACHE_SIZE: usize = 12;

#[derive(Debug, Clone)]
struct PathEntry {
    node: Node,
    index: usize,
    /// Position at which the child at `index` starts.
    offset: usize,
}

/// A position in a document, with the chain of ancestors around it.
#[derive(Debug, Clone)]
pub struct ResolvedPos {
    pos: usize,
    path: Vec<PathEntry>,
    parent_offset: usize,
}

impl ResolvedPos {
    pub(crate) fn resolve(doc: &Node, pos: usize) -> Result<ResolvedPos, ModelError> {
        if pos > doc.content().size() {
            return Err(ModelError::range(format!("Position {pos} out of range")));
        }
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc.clone();
        loop {
            let found = node.content().find_index(parent_offset, -1)?;
            let rem = parent_offset - found.offset;
            path.push(PathEntry {
                node: node.clone(),
                index: found.index,
                offset: start + found.offset,
            });
            if rem == 0 {
                break;
            }
            let child = node.child(found.index).clone();
            if child.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += found.offset + 1;
            node = child;
        }
        Ok(ResolvedPos {
            pos,
            path,
            parent_offset,
        })
    }

    pub(crate) fn resolve_cached(doc: &Node, pos: usize) -> Result<ResolvedPos, ModelError> {
        let cache = &doc.node_type().schema().inner.resolve_cache;
        if let Some(hit) = cache.lock().lookup(doc, pos) {
            trace!(pos, "resolve cache hit");
            return Ok(hit);
        }
        let resolved = Self::resolve(doc, pos)?;
        cache.lock().insert(&resolved);
        Ok(resolved)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Number of levels the parent is below the root.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    /// Offset into the parent node.
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    pub fn parent(&self) -> &Node {
        self.node(self.depth())
    }

    pub fn doc(&self) -> &Node {
        self.node(0)
    }

    /// The ancestor at `depth`.
    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    /// Index into the ancestor at `depth`.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Index pointing after this position in the ancestor at `depth`.
    pub fn index_after(&self, depth: usize) -> usize {
        let bump = usize::from(!(depth == self.depth() && self.text_offset() == 0));
        self.index(depth) + bump
    }

    /// Position at the start of the ancestor at `depth`'s content.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].offset + 1
        }
    }

    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content().size()
    }

    /// Position directly before the ancestor at `depth`. `depth` may be one
    /// past [`depth`](Self::depth), in which case this is `pos`.
    ///
    /// # Panics
    ///
    /// Panics when `depth` is 0: there is no position before the root.
    pub fn before(&self, depth: usize) -> usize {
        assert!(depth > 0, "There is no position before the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].offset
        }
    }

    /// Position directly after the ancestor at `depth`.
    ///
    /// # Panics
    ///
    /// Panics when `depth` is 0: there is no position after the root.
    pub fn after(&self, depth: usize) -> usize {
        assert!(depth > 0, "There is no position after the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].offset + self.path[depth].node.node_size()
        }
    }

    /// Offset into a text node when the position points into one.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.depth()].offset
    }

    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        let child = parent.maybe_child(index)?;
        let d_off = self.text_offset();
        if d_off > 0 {
            Some(child.cut(d_off, child.node_size()))
        } else {
            Some(child.clone())
        }
    }

    pub fn node_before(&self) -> Option<Node> {
        let index = self.index(self.depth());
        let d_off = self.text_offset();
        if d_off > 0 {
            return Some(self.parent().child(index).cut(0, d_off));
        }
        if index == 0 {
            None
        } else {
            Some(self.parent().child(index - 1).clone())
        }
    }

    /// Position of child `index` in the ancestor at `depth`.
    pub fn pos_at_index(&self, index: usize, depth: usize) -> usize {
        let node = self.node(depth);
        let start = self.start(depth);
        start
            + node.content().children()[..index]
                .iter()
                .map(Node::node_size)
                .sum::<usize>()
    }

    /// Marks that text inserted here would get. Non-inclusive marks only
    /// continue when the node after has them too.
    pub fn marks(&self) -> Vec<Mark> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if parent.content().size() == 0 {
            return Vec::new();
        }
        if self.text_offset() > 0 {
            return parent.child(index).marks().to_vec();
        }
        let (main, other) = match index.checked_sub(1).and_then(|i| parent.maybe_child(i)) {
            Some(before) => (before, parent.maybe_child(index)),
            None => match parent.maybe_child(index) {
                Some(after) => (after, None),
                None => return Vec::new(),
            },
        };
        let mut marks = main.marks().to_vec();
        marks.retain(|m| {
            m.mark_type().spec().inclusive != Some(false)
                || other.is_some_and(|o| m.is_in_set(o.marks()))
        });
        marks
    }

    /// Marks to keep after deleting from here to `end`, or `None` when not
    /// directly before inline content.
    pub fn marks_across(&self, end: &ResolvedPos) -> Option<Vec<Mark>> {
        let after = self.parent().maybe_child(self.index(self.depth()))?;
        if !after.is_inline() {
            return None;
        }
        let next = end.parent().maybe_child(end.index(end.depth()));
        let mut marks = after.marks().to_vec();
        marks.retain(|m| {
            m.mark_type().spec().inclusive != Some(false)
                || next.is_some_and(|n| m.is_in_set(n.marks()))
        });
        Some(marks)
    }

    /// Depth of the deepest ancestor that also contains `pos`.
    pub fn shared_depth(&self, pos: usize) -> usize {
        (1..=self.depth())
            .rev()
            .find(|&depth| self.start(depth) <= pos && self.end(depth) >= pos)
            .unwrap_or(0)
    }

    pub fn block_range(&self, other: &ResolvedPos) -> Option<NodeRange> {
        self.block_range_with(other, |_| true)
    }

    /// The range of block content around this position and `other`, at
    /// the deepest depth whose node passes `pred`.
    pub fn block_range_with<P>(&self, other: &ResolvedPos, pred: P) -> Option<NodeRange>
    where
        P: Fn(&Node) -> bool,
    {
        if other.pos < self.pos {
            return other.block_range_with(self, pred);
        }
        let skip = usize::from(self.parent().inline_content() || self.pos == other.pos);
        let top = self.depth().checked_sub(skip)?;
        (0..=top)
            .rev()
            .find(|&d| other.pos <= self.end(d) && pred(self.node(d)))
            .map(|depth| NodeRange::new(self.clone(), other.clone(), depth))
    }

    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.pos - self.parent_offset == other.pos - other.parent_offset
    }

    pub fn max<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos > self.pos { other } else { self }
    }

    pub fn min<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos < self.pos { other } else { self }
    }
}

impl fmt::Display for ResolvedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for depth in 1..=self.depth() {
            if depth > 1 {
                f.write_str("/")?;
            }
            write!(f, "{}_{}", self.node(depth).node_type().name(), self.index(depth - 1))?;
        }
        write!(f, ":{}", self.parent_offset)
    }
}

/// A flat range of sibling block content at a given depth.
#[derive(Debug, Clone)]
pub struct NodeRange {
    pub from: ResolvedPos,
    pub to: ResolvedPos,
    pub depth: usize,
}

impl NodeRange {
    pub fn new(from: ResolvedPos, to: ResolvedPos, depth: usize) -> Self {
        Self { from, to, depth }
    }

    pub fn start(&self) -> usize {
        self.from.before(self.depth + 1)
    }

    pub fn end(&self) -> usize {
        self.to.after(self.depth + 1)
    }

    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}

struct CacheEntry {
    doc: Weak<NodeInner>,
    pos: usize,
    steps: Vec<(usize, usize)>,
    parent_offset: usize,
}

/// Round-robin cache of resolved positions. Entries hold the document
/// weakly, so they never keep a document alive.
pub(crate) struct ResolveCache {
    entries: Vec<CacheEntry>,
    next: usize,
}

impl ResolveCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::with_capacity(RESOLVE_CACHE_SIZE),
            next: 0,
        }
    }

    fn lookup(&self, doc: &Node, pos: usize) -> Option<ResolvedPos> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.pos == pos && doc.is_same_as(&e.doc))?;
        let mut path = Vec::with_capacity(entry.steps.len());
        let mut node = doc.clone();
        for (i, &(index, offset)) in entry.steps.iter().enumerate() {
            let next = if i + 1 < entry.steps.len() {
                Some(node.child(index).clone())
            } else {
                None
            };
            path.push(PathEntry {
                node,
                index,
                offset,
            });
            match next {
                Some(child) => node = child,
                None => break,
            }
        }
        Some(ResolvedPos {
            pos,
            path,
            parent_offset: entry.parent_offset,
        })
    }

    fn insert(&mut self, resolved: &ResolvedPos) {
        let entry = CacheEntry {
            doc: resolved.doc().downgrade(),
            pos: resolved.pos,
            steps: resolved.path.iter().map(|p| (p.index, p.offset)).collect(),
            parent_offset: resolved.parent_offset,
        };
        if self.entries.len() < RESOLVE_CACHE_SIZE {
            self.entries.push(entry);
        } else {
            self.entries[self.next] = entry;
        }
        self.next = (self.next + 1) % RESOLVE_CACHE_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use serde_json::json;

    fn doc() -> Node {
        basic::schema()
            .node_from_json(&json!({
                "type": "doc",
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "ab"}]},
                    {"type": "blockquote", "content": [
                        {"type": "paragraph", "content": [
                            {"type": "text", "text": "cd"},
                            {"type": "text", "text": "ef", "marks": [{"type": "em"}]}
                        ]}
                    ]}
                ]
            }))
            .unwrap()
    }

    #[test]
    fn test_resolve_paths() {
        let doc = doc();
        let expected: [(usize, usize, &str); 5] = [
            (0, 0, ":0"),
            (1, 1, "paragraph_0:0"),
            (3, 1, "paragraph_0:2"),
            (6, 2, "blockquote_1/paragraph_0:0"),
            (9, 2, "blockquote_1/paragraph_0:3"),
        ];
        for (pos, depth, shown) in expected {
            let rp = doc.resolve(pos).unwrap();
            assert_eq!(rp.depth(), depth, "depth at {pos}");
            assert_eq!(rp.to_string(), shown);
        }
        assert!(doc.resolve(doc.content().size() + 1).is_err());
    }

    #[test]
    fn test_positions_around_nodes() {
        let doc = doc();
        let rp = doc.resolve(7).unwrap();
        assert_eq!(rp.start(2), 6);
        assert_eq!(rp.end(2), 10);
        assert_eq!(rp.before(2), 5);
        assert_eq!(rp.after(2), 11);
        assert_eq!(rp.before(1), 4);
        assert_eq!(rp.after(1), 12);
        assert_eq!(rp.text_offset(), 1);
        assert_eq!(rp.node_before().unwrap().text(), Some("c"));
        assert_eq!(rp.node_after().unwrap().text(), Some("d"));
        assert_eq!(rp.pos_at_index(1, 2), 8);
        assert_eq!(rp.shared_depth(11), 1);
        assert_eq!(rp.shared_depth(2), 0);
    }

    #[test]
    fn test_marks_at_boundary() {
        let doc = doc();
        assert!(doc.resolve(8).unwrap().marks().is_empty());
        assert_eq!(doc.resolve(9).unwrap().marks().len(), 1);
        assert_eq!(doc.resolve(10).unwrap().marks().len(), 1);
    }

    #[test]
    fn test_cache_matches_uncached() {
        let doc = doc();
        for pos in 0..=doc.content().size() {
            let a = doc.resolve(pos).unwrap();
            let b = doc.resolve(pos).unwrap();
            let c = doc.resolve_no_cache(pos).unwrap();
            assert_eq!(a.to_string(), c.to_string());
            assert_eq!(b.to_string(), c.to_string());
            assert_eq!(b.depth(), c.depth());
            assert_eq!(b.parent(), c.parent());
        }
    }

    #[test]
    fn test_block_range() {
        let doc = doc();
        let from = doc.resolve(7).unwrap();
        let to = doc.resolve(9).unwrap();
        let range = from.block_range(&to).unwrap();
        assert_eq!(range.depth, 1);
        assert_eq!((range.start(), range.end()), (5, 11));
        let far = doc.resolve(2).unwrap();
        let range = far.block_range(&from).unwrap();
        assert_eq!(range.depth, 0);
        assert_eq!((range.start_index(), range.end_index()), (0, 2));
    }
}
