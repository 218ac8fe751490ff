use super::{Fragment, ModelError, Node, Schema};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A piece of a document. Its start and end may be "open": the first
/// `open_start` levels of the leftmost spine (and `open_end` of the
/// rightmost) continue outside the slice.
#[derive(Clone, PartialEq)]
pub struct Slice {
    content: Fragment,
    open_start: usize,
    open_end: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SliceJson {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    open_start: Option<usize>,
    #[serde(default)]
    open_end: Option<usize>,
}

impl Slice {
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Self {
        Self {
            content,
            open_start,
            open_end,
        }
    }

    pub fn empty() -> Self {
        Self::new(Fragment::empty(), 0, 0)
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn open_start(&self) -> usize {
        self.open_start
    }

    pub fn open_end(&self) -> usize {
        self.open_end
    }

    /// Size this slice adds when inserted.
    pub fn size(&self) -> usize {
        self.content
            .size()
            .saturating_sub(self.open_start + self.open_end)
    }

    /// Inserts `fragment` at `pos` (relative to the slice's content), if
    /// the position lies in the open structure of the slice.
    pub fn insert_at(&self, pos: usize, fragment: &Fragment) -> Option<Slice> {
        insert_into(&self.content, pos + self.open_start, fragment, None)
            .map(|content| Slice::new(content, self.open_start, self.open_end))
    }

    pub fn remove_between(&self, from: usize, to: usize) -> Result<Slice, ModelError> {
        let content = remove_range(&self.content, from + self.open_start, to + self.open_start)?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    /// Wraps `fragment` in a slice opened as deep as its edges allow. With
    /// `open_isolating` false, isolating nodes stay closed.
    pub fn max_open(fragment: Fragment, open_isolating: bool) -> Slice {
        let mut open_start = 0;
        let mut node = fragment.first_child().cloned();
        while let Some(n) = node {
            if n.is_leaf() || (!open_isolating && n.node_type().is_isolating()) {
                break;
            }
            open_start += 1;
            node = n.first_child().cloned();
        }
        let mut open_end = 0;
        let mut node = fragment.last_child().cloned();
        while let Some(n) = node {
            if n.is_leaf() || (!open_isolating && n.node_type().is_isolating()) {
                break;
            }
            open_end += 1;
            node = n.last_child().cloned();
        }
        Slice::new(fragment, open_start, open_end)
    }

    /// JSON form, or `None` for an empty slice.
    pub fn to_json(&self) -> Option<Value> {
        let content = self.content.to_json()?;
        let mut obj = Map::new();
        obj.insert("content".into(), content);
        if self.open_start > 0 {
            obj.insert("openStart".into(), Value::from(self.open_start));
        }
        if self.open_end > 0 {
            obj.insert("openEnd".into(), Value::from(self.open_end));
        }
        Some(Value::Object(obj))
    }

    pub fn from_json(schema: &Schema, json: Option<&Value>) -> Result<Slice, ModelError> {
        let Some(json) = json.filter(|v| !v.is_null()) else {
            return Ok(Slice::empty());
        };
        let raw = SliceJson::deserialize(json)
            .map_err(|e| ModelError::range(format!("Invalid input for Slice.fromJSON: {e}")))?;
        let content = Fragment::from_json(schema, raw.content.as_ref())?;
        let open_start = raw.open_start.unwrap_or(0);
        let open_end = raw.open_end.unwrap_or(0);
        if open_start > spine_depth(&content, Fragment::first_child)
            || open_end > spine_depth(&content, Fragment::last_child)
        {
            return Err(ModelError::range(
                "Invalid input for Slice.fromJSON: open depth exceeds content",
            ));
        }
        Ok(Slice::new(content, open_start, open_end))
    }
}

/// How many non-leaf levels the edge of `fragment` goes down.
fn spine_depth(fragment: &Fragment, edge: fn(&Fragment) -> Option<&Node>) -> usize {
    let mut depth = 0;
    let mut cur = edge(fragment);
    while let Some(node) = cur {
        if node.is_leaf() {
            break;
        }
        depth += 1;
        cur = edge(node.content());
    }
    depth
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> Result<Fragment, ModelError> {
    let found = content.find_index(from, -1)?;
    let (index, offset) = (found.index, found.offset);
    let child = content.maybe_child(index);
    let found_to = content.find_index(to, -1)?;
    let (index_to, offset_to) = (found_to.index, found_to.offset);
    if offset == from || child.is_some_and(Node::is_text) {
        if offset_to != to && !content.child(index_to).is_text() {
            return Err(ModelError::range("Removing non-flat range"));
        }
        return Ok(content.cut(0, from).append(&content.cut_from(to)));
    }
    let Some(child) = child else {
        return Err(ModelError::range("Removing non-flat range"));
    };
    if index != index_to {
        return Err(ModelError::range("Removing non-flat range"));
    }
    let inner = remove_range(child.content(), from - offset - 1, to - offset - 1)?;
    Ok(content.replace_child(index, child.copy(inner)))
}

fn insert_into(
    content: &Fragment,
    dist: usize,
    insert: &Fragment,
    parent: Option<&Node>,
) -> Option<Fragment> {
    let found = content.find_index(dist, -1).ok()?;
    let child = content.maybe_child(found.index);
    if found.offset == dist || child.is_some_and(Node::is_text) {
        if parent.is_some_and(|p| !p.can_replace(found.index, found.index, insert)) {
            return None;
        }
        return Some(content.cut(0, dist).append(insert).append(&content.cut_from(dist)));
    }
    let child = child?;
    let inner = insert_into(child.content(), dist - found.offset - 1, insert, Some(child))?;
    Some(content.replace_child(found.index, child.copy(inner)))
}

impl Default for Slice {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for Slice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().unwrap_or(Value::Null).serialize(serializer)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.content, self.open_start, self.open_end)
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
