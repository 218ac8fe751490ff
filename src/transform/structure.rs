//! Structural queries and edits: lifting, wrapping, splitting, joining.

use super::map::{Assoc, Mappable};
use super::replace_step::{ReplaceAroundStep, ReplaceStep};
use super::{Transform, TransformError};
use crate::model::{Attrs, Fragment, Mark, ModelError, Node, NodeRange, NodeType, Slice};

/// A node type with attributes, used to describe wrapping or split nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapper {
    pub node_type: NodeType,
    pub attrs: Option<Attrs>,
}

impl Wrapper {
    pub fn new(node_type: NodeType, attrs: Option<Attrs>) -> Self {
        Self { node_type, attrs }
    }
}

impl From<NodeType> for Wrapper {
    fn from(node_type: NodeType) -> Self {
        Self::new(node_type, None)
    }
}

fn can_cut(node: &Node, start: usize, end: usize) -> bool {
    (start == 0 || node.can_replace(start, node.child_count(), &Fragment::empty()))
        && (end == node.child_count() || node.can_replace(0, end, &Fragment::empty()))
}

/// The depth the content of `range` could be lifted to, if any.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let parent = range.parent();
    let content = parent
        .content()
        .cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth && node.can_replace(index, end_index, &content) {
            return Some(depth);
        }
        if depth == 0 || node.node_type().is_isolating() || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

pub(crate) fn lift(tr: &mut Transform, range: &NodeRange, target: usize) -> Result<(), TransformError> {
    let (from, to, depth) = (&range.from, &range.to, range.depth);
    let gap_start = from.before(depth + 1);
    let gap_end = to.after(depth + 1);
    let (mut start, mut end) = (gap_start, gap_end);

    let mut before = Fragment::empty();
    let mut open_start = 0;
    let mut splitting = false;
    for d in (target + 1..=depth).rev() {
        if splitting || from.index(d) > 0 {
            splitting = true;
            before = Fragment::from(from.node(d).copy(before));
            open_start += 1;
        } else {
            start -= 1;
        }
    }
    let mut after = Fragment::empty();
    let mut open_end = 0;
    let mut splitting = false;
    for d in (target + 1..=depth).rev() {
        if splitting || to.after(d + 1) < to.end(d) {
            splitting = true;
            after = Fragment::from(to.node(d).copy(after));
            open_end += 1;
        } else {
            end += 1;
        }
    }

    let insert = before.size() - open_start;
    tr.step(
        ReplaceAroundStep::new(
            start,
            end,
            gap_start,
            gap_end,
            Slice::new(before.append(&after), open_start, open_end),
            insert,
            true,
        )
        .into(),
    )?;
    Ok(())
}

/// Wrappers that would let the content of `range` be wrapped in a node of
/// `node_type`: the outer wrappers, the node itself, then inner wrappers.
pub fn find_wrapping(
    range: &NodeRange,
    node_type: &NodeType,
    attrs: Option<&Attrs>,
    inner_range: Option<&NodeRange>,
) -> Option<Vec<Wrapper>> {
    let around = find_wrapping_outside(range, node_type)?;
    let inner = find_wrapping_inside(inner_range.unwrap_or(range), node_type)?;
    let mut wrappers: Vec<Wrapper> = around.into_iter().map(Wrapper::from).collect();
    wrappers.push(Wrapper::new(node_type.clone(), attrs.cloned()));
    wrappers.extend(inner.into_iter().map(Wrapper::from));
    Some(wrappers)
}

fn find_wrapping_outside(range: &NodeRange, node_type: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let (start, end) = (range.start_index(), range.end_index());
    let around = parent.content_match_at(start).ok()?.find_wrapping(node_type)?;
    let outer = around.first().unwrap_or(node_type);
    parent
        .can_replace_with(start, end, outer, None)
        .then_some(around)
}

fn find_wrapping_inside(range: &NodeRange, node_type: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let (start, end) = (range.start_index(), range.end_index());
    let inner = parent.maybe_child(start)?;
    let inside = node_type.content_match().find_wrapping(inner.node_type())?;
    let last = inside.last().unwrap_or(node_type);
    let mut inner_match = Some(last.content_match());
    for i in start..end {
        inner_match = inner_match.and_then(|m| m.match_type(parent.child(i).node_type()));
    }
    inner_match
        .is_some_and(|m| m.valid_end())
        .then_some(inside)
}

pub(crate) fn wrap(tr: &mut Transform, range: &NodeRange, wrappers: &[Wrapper]) -> Result<(), TransformError> {
    let mut content = Fragment::empty();
    for wrapper in wrappers.iter().rev() {
        if content.size() > 0 {
            let valid = wrapper
                .node_type
                .content_match()
                .match_fragment(&content)
                .is_some_and(|m| m.valid_end());
            if !valid {
                return Err(ModelError::range(
                    "Wrapper type given to Transform.wrap does not form valid content of its parent wrapper",
                )
                .into());
            }
        }
        content = Fragment::from(wrapper.node_type.create(wrapper.attrs.as_ref(), content, &[])?);
    }
    let (start, end) = (range.start(), range.end());
    tr.step(
        ReplaceAroundStep::new(
            start,
            end,
            start,
            end,
            Slice::new(content, 0, 0),
            wrappers.len(),
            true,
        )
        .into(),
    )?;
    Ok(())
}

fn can_change_type(doc: &Node, pos: usize, node_type: &NodeType) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    let index = rpos.index(rpos.depth());
    rpos.parent().can_replace_with(index, index + 1, node_type, None)
}

pub(crate) fn set_block_type(
    tr: &mut Transform,
    from: usize,
    to: usize,
    node_type: &NodeType,
    attrs: Option<&Attrs>,
) -> Result<(), TransformError> {
    if !node_type.is_textblock() {
        return Err(ModelError::range("Type given to setBlockType should be a textblock").into());
    }
    let map_from = tr.steps().len();
    let mut candidates = Vec::new();
    tr.doc().nodes_between(from, to, |node, pos, _, _| {
        if node.is_textblock() && !node.has_markup(node_type, attrs, None) {
            candidates.push((node.clone(), pos));
            return false;
        }
        true
    });
    for (node, pos) in candidates {
        let mapping = tr.mapping().slice(map_from, tr.mapping().maps().len());
        if !can_change_type(tr.doc(), mapping.map(pos, Assoc::After), node_type) {
            continue;
        }
        tr.clear_incompatible_with(
            mapping.map(pos, Assoc::After),
            node_type,
            None,
            true,
        )?;
        let mapping = tr.mapping().slice(map_from, tr.mapping().maps().len());
        let start = mapping.map(pos, Assoc::After);
        let end = mapping.map(pos + node.node_size(), Assoc::After);
        let replacement = node_type.create(attrs, Fragment::empty(), node.marks())?;
        tr.step(
            ReplaceAroundStep::new(
                start,
                end,
                start + 1,
                end - 1,
                Slice::new(Fragment::from(replacement), 0, 0),
                1,
                true,
            )
            .into(),
        )?;
    }
    Ok(())
}

pub(crate) fn set_node_markup(
    tr: &mut Transform,
    pos: usize,
    node_type: Option<&NodeType>,
    attrs: Option<&Attrs>,
    marks: Option<&[Mark]>,
) -> Result<(), TransformError> {
    let node = tr
        .doc()
        .node_at(pos)
        .ok_or_else(|| ModelError::range("No node at given position"))?;
    let node_type = node_type.unwrap_or(node.node_type()).clone();
    let new_node = node_type.create(attrs, Fragment::empty(), marks.unwrap_or(node.marks()))?;
    if node.is_leaf() {
        tr.replace_with(pos, pos + node.node_size(), new_node)?;
        return Ok(());
    }
    if !node_type.valid_content(node.content()) {
        return Err(ModelError::range(format!(
            "Invalid content for node type {}",
            node_type.name()
        ))
        .into());
    }
    let end = pos + node.node_size();
    tr.step(
        ReplaceAroundStep::new(
            pos,
            end,
            pos + 1,
            end - 1,
            Slice::new(Fragment::from(new_node), 0, 0),
            1,
            true,
        )
        .into(),
    )?;
    Ok(())
}

/// Whether splitting at `pos` to `depth` is valid. `types_after` optionally
/// gives the types of the nodes after the split, outermost first.
pub fn can_split(doc: &Node, pos: usize, depth: usize, types_after: &[Option<Wrapper>]) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    let Some(base) = rpos.depth().checked_sub(depth).filter(|_| depth > 0) else {
        return false;
    };
    let type_after = |i: isize| -> Option<&Wrapper> {
        usize::try_from(i)
            .ok()
            .and_then(|i| types_after.get(i))
            .and_then(Option::as_ref)
    };
    let parent = rpos.parent();
    let index = rpos.index(rpos.depth());
    let inner_type = types_after
        .last()
        .and_then(Option::as_ref)
        .map_or(parent.node_type(), |w| &w.node_type);
    let rest = parent.content().cut_by_index(index, parent.child_count());
    if parent.node_type().is_isolating()
        || !parent.can_replace(index, parent.child_count(), &Fragment::empty())
        || !inner_type.valid_content(&rest)
    {
        return false;
    }
    let mut i = depth as isize - 2;
    for d in (base + 1..rpos.depth()).rev() {
        let node = rpos.node(d);
        let index = rpos.index(d);
        if node.node_type().is_isolating() {
            return false;
        }
        let mut rest = node.content().cut_by_index(index, node.child_count());
        if let Some(over) = type_after(i + 1) {
            match over.node_type.create(over.attrs.as_ref(), Fragment::empty(), &[]) {
                Ok(child) => rest = rest.replace_child(0, child),
                Err(_) => return false,
            }
        }
        let after = type_after(i).map_or(node.node_type(), |w| &w.node_type);
        if !node.can_replace(index + 1, node.child_count(), &Fragment::empty())
            || !after.valid_content(&rest)
        {
            return false;
        }
        i -= 1;
    }
    let index = rpos.index_after(base);
    let base_type = types_after
        .first()
        .and_then(Option::as_ref)
        .map_or(rpos.node(base + 1).node_type(), |w| &w.node_type);
    rpos.node(base).can_replace_with(index, index, base_type, None)
}

pub(crate) fn split(
    tr: &mut Transform,
    pos: usize,
    depth: usize,
    types_after: &[Option<Wrapper>],
) -> Result<(), TransformError> {
    let rpos = tr.doc().resolve(pos)?;
    let base = rpos
        .depth()
        .checked_sub(depth)
        .ok_or_else(|| ModelError::range("Split depth exceeds position depth"))?;
    let mut before = Fragment::empty();
    let mut after = Fragment::empty();
    for (i, d) in (base + 1..=rpos.depth()).rev().enumerate() {
        let slot = depth - 1 - i;
        before = Fragment::from(rpos.node(d).copy(before));
        after = match types_after.get(slot).and_then(Option::as_ref) {
            Some(w) => Fragment::from(w.node_type.create(w.attrs.as_ref(), after, &[])?),
            None => Fragment::from(rpos.node(d).copy(after)),
        };
    }
    tr.step(ReplaceStep::new(pos, pos, Slice::new(before.append(&after), depth, depth), true).into())?;
    Ok(())
}

/// Whether the nodes on both sides of `pos` can be joined.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    let Ok(rpos) = doc.resolve(pos) else {
        return false;
    };
    let index = rpos.index(rpos.depth());
    joinable(rpos.node_before().as_ref(), rpos.node_after().as_ref())
        && rpos
            .parent()
            .can_replace(index, index + 1, &Fragment::empty())
}

pub fn joinable(a: Option<&Node>, b: Option<&Node>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_leaf() && a.can_append(b),
        _ => false,
    }
}

/// Finds a position at or around `pos` where two block nodes can be
/// joined, searching up the ancestors.
pub fn join_point(doc: &Node, pos: usize, forward: bool) -> Option<usize> {
    let rpos = doc.resolve(pos).ok()?;
    let mut pos = pos;
    let mut d = rpos.depth();
    loop {
        let mut index = rpos.index(d);
        let (before, after) = if d == rpos.depth() {
            (rpos.node_before(), rpos.node_after())
        } else if forward {
            index += 1;
            (
                Some(rpos.node(d + 1).clone()),
                rpos.node(d).maybe_child(index).cloned(),
            )
        } else {
            (
                index
                    .checked_sub(1)
                    .and_then(|i| rpos.node(d).maybe_child(i))
                    .cloned(),
                Some(rpos.node(d + 1).clone()),
            )
        };
        if before.as_ref().is_some_and(|b| !b.is_textblock())
            && joinable(before.as_ref(), after.as_ref())
            && rpos.node(d).can_replace(index, index + 1, &Fragment::empty())
        {
            return Some(pos);
        }
        if d == 0 {
            return None;
        }
        pos = if forward { rpos.after(d) } else { rpos.before(d) };
        d -= 1;
    }
}

pub(crate) fn join(tr: &mut Transform, pos: usize, depth: usize) -> Result<(), TransformError> {
    let from = pos
        .checked_sub(depth)
        .ok_or_else(|| ModelError::range("Join depth exceeds position"))?;
    tr.step(ReplaceStep::new(from, pos + depth, Slice::empty(), true).into())?;
    Ok(())
}

/// A position at or around `pos` where a node of `node_type` could be
/// inserted, moving out of the parent when `pos` is at its start or end.
pub fn insert_point(doc: &Node, pos: usize, node_type: &NodeType) -> Option<usize> {
    let rpos = doc.resolve(pos).ok()?;
    let index = rpos.index(rpos.depth());
    if rpos.parent().can_replace_with(index, index, node_type, None) {
        return Some(pos);
    }
    if rpos.parent_offset() == 0 {
        for d in (0..rpos.depth()).rev() {
            let index = rpos.index(d);
            if rpos.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rpos.before(d + 1));
            }
            if index > 0 {
                return None;
            }
        }
    }
    if rpos.parent_offset() == rpos.parent().content().size() {
        for d in (0..rpos.depth()).rev() {
            let index = rpos.index_after(d);
            if rpos.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rpos.after(d + 1));
            }
            if index < rpos.node(d).child_count() {
                return None;
            }
        }
    }
    None
}

/// Where `slice` could be dropped near `pos`: `pos` itself, or the nearest
/// block boundary at which its content fits.
pub fn drop_point(doc: &Node, pos: usize, slice: &Slice) -> Option<usize> {
    let rpos = doc.resolve(pos).ok()?;
    if slice.content().size() == 0 {
        return Some(pos);
    }
    let mut content = slice.content().clone();
    for _ in 0..slice.open_start() {
        content = content.first_child()?.content().clone();
    }
    let passes = if slice.open_start() == 0 && slice.size() > 0 { 2 } else { 1 };
    for pass in 1..=passes {
        for d in (0..=rpos.depth()).rev() {
            let bias: isize = if d == rpos.depth() {
                0
            } else if rpos.pos() * 2 <= rpos.start(d + 1) + rpos.end(d + 1) {
                -1
            } else {
                1
            };
            let insert_pos = rpos.index(d) + usize::from(bias > 0);
            let parent = rpos.node(d);
            let fits = if pass == 1 {
                parent.can_replace(insert_pos, insert_pos, &content)
            } else {
                let wrapping = content.first_child().and_then(|first| {
                    parent
                        .content_match_at(insert_pos)
                        .ok()?
                        .find_wrapping(first.node_type())
                });
                wrapping
                    .and_then(|w| w.first().cloned())
                    .is_some_and(|outer| parent.can_replace_with(insert_pos, insert_pos, &outer, None))
            };
            if fits {
                return Some(match bias {
                    0 => rpos.pos(),
                    b if b < 0 => rpos.before(d + 1),
                    _ => rpos.after(d + 1),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use serde_json::{json, Value};

    fn node(json: Value) -> Node {
        basic::schema().node_from_json(&json).unwrap()
    }

    fn p(text: &str) -> Value {
        json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
    }

    fn quoted() -> Node {
        node(json!({"type": "doc", "content": [
            {"type": "blockquote", "content": [p("one"), p("two")]}
        ]}))
    }

    #[test]
    fn test_lift_target_out_of_blockquote() {
        let d = quoted();
        let from = d.resolve(3).unwrap();
        let range = from.block_range(&from).unwrap();
        assert_eq!(range.depth, 1);
        assert_eq!(lift_target(&range), Some(0));
    }

    #[test]
    fn test_lift_target_none_at_top() {
        let d = node(json!({"type": "doc", "content": [p("one")]}));
        let from = d.resolve(2).unwrap();
        let range = from.block_range(&from).unwrap();
        assert_eq!(lift_target(&range), None);
    }

    #[test]
    fn test_find_wrapping_list() {
        let schema = basic::schema();
        let d = node(json!({"type": "doc", "content": [p("one")]}));
        let from = d.resolve(2).unwrap();
        let range = from.block_range(&from).unwrap();
        let list = schema.node_type("bullet_list").unwrap();
        let wrappers = find_wrapping(&range, &list, None, None).unwrap();
        let names: Vec<_> = wrappers.iter().map(|w| w.node_type.name().to_string()).collect();
        assert_eq!(names, ["bullet_list", "list_item"]);
    }

    #[test]
    fn test_can_split_and_join() {
        let d = node(json!({"type": "doc", "content": [p("ab"), p("cd")]}));
        assert!(can_split(&d, 2, 1, &[]));
        assert!(!can_split(&d, 2, 2, &[]));
        assert!(!can_split(&d, 2, 0, &[]));
        assert!(!can_split(&d, 0, 0, &[]));
        assert!(can_join(&d, 4));
        assert!(!can_join(&d, 2));
        let hr = node(json!({"type": "doc", "content": [p("ab"), {"type": "horizontal_rule"}]}));
        assert!(!can_join(&hr, 4));
    }

    #[test]
    fn test_join_point_walks_up() {
        let d = node(json!({"type": "doc", "content": [
            {"type": "blockquote", "content": [p("a")]},
            {"type": "blockquote", "content": [p("b")]}
        ]}));
        // Inside the second quote's paragraph, searching backward.
        assert_eq!(join_point(&d, 7, false), Some(5));
        assert_eq!(join_point(&d, 5, false), Some(5));
    }

    #[test]
    fn test_insert_point() {
        let schema = basic::schema();
        let d = node(json!({"type": "doc", "content": [p("ab")]}));
        let hr = schema.node_type("horizontal_rule").unwrap();
        assert_eq!(insert_point(&d, 0, &hr), Some(0));
        assert_eq!(insert_point(&d, 1, &hr), Some(0));
        assert_eq!(insert_point(&d, 3, &hr), Some(4));
        assert_eq!(insert_point(&d, 2, &hr), None);
    }

    #[test]
    fn test_drop_point() {
        let d = node(json!({"type": "doc", "content": [p("abcd")]}));
        let para = node(p("x"));
        let slice = Slice::new(Fragment::from(para), 0, 0);
        assert_eq!(drop_point(&d, 2, &slice), Some(0));
        assert_eq!(drop_point(&d, 5, &slice), Some(6));
        assert_eq!(drop_point(&d, 2, &Slice::empty()), Some(2));
    }
}
