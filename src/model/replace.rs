//! Replacing a range of a document with a slice, at the model level.
//!
//! The slice must already fit: its open sides are joined onto the nodes
//! around the range, and every rebuilt node is checked against its content
//! expression. Anything that does not fit is a [`ReplaceError`].

use super::{Fragment, Node, ReplaceError, ResolvedPos, Slice};

pub(crate) fn replace(
    from: &ResolvedPos,
    to: &ResolvedPos,
    slice: &Slice,
) -> Result<Node, ReplaceError> {
    if slice.open_start() > from.depth() {
        return Err(ReplaceError::new(
            "Inserted content deeper than insertion position",
        ));
    }
    if from.depth() - slice.open_start() + slice.open_end() != to.depth() {
        return Err(ReplaceError::new("Inconsistent open depths"));
    }
    replace_outer(from, to, slice, 0)
}

fn replace_outer(
    from: &ResolvedPos,
    to: &ResolvedPos,
    slice: &Slice,
    depth: usize,
) -> Result<Node, ReplaceError> {
    let index = from.index(depth);
    let node = from.node(depth);
    if index == to.index(depth) && depth < from.depth() - slice.open_start() {
        let inner = replace_outer(from, to, slice, depth + 1)?;
        Ok(node.copy(node.content().replace_child(index, inner)))
    } else if slice.content().size() == 0 {
        close(node, replace_two_way(from, to, depth)?)
    } else if slice.open_start() == 0
        && slice.open_end() == 0
        && from.depth() == depth
        && to.depth() == depth
    {
        let parent = from.parent();
        let content = parent.content();
        close(
            parent,
            content
                .cut(0, from.parent_offset())
                .append(slice.content())
                .append(&content.cut_from(to.parent_offset())),
        )
    } else {
        let (start, end) = prepare_slice_for_replace(slice, from)?;
        close(node, replace_three_way(from, &start, &end, to, depth)?)
    }
}

fn check_join(main: &Node, sub: &Node) -> Result<(), ReplaceError> {
    if sub.node_type().compatible_content(main.node_type()) {
        Ok(())
    } else {
        Err(ReplaceError::new(format!(
            "Cannot join {} onto {}",
            sub.node_type().name(),
            main.node_type().name()
        )))
    }
}

fn joinable(before: &ResolvedPos, after: &ResolvedPos, depth: usize) -> Result<Node, ReplaceError> {
    let node = before.node(depth);
    check_join(node, after.node(depth))?;
    Ok(node.clone())
}

fn add_node(child: Node, target: &mut Vec<Node>) {
    if let Some(last) = target.last_mut() {
        if child.is_text() && child.same_markup(last) {
            *last = last.merge_text(&child);
            return;
        }
    }
    target.push(child);
}

fn add_range(
    start: Option<&ResolvedPos>,
    end: Option<&ResolvedPos>,
    depth: usize,
    target: &mut Vec<Node>,
) {
    let Some(node) = end.or(start).map(|r| r.node(depth)) else {
        return;
    };
    let mut start_index = 0;
    let end_index = end.map_or(node.child_count(), |e| e.index(depth));
    if let Some(start) = start {
        start_index = start.index(depth);
        if start.depth() > depth {
            start_index += 1;
        } else if start.text_offset() > 0 {
            if let Some(after) = start.node_after() {
                add_node(after, target);
            }
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(node.child(i).clone(), target);
    }
    if let Some(end) = end {
        if end.depth() == depth && end.text_offset() > 0 {
            if let Some(before) = end.node_before() {
                add_node(before, target);
            }
        }
    }
}

fn close(node: &Node, content: Fragment) -> Result<Node, ReplaceError> {
    node.node_type()
        .check_content(&content)
        .map_err(|e| ReplaceError::new(e.to_string()))?;
    Ok(node.copy(content))
}

fn replace_three_way(
    from: &ResolvedPos,
    start: &ResolvedPos,
    end: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let open_start = if from.depth() > depth {
        Some(joinable(from, start, depth + 1)?)
    } else {
        None
    };
    let open_end = if to.depth() > depth {
        Some(joinable(end, to, depth + 1)?)
    } else {
        None
    };

    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    match (&open_start, &open_end) {
        (Some(os), Some(oe)) if start.index(depth) == end.index(depth) => {
            check_join(os, oe)?;
            let inner = replace_three_way(from, start, end, to, depth + 1)?;
            add_node(close(os, inner)?, &mut content);
        }
        _ => {
            if let Some(os) = &open_start {
                let inner = replace_two_way(from, start, depth + 1)?;
                add_node(close(os, inner)?, &mut content);
            }
            add_range(Some(start), Some(end), depth, &mut content);
            if let Some(oe) = &open_end {
                let inner = replace_two_way(end, to, depth + 1)?;
                add_node(close(oe, inner)?, &mut content);
            }
        }
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_parts(content))
}

fn replace_two_way(
    from: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    if from.depth() > depth {
        let joined = joinable(from, to, depth + 1)?;
        let inner = replace_two_way(from, to, depth + 1)?;
        add_node(close(&joined, inner)?, &mut content);
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_parts(content))
}

/// Wraps the slice in copies of `along`'s ancestors so its open sides can
/// be resolved like document positions.
fn prepare_slice_for_replace(
    slice: &Slice,
    along: &ResolvedPos,
) -> Result<(ResolvedPos, ResolvedPos), ReplaceError> {
    if !open_spine_fits(slice.content(), slice.open_start(), true)
        || !open_spine_fits(slice.content(), slice.open_end(), false)
    {
        return Err(ReplaceError::new("Slice is open deeper than its content"));
    }
    let extra = along.depth() - slice.open_start();
    let mut node = along.node(extra).copy(slice.content().clone());
    for depth in (0..extra).rev() {
        node = along.node(depth).copy(Fragment::from(node));
    }
    let start = node
        .resolve_no_cache(slice.open_start() + extra)
        .map_err(|e| ReplaceError::new(e.to_string()))?;
    let end_pos = node
        .content()
        .size()
        .checked_sub(slice.open_end() + extra)
        .ok_or_else(|| ReplaceError::new("Slice is open deeper than its content"))?;
    let end = node
        .resolve_no_cache(end_pos)
        .map_err(|e| ReplaceError::new(e.to_string()))?;
    Ok((start, end))
}

/// Whether `fragment` has `open` levels of non-leaf first (or last) children.
fn open_spine_fits(fragment: &Fragment, open: usize, first: bool) -> bool {
    let mut fragment = fragment;
    for _ in 0..open {
        let child = if first {
            fragment.first_child()
        } else {
            fragment.last_child()
        };
        match child {
            Some(child) if !child.is_leaf() => fragment = child.content(),
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::basic;
    use crate::model::{Fragment, ModelError, Node, Slice};
    use serde_json::json;

    fn doc(paragraphs: &[&str]) -> Node {
        let content: Vec<_> = paragraphs
            .iter()
            .map(|t| json!({"type": "paragraph", "content": [{"type": "text", "text": t}]}))
            .collect();
        basic::schema()
            .node_from_json(&json!({"type": "doc", "content": content}))
            .unwrap()
    }

    #[test]
    fn test_flat_insert() {
        let d = doc(&["ac"]);
        let b = Fragment::from(basic::schema().text("b", &[]).unwrap());
        let out = d.replace(2, 2, &Slice::new(b, 0, 0)).unwrap();
        assert_eq!(out, doc(&["abc"]));
    }

    #[test]
    fn test_join_across_paragraphs() {
        let d = doc(&["abc", "def"]);
        let out = d.replace(3, 7, &Slice::empty()).unwrap();
        assert_eq!(out, doc(&["abef"]));
    }

    #[test]
    fn test_open_slice_splits_and_joins() {
        let source = doc(&["xy", "zw"]);
        let slice = source.slice(2, 6).unwrap();
        let d = doc(&["ab"]);
        let out = d.replace(2, 2, &slice).unwrap();
        assert_eq!(out, doc(&["ay", "zb"]));
    }

    #[test]
    fn test_errors() {
        let d = doc(&["ab"]);
        let open = doc(&["x", "y"]).slice(2, 5).unwrap();
        let err = d.replace(0, 0, &open).unwrap_err();
        assert_eq!(
            err,
            ModelError::Replace(crate::model::ReplaceError::new(
                "Inserted content deeper than insertion position"
            ))
        );
        // Claims two open levels on the right but holds only text.
        let quoted = basic::schema()
            .node_from_json(&json!({"type": "doc", "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "ab"}]},
                {"type": "blockquote", "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "cd"}]}
                ]}
            ]}))
            .unwrap();
        let x = Fragment::from(basic::schema().text("x", &[]).unwrap());
        let err = quoted.replace(2, 7, &Slice::new(x, 1, 2)).unwrap_err();
        assert!(matches!(err, ModelError::Replace(_)));
        // Deleting the only paragraph leaves the doc without required content.
        let err = d.replace(0, 4, &Slice::empty()).unwrap_err();
        assert!(matches!(err, ModelError::Replace(_)));
    }
}
