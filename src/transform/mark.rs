//! Transform helpers that add, remove and sanitize marks over ranges.

use super::mark_step::{AddMarkStep, RemoveMarkStep};
use super::replace_step::ReplaceStep;
use super::{Step, Transform, TransformError};
use crate::model::{ContentMatch, Fragment, Mark, MarkType, NodeType, Slice, Whitespace};

/// Selects which marks a removal applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkMatch {
    /// Exactly this mark, attributes included.
    Mark(Mark),
    /// Every mark of this type.
    Type(MarkType),
    All,
}

impl From<Mark> for MarkMatch {
    fn from(mark: Mark) -> Self {
        Self::Mark(mark)
    }
}

impl From<MarkType> for MarkMatch {
    fn from(mark_type: MarkType) -> Self {
        Self::Type(mark_type)
    }
}

impl MarkMatch {
    /// The marks in `set` this selector picks out.
    pub fn select(&self, set: &[Mark]) -> Vec<Mark> {
        match self {
            MarkMatch::Mark(mark) => {
                if mark.is_in_set(set) {
                    vec![mark.clone()]
                } else {
                    Vec::new()
                }
            }
            MarkMatch::Type(mark_type) => set
                .iter()
                .filter(|m| m.mark_type() == mark_type)
                .cloned()
                .collect(),
            MarkMatch::All => set.to_vec(),
        }
    }
}

pub(crate) fn add_mark(tr: &mut Transform, from: usize, to: usize, mark: &Mark) -> Result<(), TransformError> {
    let mut removed: Vec<RemoveMarkStep> = Vec::new();
    let mut added: Vec<AddMarkStep> = Vec::new();
    // Index of the step still being extended, if any.
    let mut removing: Option<usize> = None;
    let mut adding: Option<usize> = None;

    tr.doc().nodes_between(from, to, |node, pos, parent, _| {
        if !node.is_inline() {
            return true;
        }
        let allowed = parent.is_some_and(|p| p.node_type().allows_mark_type(mark.mark_type()));
        if mark.is_in_set(node.marks()) || !allowed {
            return true;
        }
        let start = pos.max(from);
        let end = (pos + node.node_size()).min(to);
        let new_set = mark.add_to_set(node.marks());
        for old in node.marks() {
            if old.is_in_set(&new_set) {
                continue;
            }
            match removing.filter(|&i| removed[i].to == start && removed[i].mark == *old) {
                Some(i) => removed[i].to = end,
                None => {
                    removed.push(RemoveMarkStep::new(start, end, old.clone()));
                    removing = Some(removed.len() - 1);
                }
            }
        }
        match adding.filter(|&i| added[i].to == start) {
            Some(i) => added[i].to = end,
            None => {
                added.push(AddMarkStep::new(start, end, mark.clone()));
                adding = Some(added.len() - 1);
            }
        }
        true
    });

    for step in removed {
        tr.step(Step::RemoveMark(step))?;
    }
    for step in added {
        tr.step(Step::AddMark(step))?;
    }
    Ok(())
}

struct Matched {
    style: Mark,
    from: usize,
    to: usize,
    step: usize,
}

pub(crate) fn remove_mark(
    tr: &mut Transform,
    from: usize,
    to: usize,
    which: &MarkMatch,
) -> Result<(), TransformError> {
    let mut matched: Vec<Matched> = Vec::new();
    let mut step = 0;
    tr.doc().nodes_between(from, to, |node, pos, _, _| {
        if !node.is_inline() {
            return true;
        }
        step += 1;
        let to_remove = which.select(node.marks());
        let end = (pos + node.node_size()).min(to);
        for style in to_remove {
            match matched
                .iter()
                .rposition(|m| m.step + 1 == step && m.style == style)
            {
                Some(i) => {
                    matched[i].to = end;
                    matched[i].step = step;
                }
                None => matched.push(Matched {
                    style,
                    from: pos.max(from),
                    to: end,
                    step,
                }),
            }
        }
        true
    });
    for m in matched {
        tr.step(Step::RemoveMark(RemoveMarkStep::new(m.from, m.to, m.style)))?;
    }
    Ok(())
}

/// Line breaks in `text`, as `(char offset, char length)`.
fn newlines(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\r' if chars.get(i + 1) == Some(&'\n') => {
                found.push((i, 2));
                i += 2;
            }
            '\r' | '\n' => {
                found.push((i, 1));
                i += 1;
            }
            _ => i += 1,
        }
    }
    found
}

/// Removes the children, marks and line breaks of the node at `pos` that
/// `parent_type` would not accept, then fills in any required content.
pub(crate) fn clear_incompatible(
    tr: &mut Transform,
    pos: usize,
    parent_type: &NodeType,
    content_match: Option<ContentMatch>,
    clear_newlines: bool,
) -> Result<(), TransformError> {
    let Some(node) = tr.doc().node_at(pos) else {
        return Ok(());
    };
    let mut content_match = content_match.unwrap_or_else(|| parent_type.content_match());
    let mut repl_steps: Vec<ReplaceStep> = Vec::new();
    let mut cur = pos + 1;
    for child in node.content().iter() {
        let end = cur + child.node_size();
        match content_match.match_type(child.node_type()) {
            None => repl_steps.push(ReplaceStep::new(cur, end, Slice::empty(), false)),
            Some(allowed) => {
                content_match = allowed;
                for mark in child.marks() {
                    if !parent_type.allows_mark_type(mark.mark_type()) {
                        tr.step(Step::RemoveMark(RemoveMarkStep::new(cur, end, mark.clone())))?;
                    }
                }
                if clear_newlines && parent_type.whitespace() != Whitespace::Pre {
                    if let Some(text) = child.text() {
                        let breaks = newlines(text);
                        if !breaks.is_empty() {
                            let space = parent_type
                                .schema()
                                .text(" ", &parent_type.allowed_marks(child.marks()))?;
                            let slice = Slice::new(Fragment::from(space), 0, 0);
                            for (offset, len) in breaks {
                                repl_steps.push(ReplaceStep::new(
                                    cur + offset,
                                    cur + offset + len,
                                    slice.clone(),
                                    false,
                                ));
                            }
                        }
                    }
                }
            }
        }
        cur = end;
    }
    if !content_match.valid_end() {
        if let Some(fill) = content_match.fill_before(&Fragment::empty(), true, 0) {
            tr.replace(cur, cur, &Slice::new(fill, 0, 0))?;
        }
    }
    for step in repl_steps.into_iter().rev() {
        tr.step(Step::Replace(step))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use crate::model::Node;
    use serde_json::{json, Value};

    fn doc(content: Value) -> Node {
        basic::schema()
            .node_from_json(&json!({"type": "doc", "content": content}))
            .unwrap()
    }

    fn mark(name: &str) -> Mark {
        basic::schema().mark(name, None).unwrap()
    }

    #[test]
    fn test_add_mark_coalesces_steps() {
        let d = doc(json!([{"type": "paragraph", "content": [
            {"type": "text", "text": "ab"},
            {"type": "text", "text": "cd", "marks": [{"type": "em"}]}
        ]}]));
        let mut tr = Transform::new(d);
        add_mark(&mut tr, 1, 5, &mark("strong")).unwrap();
        assert_eq!(tr.steps().len(), 1);
        let para = tr.doc().child(0);
        assert_eq!(para.child_count(), 2);
        assert!(para.content().iter().all(|n| mark("strong").is_in_set(n.marks())));
    }

    #[test]
    fn test_add_link_replaces_existing_link() {
        let schema = basic::schema();
        let old = schema
            .mark_from_json(&json!({"type": "link", "attrs": {"href": "a"}}))
            .unwrap();
        let new = schema
            .mark_from_json(&json!({"type": "link", "attrs": {"href": "b"}}))
            .unwrap();
        let d = doc(json!([{"type": "paragraph", "content": [
            {"type": "text", "text": "ab", "marks": [old.to_json()]}
        ]}]));
        let mut tr = Transform::new(d);
        add_mark(&mut tr, 1, 3, &new).unwrap();
        assert!(matches!(tr.steps()[0], Step::RemoveMark(_)));
        assert!(matches!(tr.steps()[1], Step::AddMark(_)));
        assert_eq!(tr.doc().child(0).child(0).marks(), &[new]);
    }

    #[test]
    fn test_remove_mark_by_type() {
        let d = doc(json!([{"type": "paragraph", "content": [
            {"type": "text", "text": "ab", "marks": [{"type": "em"}, {"type": "strong"}]},
            {"type": "text", "text": "cd", "marks": [{"type": "em"}]}
        ]}]));
        let em = basic::schema().mark_type("em").unwrap();
        let mut tr = Transform::new(d);
        remove_mark(&mut tr, 1, 5, &MarkMatch::Type(em)).unwrap();
        assert_eq!(tr.steps().len(), 1);
        let para = tr.doc().child(0);
        assert_eq!(para.child(0).marks(), &[mark("strong")]);
        assert!(para.child(1).marks().is_empty());

        let mut tr = Transform::new(tr.doc().clone());
        remove_mark(&mut tr, 1, 5, &MarkMatch::All).unwrap();
        assert_eq!(tr.doc().child(0).child_count(), 1);
    }

    #[test]
    fn test_newline_scan() {
        assert_eq!(newlines("a\nb\r\nc\rd"), vec![(1, 1), (3, 2), (6, 1)]);
        assert!(newlines("plain").is_empty());
    }

    #[test]
    fn test_clear_incompatible_for_code_block() {
        let d = doc(json!([{"type": "paragraph", "content": [
            {"type": "text", "text": "ab", "marks": [{"type": "strong"}]},
            {"type": "image", "attrs": {"src": "x.png"}}
        ]}]));
        let code_block = basic::schema().node_type("code_block").unwrap();
        let mut tr = Transform::new(d);
        clear_incompatible(&mut tr, 0, &code_block, None, true).unwrap();
        let para = tr.doc().child(0);
        assert_eq!(para.child_count(), 1);
        assert_eq!(para.text_content(), "ab");
        assert!(para.child(0).marks().is_empty());
    }
}
