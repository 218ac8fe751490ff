use super::map::{Assoc, Mappable};
use super::step::{Step, StepResult};
use crate::model::{Fragment, Mark, Node, Slice};
use serde_json::{json, Value};

/// Rebuilds `fragment` bottom-up, passing every inline node and its parent
/// through `f`.
fn map_fragment<F>(fragment: &Fragment, f: &F, parent: &Node) -> Fragment
where
    F: Fn(Node, &Node) -> Node,
{
    let mapped = fragment
        .iter()
        .map(|child| {
            let mut child = child.clone();
            if child.content().size() > 0 {
                let inner = map_fragment(child.content(), f, &child);
                child = child.copy(inner);
            }
            if child.is_inline() {
                child = f(child, parent);
            }
            child
        })
        .collect();
    Fragment::from_array(mapped)
}

/// Applies `f` to the inline content of `from..to`.
fn apply_to_inline<F>(doc: &Node, from: usize, to: usize, f: F) -> StepResult
where
    F: Fn(Node, &Node) -> Node,
{
    if from > to {
        return StepResult::fail(format!("Mark range {from}..{to} is reversed"));
    }
    let (old, rfrom) = match (doc.slice(from, to), doc.resolve(from)) {
        (Ok(old), Ok(rfrom)) => (old, rfrom),
        (Err(e), _) | (_, Err(e)) => return StepResult::fail(e.to_string()),
    };
    let parent = rfrom.node(rfrom.shared_depth(to));
    let slice = Slice::new(
        map_fragment(old.content(), &f, parent),
        old.open_start(),
        old.open_end(),
    );
    StepResult::from_replace(doc, from, to, &slice)
}

/// Adds a mark to all inline content between two positions.
#[derive(Debug, Clone, PartialEq)]
pub struct AddMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

impl AddMarkStep {
    pub fn new(from: usize, to: usize, mark: Mark) -> Self {
        Self { from, to, mark }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        apply_to_inline(doc, self.from, self.to, |node, parent| {
            if !node.is_atom() || !parent.node_type().allows_mark_type(self.mark.mark_type()) {
                return node;
            }
            node.mark(self.mark.add_to_set(node.marks()))
        })
    }

    pub fn invert(&self) -> RemoveMarkStep {
        RemoveMarkStep::new(self.from, self.to, self.mark.clone())
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AddMarkStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        if (from.deleted() && to.deleted()) || from.pos >= to.pos {
            return None;
        }
        Some(AddMarkStep::new(from.pos, to.pos, self.mark.clone()))
    }

    pub fn merge(&self, other: &AddMarkStep) -> Option<AddMarkStep> {
        (other.mark == self.mark && self.from <= other.to && self.to >= other.from).then(|| {
            AddMarkStep::new(
                self.from.min(other.from),
                self.to.max(other.to),
                self.mark.clone(),
            )
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "addMark",
            "mark": self.mark.to_json(),
            "from": self.from,
            "to": self.to,
        })
    }
}

/// Removes a mark from all inline content between two positions.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

impl RemoveMarkStep {
    pub fn new(from: usize, to: usize, mark: Mark) -> Self {
        Self { from, to, mark }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        apply_to_inline(doc, self.from, self.to, |node, _| {
            node.mark(self.mark.remove_from_set(node.marks()))
        })
    }

    pub fn invert(&self) -> AddMarkStep {
        AddMarkStep::new(self.from, self.to, self.mark.clone())
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<RemoveMarkStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        if (from.deleted() && to.deleted()) || from.pos >= to.pos {
            return None;
        }
        Some(RemoveMarkStep::new(from.pos, to.pos, self.mark.clone()))
    }

    pub fn merge(&self, other: &RemoveMarkStep) -> Option<RemoveMarkStep> {
        (other.mark == self.mark && self.from <= other.to && self.to >= other.from).then(|| {
            RemoveMarkStep::new(
                self.from.min(other.from),
                self.to.max(other.to),
                self.mark.clone(),
            )
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "removeMark",
            "mark": self.mark.to_json(),
            "from": self.from,
            "to": self.to,
        })
    }
}

/// Replaces the node at `pos` with a copy carrying `marks`, leaving its
/// content in place.
fn replace_node_marks(doc: &Node, pos: usize, node: &Node, marks: &[Mark]) -> StepResult {
    let updated = match node.node_type().create(Some(node.attrs()), Fragment::empty(), marks) {
        Ok(updated) => updated,
        Err(e) => return StepResult::fail(e.to_string()),
    };
    let open_end = usize::from(!node.is_leaf());
    StepResult::from_replace(doc, pos, pos + 1, &Slice::new(Fragment::from(updated), 0, open_end))
}

/// Adds a mark to the node at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct AddNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

impl AddNodeMarkStep {
    pub fn new(pos: usize, mark: Mark) -> Self {
        Self { pos, mark }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let Some(node) = doc.node_at(self.pos) else {
            return StepResult::fail("No node at mark step's position");
        };
        replace_node_marks(doc, self.pos, &node, &self.mark.add_to_set(node.marks()))
    }

    /// If the mark replaced one it excludes, the inverse puts that one back.
    pub fn invert(&self, doc: &Node) -> Step {
        if let Some(node) = doc.node_at(self.pos) {
            let new_set = self.mark.add_to_set(node.marks());
            if new_set.len() == node.marks().len() {
                let displaced = node.marks().iter().find(|m| !m.is_in_set(&new_set));
                let mark = displaced.unwrap_or(&self.mark).clone();
                return Step::AddNodeMark(AddNodeMarkStep::new(self.pos, mark));
            }
        }
        Step::RemoveNodeMark(RemoveNodeMarkStep::new(self.pos, self.mark.clone()))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AddNodeMarkStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| AddNodeMarkStep::new(pos.pos, self.mark.clone()))
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "addNodeMark",
            "pos": self.pos,
            "mark": self.mark.to_json(),
        })
    }
}

/// Removes a mark from the node at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

impl RemoveNodeMarkStep {
    pub fn new(pos: usize, mark: Mark) -> Self {
        Self { pos, mark }
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let Some(node) = doc.node_at(self.pos) else {
            return StepResult::fail("No node at mark step's position");
        };
        replace_node_marks(doc, self.pos, &node, &self.mark.remove_from_set(node.marks()))
    }

    pub fn invert(&self, doc: &Node) -> Step {
        match doc.node_at(self.pos) {
            Some(node) if self.mark.is_in_set(node.marks()) => {
                Step::AddNodeMark(AddNodeMarkStep::new(self.pos, self.mark.clone()))
            }
            _ => Step::RemoveNodeMark(self.clone()),
        }
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<RemoveNodeMarkStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| RemoveNodeMarkStep::new(pos.pos, self.mark.clone()))
    }

    pub fn to_json(&self) -> Value {
        json!({
            "stepType": "removeNodeMark",
            "pos": self.pos,
            "mark": self.mark.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use crate::transform::StepMap;

    fn doc() -> Node {
        basic::schema()
            .node_from_json(&json!({
                "type": "doc",
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "hello"}]},
                    {"type": "paragraph", "content": [
                        {"type": "text", "text": "a"},
                        {"type": "image", "attrs": {"src": "x.png"}}
                    ]}
                ]
            }))
            .unwrap()
    }

    fn strong() -> Mark {
        basic::schema().mark("strong", None).unwrap()
    }

    #[test]
    fn test_add_mark_then_invert() {
        let d = doc();
        let step = AddMarkStep::new(1, 4, strong());
        let marked = step.apply(&d).doc().cloned().unwrap();
        let first = marked.child(0);
        assert_eq!(first.child_count(), 2);
        assert!(strong().is_in_set(first.child(0).marks()));
        assert!(first.child(1).marks().is_empty());
        assert_eq!(step.invert().apply(&marked).doc(), Some(&d));
    }

    #[test]
    fn test_add_mark_covers_atoms() {
        let d = doc();
        let marked = AddMarkStep::new(8, 10, strong()).apply(&d).doc().cloned().unwrap();
        let image = marked.child(1).child(1);
        assert_eq!(image.node_type().name(), "image");
        assert!(strong().is_in_set(image.marks()));
    }

    #[test]
    fn test_mark_step_merge_and_map() {
        let a = AddMarkStep::new(1, 3, strong());
        let b = AddMarkStep::new(2, 5, strong());
        let merged = a.merge(&b).unwrap();
        assert_eq!((merged.from, merged.to), (1, 5));
        assert!(a.merge(&AddMarkStep::new(4, 5, strong())).is_none());

        let collapsed = a.map(&StepMap::new(vec![0, 4, 0]));
        assert!(collapsed.is_none());
    }

    #[test]
    fn test_node_mark_round_trip() {
        let d = doc();
        let step = AddNodeMarkStep::new(9, strong());
        let marked = step.apply(&d).doc().cloned().unwrap();
        assert!(strong().is_in_set(marked.node_at(9).unwrap().marks()));
        let inverse = step.invert(&d);
        assert!(matches!(inverse, Step::RemoveNodeMark(_)));
        assert_eq!(inverse.apply(&marked).doc(), Some(&d));
        assert_eq!(
            AddNodeMarkStep::new(42, strong()).apply(&d).failed(),
            Some("No node at mark step's position")
        );
    }
}
