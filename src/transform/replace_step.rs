use super::map::{Assoc, Mappable, StepMap};
use super::step::StepResult;
use crate::model::{ModelError, Node, Slice};
use serde_json::{Map, Value};

/// Replaces `from..to` with a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceStep {
    pub from: usize,
    pub to: usize,
    pub slice: Slice,
    /// When set, the step fails instead of overwriting content; it may
    /// only move node boundaries.
    pub structure: bool,
}

impl ReplaceStep {
    pub fn new(from: usize, to: usize, slice: Slice, structure: bool) -> Self {
        Self {
            from,
            to,
            slice,
            structure,
        }
    }

    /// Fails unless `from <= to`.
    pub fn check_range(&self) -> Result<(), ModelError> {
        if self.from > self.to {
            return Err(ModelError::range(format!(
                "Replace range {}..{} is reversed",
                self.from, self.to
            )));
        }
        Ok(())
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        if let Err(e) = self.check_range() {
            return StepResult::fail(e.to_string());
        }
        if self.structure && content_between(doc, self.from, self.to) {
            return StepResult::fail("Structure replace would overwrite content");
        }
        StepResult::from_replace(doc, self.from, self.to, &self.slice)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![
            self.from,
            self.to.saturating_sub(self.from),
            self.slice.size(),
        ])
    }

    pub fn invert(&self, doc: &Node) -> Result<ReplaceStep, ModelError> {
        self.check_range()?;
        Ok(ReplaceStep::new(
            self.from,
            self.from + self.slice.size(),
            doc.slice(self.from, self.to)?,
            false,
        ))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<ReplaceStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        if from.deleted_across() && to.deleted_across() {
            return None;
        }
        Some(ReplaceStep::new(
            from.pos,
            from.pos.max(to.pos),
            self.slice.clone(),
            self.structure,
        ))
    }

    pub fn merge(&self, other: &ReplaceStep) -> Option<ReplaceStep> {
        if other.structure || self.structure {
            return None;
        }
        let both_empty = self.slice.size() + other.slice.size() == 0;
        if self.from + self.slice.size() == other.from
            && self.slice.open_end() == 0
            && other.slice.open_start() == 0
        {
            let slice = if both_empty {
                Slice::empty()
            } else {
                Slice::new(
                    self.slice.content().append(other.slice.content()),
                    self.slice.open_start(),
                    other.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(
                self.from,
                self.to + (other.to - other.from),
                slice,
                self.structure,
            ))
        } else if other.to == self.from
            && self.slice.open_start() == 0
            && other.slice.open_end() == 0
        {
            let slice = if both_empty {
                Slice::empty()
            } else {
                Slice::new(
                    other.slice.content().append(self.slice.content()),
                    other.slice.open_start(),
                    self.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(other.from, self.to, slice, self.structure))
        } else {
            None
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("stepType".into(), "replace".into());
        obj.insert("from".into(), self.from.into());
        obj.insert("to".into(), self.to.into());
        if let Some(slice) = self.slice.to_json() {
            obj.insert("slice".into(), slice);
        }
        if self.structure {
            obj.insert("structure".into(), true.into());
        }
        Value::Object(obj)
    }
}

/// Replaces `from..to` with a slice while keeping `gap_from..gap_to`, which
/// is moved into the slice at offset `insert`. Used to wrap, lift or unwrap
/// content without touching it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceAroundStep {
    pub from: usize,
    pub to: usize,
    pub gap_from: usize,
    pub gap_to: usize,
    pub slice: Slice,
    pub insert: usize,
    pub structure: bool,
}

impl ReplaceAroundStep {
    pub fn new(
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
        slice: Slice,
        insert: usize,
        structure: bool,
    ) -> Self {
        Self {
            from,
            to,
            gap_from,
            gap_to,
            slice,
            insert,
            structure,
        }
    }

    /// Fails unless `from <= gap_from <= gap_to <= to` and `insert` lies
    /// within the slice.
    pub fn check_range(&self) -> Result<(), ModelError> {
        if self.from > self.gap_from || self.gap_from > self.gap_to || self.gap_to > self.to {
            return Err(ModelError::range(format!(
                "Gap range {}..{} does not fit in {}..{}",
                self.gap_from, self.gap_to, self.from, self.to
            )));
        }
        if self.insert > self.slice.size() {
            return Err(ModelError::range(format!(
                "Insert offset {} is outside a slice of size {}",
                self.insert,
                self.slice.size()
            )));
        }
        Ok(())
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        if let Err(e) = self.check_range() {
            return StepResult::fail(e.to_string());
        }
        if self.structure
            && (content_between(doc, self.from, self.gap_from)
                || content_between(doc, self.gap_to, self.to))
        {
            return StepResult::fail("Structure gap-replace would overwrite content");
        }
        let gap = match doc.slice(self.gap_from, self.gap_to) {
            Ok(gap) => gap,
            Err(e) => return StepResult::fail(e.to_string()),
        };
        if gap.open_start() > 0 || gap.open_end() > 0 {
            return StepResult::fail("Gap is not a flat range");
        }
        let Some(inserted) = self.slice.insert_at(self.insert, gap.content()) else {
            return StepResult::fail("Content does not fit in gap");
        };
        StepResult::from_replace(doc, self.from, self.to, &inserted)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![
            self.from,
            self.gap_from.saturating_sub(self.from),
            self.insert,
            self.gap_to,
            self.to.saturating_sub(self.gap_to),
            self.slice.size().saturating_sub(self.insert),
        ])
    }

    pub fn invert(&self, doc: &Node) -> Result<ReplaceAroundStep, ModelError> {
        self.check_range()?;
        let gap = self.gap_to - self.gap_from;
        let removed = doc
            .slice(self.from, self.to)?
            .remove_between(self.gap_from - self.from, self.gap_to - self.from)?;
        Ok(ReplaceAroundStep::new(
            self.from,
            self.from + self.slice.size() + gap,
            self.from + self.insert,
            self.from + self.insert + gap,
            removed,
            self.gap_from - self.from,
            self.structure,
        ))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<ReplaceAroundStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        let gap_from = if self.from == self.gap_from {
            from.pos
        } else {
            mapping.map(self.gap_from, Assoc::Before)
        };
        let gap_to = if self.to == self.gap_to {
            to.pos
        } else {
            mapping.map(self.gap_to, Assoc::After)
        };
        if (from.deleted_across() && to.deleted_across()) || gap_from < from.pos || gap_to > to.pos
        {
            return None;
        }
        Some(ReplaceAroundStep::new(
            from.pos,
            to.pos,
            gap_from,
            gap_to,
            self.slice.clone(),
            self.insert,
            self.structure,
        ))
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("stepType".into(), "replaceAround".into());
        obj.insert("from".into(), self.from.into());
        obj.insert("to".into(), self.to.into());
        obj.insert("gapFrom".into(), self.gap_from.into());
        obj.insert("gapTo".into(), self.gap_to.into());
        obj.insert("insert".into(), self.insert.into());
        if let Some(slice) = self.slice.to_json() {
            obj.insert("slice".into(), slice);
        }
        if self.structure {
            obj.insert("structure".into(), true.into());
        }
        Value::Object(obj)
    }
}

/// Whether `from..to` covers anything besides node boundaries.
fn content_between(doc: &Node, from: usize, to: usize) -> bool {
    let Ok(rfrom) = doc.resolve(from) else {
        return true;
    };
    let mut dist = to.saturating_sub(from);
    let mut depth = rfrom.depth();
    while dist > 0 && depth > 0 && rfrom.index_after(depth) == rfrom.node(depth).child_count() {
        depth -= 1;
        dist -= 1;
    }
    if dist > 0 {
        let mut next = rfrom
            .node(depth)
            .maybe_child(rfrom.index_after(depth))
            .cloned();
        while dist > 0 {
            match next {
                Some(node) if !node.is_leaf() => {
                    next = node.first_child().cloned();
                    dist -= 1;
                }
                _ => return true,
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic;
    use crate::model::Fragment;
    use serde_json::json;

    fn doc(json: Value) -> Node {
        basic::schema().node_from_json(&json).unwrap()
    }

    fn p(text: &str) -> Value {
        json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
    }

    fn text_slice(text: &str) -> Slice {
        Slice::new(
            Fragment::from(basic::schema().text(text, &[]).unwrap()),
            0,
            0,
        )
    }

    #[test]
    fn test_replace_apply_and_invert() {
        let d = doc(json!({"type": "doc", "content": [p("abc")]}));
        let step = ReplaceStep::new(2, 3, text_slice("XY"), false);
        let after = step.apply(&d).doc().cloned().unwrap();
        assert_eq!(after.text_content(), "aXYc");
        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.apply(&after).doc(), Some(&d));
        assert_eq!(step.get_map().ranges(), &[2, 1, 2]);
    }

    #[test]
    fn test_structure_replace_refuses_content() {
        let d = doc(json!({"type": "doc", "content": [p("ab"), p("cd")]}));
        let step = ReplaceStep::new(2, 6, Slice::empty(), true);
        assert_eq!(
            step.apply(&d).failed(),
            Some("Structure replace would overwrite content")
        );
        let boundary = ReplaceStep::new(3, 5, Slice::empty(), true);
        assert_eq!(boundary.apply(&d).doc().unwrap().text_content(), "abcd");
    }

    #[test]
    fn test_merge_adjacent_inserts() {
        let a = ReplaceStep::new(1, 1, text_slice("a"), false);
        let b = ReplaceStep::new(2, 2, text_slice("b"), false);
        let merged = a.merge(&b).unwrap();
        assert_eq!((merged.from, merged.to), (1, 1));
        assert_eq!(merged.slice.content().size(), 2);

        let del_a = ReplaceStep::new(3, 4, Slice::empty(), false);
        let del_b = ReplaceStep::new(2, 3, Slice::empty(), false);
        let merged = del_a.merge(&del_b).unwrap();
        assert_eq!((merged.from, merged.to), (2, 4));
        assert!(ReplaceStep::new(5, 6, Slice::empty(), false).merge(&del_b).is_none());
    }

    #[test]
    fn test_map_drops_deleted_replace() {
        let step = ReplaceStep::new(3, 4, Slice::empty(), false);
        let deletion = StepMap::new(vec![2, 4, 0]);
        assert!(step.map(&deletion).is_none());
        let shift = StepMap::new(vec![0, 0, 2]);
        let moved = step.map(&shift).unwrap();
        assert_eq!((moved.from, moved.to), (5, 6));
    }

    #[test]
    fn test_replace_around_wraps_and_inverts() {
        let schema = basic::schema();
        let d = doc(json!({"type": "doc", "content": [p("ab")]}));
        let quote = schema.node("blockquote", None, Fragment::empty(), &[]).unwrap();
        let step = ReplaceAroundStep::new(
            0,
            4,
            0,
            4,
            Slice::new(Fragment::from(quote), 0, 0),
            1,
            true,
        );
        let after = step.apply(&d).doc().cloned().unwrap();
        assert_eq!(after.to_string(), r#"doc(blockquote(paragraph("ab")))"#);
        assert_eq!(step.get_map().map(1, Assoc::After), 2);

        let inverse = step.invert(&d).unwrap();
        assert_eq!(inverse.apply(&after).doc(), Some(&d));
    }

    #[test]
    fn test_reversed_ranges_fail_to_apply() {
        let d = doc(json!({"type": "doc", "content": [p("abcdef")]}));
        let reversed = ReplaceStep::new(5, 2, Slice::empty(), false);
        assert!(reversed.apply(&d).failed().is_some());
        assert!(reversed.invert(&d).is_err());
        assert_eq!(reversed.get_map().ranges(), &[5, 0, 0]);

        let wide_gap = ReplaceAroundStep::new(1, 2, 1, 7, Slice::empty(), 0, false);
        assert!(wide_gap.apply(&d).failed().is_some());
        assert!(wide_gap.invert(&d).is_err());
        let bad_insert = ReplaceAroundStep::new(0, 8, 0, 8, Slice::empty(), 1, false);
        assert!(bad_insert.apply(&d).failed().is_some());
    }

    #[test]
    fn test_json_shape() {
        let step = ReplaceStep::new(1, 1, text_slice("x"), false);
        assert_eq!(
            step.to_json(),
            json!({"stepType": "replace", "from": 1, "to": 1,
                   "slice": {"content": [{"type": "text", "text": "x"}]}})
        );
        let around = ReplaceAroundStep::new(0, 4, 0, 4, Slice::empty(), 0, true);
        assert_eq!(around.to_json()["gapTo"], json!(4));
        assert_eq!(around.to_json()["structure"], json!(true));
    }
}
