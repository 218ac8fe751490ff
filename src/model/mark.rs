//! Marks and mark sets.
//!
//! A mark set is a `Vec<Mark>` kept sorted by the rank of each mark's type
//! (its position in the schema spec), without duplicates.

use super::schema::{check_attrs, compute_attrs, MarkTypeData};
use super::{Attrs, MarkSpec, ModelError, Schema};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A mark type registered in a [`Schema`].
#[derive(Clone)]
pub struct MarkType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl MarkType {
    fn data(&self) -> &MarkTypeData {
        &self.schema.inner.marks[self.index]
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Position in the schema's mark order; sets are sorted by it.
    pub fn rank(&self) -> usize {
        self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn spec(&self) -> &MarkSpec {
        &self.data().spec
    }

    pub fn is_inclusive(&self) -> bool {
        self.spec().inclusive.unwrap_or(true)
    }

    pub fn is_spanning(&self) -> bool {
        self.spec().spanning.unwrap_or(true)
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.data().groups.iter().any(|g| g == group)
    }

    pub fn create(&self, attrs: Option<&Attrs>) -> Result<Mark, ModelError> {
        let attrs = compute_attrs(&self.spec().attrs, self.data().default_attrs.as_ref(), attrs)?;
        Ok(Mark {
            mark_type: self.clone(),
            attrs,
        })
    }

    pub fn check_attrs(&self, attrs: &Attrs) -> Result<(), ModelError> {
        check_attrs(&self.spec().attrs, attrs, "mark", self.name())
    }

    /// Removes every mark of this type from `set`.
    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter()
            .filter(|m| &m.mark_type != self)
            .cloned()
            .collect()
    }

    pub fn is_in_set<'a>(&self, set: &'a [Mark]) -> Option<&'a Mark> {
        set.iter().find(|m| &m.mark_type == self)
    }

    pub fn excludes(&self, other: &MarkType) -> bool {
        self.schema.ptr_eq(&other.schema) && self.data().excluded.contains(&other.index)
    }
}

impl PartialEq for MarkType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.schema.ptr_eq(&other.schema)
    }
}

impl Eq for MarkType {}

impl std::hash::Hash for MarkType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkType({})", self.name())
    }
}

/// An annotation on inline content, such as emphasis or a link.
#[derive(Clone)]
pub struct Mark {
    mark_type: MarkType,
    attrs: Attrs,
}

/// Wire form of a mark: `{type, attrs?}`.
#[derive(Debug, Deserialize)]
pub(crate) struct MarkJson {
    #[serde(rename = "type")]
    pub(crate) type_name: String,
    #[serde(default)]
    pub(crate) attrs: Option<Attrs>,
}

impl Mark {
    pub fn mark_type(&self) -> &MarkType {
        &self.mark_type
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Adds this mark to a sorted set, honoring exclusions. Returns the set
    /// unchanged when the mark is already there or excluded by a member.
    pub fn add_to_set(&self, set: &[Mark]) -> Vec<Mark> {
        let mut copy: Option<Vec<Mark>> = None;
        let mut placed = false;
        for (i, other) in set.iter().enumerate() {
            if self == other {
                return set.to_vec();
            }
            if self.mark_type.excludes(&other.mark_type) {
                copy.get_or_insert_with(|| set[..i].to_vec());
            } else if other.mark_type.excludes(&self.mark_type) {
                return set.to_vec();
            } else {
                if !placed && other.mark_type.rank() > self.mark_type.rank() {
                    copy.get_or_insert_with(|| set[..i].to_vec()).push(self.clone());
                    placed = true;
                }
                if let Some(copy) = copy.as_mut() {
                    copy.push(other.clone());
                }
            }
        }
        let mut copy = copy.unwrap_or_else(|| set.to_vec());
        if !placed {
            copy.push(self.clone());
        }
        copy
    }

    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| *m != self).cloned().collect()
    }

    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.iter().any(|m| m == self)
    }

    pub fn same_set(a: &[Mark], b: &[Mark]) -> bool {
        a == b
    }

    /// Builds a sorted mark set from an arbitrary list.
    pub fn set_from(marks: &[Mark]) -> Vec<Mark> {
        let mut set = marks.to_vec();
        set.sort_by_key(|m| m.mark_type.rank());
        set
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.mark_type.name().into()));
        if !self.attrs.is_empty() {
            obj.insert(
                "attrs".into(),
                Value::Object(self.attrs.clone().into_iter().collect()),
            );
        }
        Value::Object(obj)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Mark, ModelError> {
        let raw = MarkJson::deserialize(json)
            .map_err(|e| ModelError::range(format!("Invalid input for Mark.fromJSON: {e}")))?;
        Self::from_raw(schema, raw)
    }

    pub(crate) fn from_raw(schema: &Schema, raw: MarkJson) -> Result<Mark, ModelError> {
        let mark_type = schema.mark_type(&raw.type_name).ok_or_else(|| {
            ModelError::range(format!(
                "There is no mark type {} in this schema",
                raw.type_name
            ))
        })?;
        let mark = mark_type.create(raw.attrs.as_ref())?;
        mark_type.check_attrs(&mark.attrs)?;
        Ok(mark)
    }
}

impl PartialEq for Mark {
    fn eq(&self, other: &Self) -> bool {
        self.mark_type == other.mark_type && self.attrs == other.attrs
    }
}

impl Serialize for Mark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attrs.is_empty() {
            f.write_str(self.mark_type.name())
        } else {
            write!(f, "{}{:?}", self.mark_type.name(), self.attrs)
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mark_type.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeSpec, NodeSpec, SchemaSpec};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(
            SchemaSpec::new()
                .node("doc", NodeSpec::new().content("paragraph+"))
                .node("paragraph", NodeSpec::new().content("text*"))
                .node("text", NodeSpec::new())
                .mark("link", MarkSpec::new().attr("href", AttributeSpec::required()).inclusive(false))
                .mark("em", MarkSpec::new())
                .mark("strong", MarkSpec::new().excludes("code"))
                .mark("code", MarkSpec::new().excludes("_"))
                .mark("comment", MarkSpec::new().excludes("")),
        )
        .unwrap()
    }

    fn mark(schema: &Schema, name: &str) -> Mark {
        schema.mark(name, None).unwrap()
    }

    fn link(schema: &Schema, href: &str) -> Mark {
        let mut attrs = Attrs::new();
        attrs.insert("href".into(), json!(href));
        schema.mark("link", Some(&attrs)).unwrap()
    }

    fn names(set: &[Mark]) -> Vec<&str> {
        set.iter().map(|m| m.mark_type().name()).collect()
    }

    #[test]
    fn test_add_orders_by_rank() {
        let schema = schema();
        let set = mark(&schema, "strong").add_to_set(&[]);
        let set = mark(&schema, "em").add_to_set(&set);
        let set = link(&schema, "x").add_to_set(&set);
        assert_eq!(names(&set), ["link", "em", "strong"]);
    }

    #[test]
    fn test_add_existing_is_noop() {
        let schema = schema();
        let em = mark(&schema, "em");
        let set = em.add_to_set(&[]);
        assert_eq!(em.add_to_set(&set), set);
    }

    #[test]
    fn test_same_type_replaces_by_default() {
        let schema = schema();
        let set = link(&schema, "a").add_to_set(&[]);
        let set = link(&schema, "b").add_to_set(&set);
        assert_eq!(set, vec![link(&schema, "b")]);
    }

    #[test]
    fn test_exclusion() {
        let schema = schema();
        let set = mark(&schema, "em").add_to_set(&[]);
        let set = mark(&schema, "code").add_to_set(&set);
        // code excludes everything, including em.
        assert_eq!(names(&set), ["code"]);
        // strong excludes code, so adding it drops code.
        let set = mark(&schema, "strong").add_to_set(&set);
        assert_eq!(names(&set), ["strong"]);
        // comment excludes nothing, and nothing here excludes it.
        let set = mark(&schema, "comment").add_to_set(&set);
        assert_eq!(names(&set), ["strong", "comment"]);
        let twice = mark(&schema, "comment").add_to_set(&set);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_remove_and_membership() {
        let schema = schema();
        let em = mark(&schema, "em");
        let set = Mark::set_from(&[mark(&schema, "strong"), em.clone()]);
        assert_eq!(names(&set), ["em", "strong"]);
        assert!(em.is_in_set(&set));
        let set = em.remove_from_set(&set);
        assert!(!em.is_in_set(&set));
        let set = link(&schema, "x").add_to_set(&set);
        let link_type = schema.mark_type("link").unwrap();
        assert!(link_type.is_in_set(&set).is_some());
        assert_eq!(names(&link_type.remove_from_set(&set)), ["strong"]);
    }

    #[test]
    fn test_json() {
        let schema = schema();
        let json = link(&schema, "http://x").to_json();
        assert_eq!(json, json!({"type": "link", "attrs": {"href": "http://x"}}));
        assert_eq!(Mark::from_json(&schema, &json).unwrap(), link(&schema, "http://x"));
        assert_eq!(mark(&schema, "em").to_json(), json!({"type": "em"}));

        let err = Mark::from_json(&schema, &json!({"type": "nope"})).unwrap_err();
        assert!(matches!(err, ModelError::Range(_)));
        let err = Mark::from_json(&schema, &json!({"type": "link"})).unwrap_err();
        assert_eq!(err.to_string(), "No value supplied for attribute href");
    }

    #[test]
    fn test_inclusive_defaults() {
        let schema = schema();
        assert!(!schema.mark_type("link").unwrap().is_inclusive());
        assert!(schema.mark_type("em").unwrap().is_inclusive());
    }
}
