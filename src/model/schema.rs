//! Schema specs and the node/mark type registry built from them.

use super::content::{self, MatchState, TypeInfo, EMPTY_STATE};
use super::resolved_pos::ResolveCache;
use super::{ContentMatch, Fragment, Mark, MarkType, ModelError, Node};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Attribute values of a node or mark, keyed by attribute name.
pub type Attrs = BTreeMap<String, Value>;

/// Declares one attribute of a node or mark type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSpec {
    /// Value used when none is given. An attribute without a default is
    /// required. `Some(Value::Null)` is a real default of `null`.
    #[serde(
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    /// `|`-separated JSON type names the value must have, e.g.
    /// `"string|null"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<String>,
}

impl AttributeSpec {
    pub fn required() -> Self {
        Self::default()
    }

    pub fn with_default(value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
            validate: None,
        }
    }

    pub fn validate(mut self, types: impl Into<String>) -> Self {
        self.validate = Some(types.into());
        self
    }
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whitespace {
    Pre,
    Normal,
}

/// Describes a node type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSpec {
    /// Content expression, e.g. `"paragraph+"`. Empty or absent means leaf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Allowed marks: `"_"` for all, `""` for none, otherwise names/groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub inline: bool,
    pub atom: bool,
    #[serde(with = "ordered", skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<(String, AttributeSpec)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    pub draggable: bool,
    pub code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitespace: Option<Whitespace>,
    pub defining_as_context: bool,
    pub defining_for_content: bool,
    /// Shorthand for both `defining_as_context` and `defining_for_content`.
    pub defining: bool,
    pub isolating: bool,
    /// Text contributed by this leaf in `text_between`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_text: Option<String>,
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, expr: impl Into<String>) -> Self {
        self.content = Some(expr.into());
        self
    }

    pub fn marks(mut self, marks: impl Into<String>) -> Self {
        self.marks = Some(marks.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn atom(mut self) -> Self {
        self.atom = true;
        self
    }

    pub fn attr(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attrs.push((name.into(), spec));
        self
    }

    pub fn code(mut self) -> Self {
        self.code = true;
        self
    }

    pub fn defining(mut self) -> Self {
        self.defining = true;
        self
    }

    pub fn isolating(mut self) -> Self {
        self.isolating = true;
        self
    }

    pub fn leaf_text(mut self, text: impl Into<String>) -> Self {
        self.leaf_text = Some(text.into());
        self
    }
}

/// Describes a mark type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkSpec {
    #[serde(with = "ordered", skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<(String, AttributeSpec)>,
    /// Whether the mark extends to content typed at its end. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusive: Option<bool>,
    /// Marks this one can't coexist with. Defaults to other marks of the
    /// same type; `""` excludes nothing; `"_"` excludes everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spanning: Option<bool>,
}

impl MarkSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attrs.push((name.into(), spec));
        self
    }

    pub fn inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = Some(inclusive);
        self
    }

    pub fn excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = Some(excludes.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Input for [`Schema::new`]. Order of `nodes` and `marks` matters: earlier
/// node types are preferred when filling content, earlier marks rank lower.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    #[serde(with = "ordered")]
    pub nodes: Vec<(String, NodeSpec)>,
    #[serde(with = "ordered", default)]
    pub marks: Vec<(String, MarkSpec)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_node: Option<String>,
}

impl SchemaSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: impl Into<String>, spec: NodeSpec) -> Self {
        self.nodes.push((name.into(), spec));
        self
    }

    pub fn mark(mut self, name: impl Into<String>, spec: MarkSpec) -> Self {
        self.marks.push((name.into(), spec));
        self
    }

    pub fn top_node(mut self, name: impl Into<String>) -> Self {
        self.top_node = Some(name.into());
        self
    }
}

/// Serializes `Vec<(String, T)>` as a JSON object, keeping entry order.
mod ordered {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, T>(entries: &[(String, T)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, T>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

pub(crate) struct NodeTypeData {
    pub(crate) name: String,
    pub(crate) spec: NodeSpec,
    pub(crate) groups: Vec<String>,
    pub(crate) default_attrs: Option<Attrs>,
    pub(crate) content_match: usize,
    pub(crate) inline_content: bool,
    /// `None` allows every mark.
    pub(crate) mark_set: Option<Vec<usize>>,
    pub(crate) is_block: bool,
    pub(crate) is_text: bool,
}

pub(crate) struct MarkTypeData {
    pub(crate) name: String,
    pub(crate) spec: MarkSpec,
    pub(crate) groups: Vec<String>,
    pub(crate) default_attrs: Option<Attrs>,
    pub(crate) excluded: Vec<usize>,
}

pub(crate) struct SchemaInner {
    pub(crate) spec: SchemaSpec,
    pub(crate) nodes: Vec<NodeTypeData>,
    pub(crate) marks: Vec<MarkTypeData>,
    pub(crate) states: Vec<MatchState>,
    pub(crate) top: usize,
    /// `(state, target type)` to the wrapper chain found for it.
    pub(crate) wrap_cache: Mutex<HashMap<(usize, usize), Option<Vec<usize>>>>,
    pub(crate) resolve_cache: Mutex<ResolveCache>,
}

/// A compiled document schema. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Schema {
    pub(crate) inner: Arc<SchemaInner>,
}

impl Schema {
    pub fn new(spec: SchemaSpec) -> Result<Self, ModelError> {
        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (name, node_spec) in &spec.nodes {
            if nodes.iter().any(|n: &NodeTypeData| &n.name == name) {
                return Err(ModelError::range(format!("Duplicate node type '{name}'")));
            }
            let is_text = name == "text";
            nodes.push(NodeTypeData {
                name: name.clone(),
                groups: split_names(node_spec.group.as_deref()),
                default_attrs: default_attrs(&node_spec.attrs),
                content_match: EMPTY_STATE,
                inline_content: false,
                mark_set: None,
                is_block: !(node_spec.inline || is_text),
                is_text,
                spec: node_spec.clone(),
            });
        }

        let top_name = spec.top_node.as_deref().unwrap_or("doc");
        let top = nodes
            .iter()
            .position(|n| n.name == top_name)
            .ok_or_else(|| {
                ModelError::range(format!(
                    "Schema is missing its top node type ('{top_name}')"
                ))
            })?;
        let text = nodes
            .iter()
            .find(|n| n.is_text)
            .ok_or_else(|| ModelError::range("Every schema needs a 'text' type"))?;
        if !text.spec.attrs.is_empty() {
            return Err(ModelError::range(
                "The text node type should not have attributes",
            ));
        }

        let mut marks: Vec<MarkTypeData> = Vec::with_capacity(spec.marks.len());
        for (name, mark_spec) in &spec.marks {
            if marks.iter().any(|m| &m.name == name) {
                return Err(ModelError::range(format!("Duplicate mark type '{name}'")));
            }
            if nodes.iter().any(|n| &n.name == name) {
                return Err(ModelError::range(format!(
                    "{name} can not be both a node and a mark"
                )));
            }
            marks.push(MarkTypeData {
                name: name.clone(),
                groups: split_names(mark_spec.group.as_deref()),
                default_attrs: default_attrs(&mark_spec.attrs),
                excluded: Vec::new(),
                spec: mark_spec.clone(),
            });
        }

        let infos: Vec<TypeInfo<'_>> = nodes
            .iter()
            .map(|n| TypeInfo {
                name: &n.name,
                groups: &n.groups,
                inline: !n.is_block,
                generatable: !(n.is_text || has_required(&n.spec.attrs)),
            })
            .collect();
        let mut states = vec![MatchState::empty()];
        let mut expr_cache: HashMap<&str, usize> = HashMap::new();
        let mut matches = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let expr = node.spec.content.as_deref().unwrap_or("");
            let start = match expr_cache.get(expr) {
                Some(&state) => state,
                None => {
                    let state = content::compile(expr, &infos, &mut states)?;
                    expr_cache.insert(expr, state);
                    state
                }
            };
            matches.push(start);
        }
        drop(infos);

        for (node, start) in nodes.iter_mut().zip(matches) {
            node.content_match = start;
            node.inline_content = states[start]
                .next
                .first()
                .is_some_and(|&(t, _)| !is_block_at(&spec, t));
        }
        for index in 0..nodes.len() {
            let mark_set = match nodes[index].spec.marks.as_deref() {
                Some("_") => None,
                Some("") => Some(Vec::new()),
                Some(expr) => Some(gather_marks(&marks, expr)?),
                None if !nodes[index].inline_content => Some(Vec::new()),
                None => None,
            };
            nodes[index].mark_set = mark_set;
        }
        for index in 0..marks.len() {
            let excluded = match marks[index].spec.excludes.as_deref() {
                None => vec![index],
                Some("") => Vec::new(),
                Some(expr) => gather_marks(&marks, expr)?,
            };
            marks[index].excluded = excluded;
        }

        debug!(
            nodes = nodes.len(),
            marks = marks.len(),
            states = states.len(),
            "compiled schema"
        );

        Ok(Self {
            inner: Arc::new(SchemaInner {
                spec,
                nodes,
                marks,
                states,
                top,
                wrap_cache: Mutex::new(HashMap::new()),
                resolve_cache: Mutex::new(ResolveCache::new()),
            }),
        })
    }

    pub fn spec(&self) -> &SchemaSpec {
        &self.inner.spec
    }

    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.inner
            .nodes
            .iter()
            .position(|n| n.name == name)
            .map(|index| self.node_type_at(index))
    }

    pub fn mark_type(&self, name: &str) -> Option<MarkType> {
        self.inner
            .marks
            .iter()
            .position(|m| m.name == name)
            .map(|index| self.mark_type_at(index))
    }

    pub fn node_types(&self) -> impl Iterator<Item = NodeType> + '_ {
        (0..self.inner.nodes.len()).map(|index| self.node_type_at(index))
    }

    pub fn mark_types(&self) -> impl Iterator<Item = MarkType> + '_ {
        (0..self.inner.marks.len()).map(|index| self.mark_type_at(index))
    }

    pub fn top_node_type(&self) -> NodeType {
        self.node_type_at(self.inner.top)
    }

    /// Creates a node of the named type. Content is not checked.
    pub fn node(
        &self,
        type_name: &str,
        attrs: Option<&Attrs>,
        content: impl Into<Fragment>,
        marks: &[Mark],
    ) -> Result<Node, ModelError> {
        let node_type = self
            .node_type(type_name)
            .ok_or_else(|| ModelError::range(format!("Unknown node type: {type_name}")))?;
        node_type.create(attrs, content, marks)
    }

    pub fn text(&self, text: &str, marks: &[Mark]) -> Result<Node, ModelError> {
        if text.is_empty() {
            return Err(ModelError::range("Empty text nodes are not allowed"));
        }
        let text_type = self
            .inner
            .nodes
            .iter()
            .position(|n| n.is_text)
            .map(|index| self.node_type_at(index))
            .ok_or_else(|| ModelError::range("Every schema needs a 'text' type"))?;
        Ok(Node::new_text(text_type, text, Mark::set_from(marks)))
    }

    pub fn mark(&self, type_name: &str, attrs: Option<&Attrs>) -> Result<Mark, ModelError> {
        let mark_type = self
            .mark_type(type_name)
            .ok_or_else(|| ModelError::range(format!("Unknown mark type: {type_name}")))?;
        mark_type.create(attrs)
    }

    pub fn node_from_json(&self, json: &Value) -> Result<Node, ModelError> {
        Node::from_json(self, json)
    }

    pub fn mark_from_json(&self, json: &Value) -> Result<Mark, ModelError> {
        Mark::from_json(self, json)
    }

    pub(crate) fn node_type_at(&self, index: usize) -> NodeType {
        NodeType {
            schema: self.clone(),
            index,
        }
    }

    pub(crate) fn mark_type_at(&self, index: usize) -> MarkType {
        MarkType {
            schema: self.clone(),
            index,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field(
                "nodes",
                &self.inner.nodes.iter().map(|n| &n.name).collect::<Vec<_>>(),
            )
            .field(
                "marks",
                &self.inner.marks.iter().map(|m| &m.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn split_names(names: Option<&str>) -> Vec<String> {
    names
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn has_required(attrs: &[(String, AttributeSpec)]) -> bool {
    attrs.iter().any(|(_, spec)| spec.default.is_none())
}

fn default_attrs(attrs: &[(String, AttributeSpec)]) -> Option<Attrs> {
    attrs
        .iter()
        .map(|(name, spec)| spec.default.clone().map(|value| (name.clone(), value)))
        .collect()
}

fn is_block_at(spec: &SchemaSpec, index: usize) -> bool {
    let (name, node_spec) = &spec.nodes[index];
    !(node_spec.inline || name == "text")
}

fn gather_marks(marks: &[MarkTypeData], expr: &str) -> Result<Vec<usize>, ModelError> {
    let mut found = Vec::new();
    for name in expr.split_whitespace() {
        if let Some(index) = marks.iter().position(|m| m.name == name) {
            found.push(index);
            continue;
        }
        let mut ok = false;
        for (index, mark) in marks.iter().enumerate() {
            if name == "_" || mark.groups.iter().any(|g| g == name) {
                found.push(index);
                ok = true;
            }
        }
        if !ok {
            return Err(ModelError::syntax(format!("Unknown mark type: '{name}'")));
        }
    }
    Ok(found)
}

pub(crate) fn compute_attrs(
    specs: &[(String, AttributeSpec)],
    defaults: Option<&Attrs>,
    given: Option<&Attrs>,
) -> Result<Attrs, ModelError> {
    if let (None, Some(defaults)) = (given, defaults) {
        return Ok(defaults.clone());
    }
    let mut built = Attrs::new();
    for (name, spec) in specs {
        let value = match given.and_then(|attrs| attrs.get(name)) {
            Some(value) => value.clone(),
            None => spec.default.clone().ok_or_else(|| {
                ModelError::range(format!("No value supplied for attribute {name}"))
            })?,
        };
        built.insert(name.clone(), value);
    }
    Ok(built)
}

pub(crate) fn check_attrs(
    specs: &[(String, AttributeSpec)],
    values: &Attrs,
    kind: &str,
    type_name: &str,
) -> Result<(), ModelError> {
    for name in values.keys() {
        if !specs.iter().any(|(spec_name, _)| spec_name == name) {
            return Err(ModelError::range(format!(
                "Unsupported attribute {name} for {kind} of type {type_name}"
            )));
        }
    }
    for (name, spec) in specs {
        let Some(types) = spec.validate.as_deref() else {
            continue;
        };
        let value = values.get(name).unwrap_or(&Value::Null);
        let actual = json_type_name(value);
        if !types.split('|').any(|t| t.trim() == actual) {
            return Err(ModelError::range(format!(
                "Expected value of type {types} for attribute {name} on type {type_name}, got {actual}"
            )));
        }
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A node type registered in a [`Schema`].
#[derive(Clone)]
pub struct NodeType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl NodeType {
    fn data(&self) -> &NodeTypeData {
        &self.schema.inner.nodes[self.index]
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.data().spec
    }

    pub fn content_match(&self) -> ContentMatch {
        ContentMatch::at(&self.schema, self.data().content_match)
    }

    pub fn is_block(&self) -> bool {
        self.data().is_block
    }

    pub fn is_inline(&self) -> bool {
        !self.data().is_block
    }

    pub fn is_text(&self) -> bool {
        self.data().is_text
    }

    pub fn inline_content(&self) -> bool {
        self.data().inline_content
    }

    pub fn is_textblock(&self) -> bool {
        self.is_block() && self.inline_content()
    }

    pub fn is_leaf(&self) -> bool {
        self.data().content_match == EMPTY_STATE
    }

    pub fn is_atom(&self) -> bool {
        self.is_leaf() || self.spec().atom
    }

    pub fn is_defining_as_context(&self) -> bool {
        self.spec().defining || self.spec().defining_as_context
    }

    pub fn is_defining_for_content(&self) -> bool {
        self.spec().defining || self.spec().defining_for_content
    }

    pub fn is_isolating(&self) -> bool {
        self.spec().isolating
    }

    pub fn whitespace(&self) -> Whitespace {
        match self.spec().whitespace {
            Some(ws) => ws,
            None if self.spec().code => Whitespace::Pre,
            None => Whitespace::Normal,
        }
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.data().groups.iter().any(|g| g == group)
    }

    pub fn has_required_attrs(&self) -> bool {
        has_required(&self.spec().attrs)
    }

    pub fn default_attrs(&self) -> Option<&Attrs> {
        self.data().default_attrs.as_ref()
    }

    /// Whether content of `other` can be placed in nodes of this type.
    pub fn compatible_content(&self, other: &NodeType) -> bool {
        self == other || self.content_match().compatible(&other.content_match())
    }

    pub fn compute_attrs(&self, attrs: Option<&Attrs>) -> Result<Attrs, ModelError> {
        compute_attrs(&self.spec().attrs, self.default_attrs(), attrs)
    }

    pub fn check_attrs(&self, attrs: &Attrs) -> Result<(), ModelError> {
        check_attrs(&self.spec().attrs, attrs, "node", self.name())
    }

    /// Creates a node of this type. Content is not checked against the
    /// content expression.
    pub fn create(
        &self,
        attrs: Option<&Attrs>,
        content: impl Into<Fragment>,
        marks: &[Mark],
    ) -> Result<Node, ModelError> {
        if self.is_text() {
            return Err(ModelError::range(
                "NodeType.create can't construct text nodes",
            ));
        }
        Ok(Node::new(
            self.clone(),
            self.compute_attrs(attrs)?,
            content.into(),
            Mark::set_from(marks),
        ))
    }

    pub fn create_checked(
        &self,
        attrs: Option<&Attrs>,
        content: impl Into<Fragment>,
        marks: &[Mark],
    ) -> Result<Node, ModelError> {
        let content = content.into();
        self.check_content(&content)?;
        self.create(attrs, content, marks)
    }

    /// Like [`create`](Self::create), but adds filler nodes before and after
    /// `content` to make it valid. Returns `Ok(None)` when no filling works.
    pub fn create_and_fill(
        &self,
        attrs: Option<&Attrs>,
        content: impl Into<Fragment>,
        marks: &[Mark],
    ) -> Result<Option<Node>, ModelError> {
        let attrs = self.compute_attrs(attrs)?;
        let mut content = content.into();
        if content.size() > 0 {
            let Some(before) = self.content_match().fill_before(&content, false, 0) else {
                return Ok(None);
            };
            content = before.append(&content);
        }
        let after = self
            .content_match()
            .match_fragment(&content)
            .and_then(|matched| matched.fill_before(&Fragment::empty(), true, 0));
        let Some(after) = after else {
            return Ok(None);
        };
        Ok(Some(Node::new(
            self.clone(),
            attrs,
            content.append(&after),
            Mark::set_from(marks),
        )))
    }

    pub fn valid_content(&self, content: &Fragment) -> bool {
        let valid_end = self
            .content_match()
            .match_fragment(content)
            .is_some_and(|m| m.valid_end());
        valid_end && content.iter().all(|child| self.allows_marks(child.marks()))
    }

    pub fn check_content(&self, content: &Fragment) -> Result<(), ModelError> {
        if self.valid_content(content) {
            return Ok(());
        }
        let shown: String = content.to_string().chars().take(50).collect();
        Err(ModelError::range(format!(
            "Invalid content for node {}: {shown}",
            self.name()
        )))
    }

    pub fn allows_mark_type(&self, mark_type: &MarkType) -> bool {
        match &self.data().mark_set {
            None => true,
            Some(set) => mark_type.schema.ptr_eq(&self.schema) && set.contains(&mark_type.index),
        }
    }

    pub fn allows_marks(&self, marks: &[Mark]) -> bool {
        marks.iter().all(|m| self.allows_mark_type(m.mark_type()))
    }

    pub fn allowed_marks(&self, marks: &[Mark]) -> Vec<Mark> {
        marks
            .iter()
            .filter(|m| self.allows_mark_type(m.mark_type()))
            .cloned()
            .collect()
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.schema.ptr_eq(&other.schema)
    }
}

impl Eq for NodeType {}

impl std::hash::Hash for NodeType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({})", self.name())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
