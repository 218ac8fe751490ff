#![allow(dead_code)]

use proptest::collection::vec;
use proptest::prelude::*;
use rich_doc::model::{AttributeSpec, MarkSpec, NodeSpec, SchemaSpec};
use rich_doc::{basic, Node, Schema, Slice};
use serde_json::{json, Value};

/// doc -> paragraph+, paragraph -> text*, with a strong mark.
pub fn flat_schema() -> Schema {
    Schema::new(
        SchemaSpec::new()
            .node("doc", NodeSpec::new().content("paragraph+"))
            .node("paragraph", NodeSpec::new().content("text*"))
            .node("text", NodeSpec::new())
            .mark("strong", MarkSpec::new())
            .mark(
                "link",
                MarkSpec::new().attr("href", AttributeSpec::required()),
            ),
    )
    .unwrap()
}

pub fn node(schema: &Schema, json: Value) -> Node {
    schema.node_from_json(&json).unwrap()
}

pub fn doc(content: Vec<Value>) -> Node {
    node(&basic::schema(), json!({"type": "doc", "content": content}))
}

pub fn text(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

pub fn marked(text: &str, marks: &[&str]) -> Value {
    let marks: Vec<Value> = marks.iter().map(|m| json!({"type": m})).collect();
    json!({"type": "text", "text": text, "marks": marks})
}

pub fn p(text: &str) -> Value {
    if text.is_empty() {
        json!({"type": "paragraph"})
    } else {
        json!({"type": "paragraph", "content": [self::text(text)]})
    }
}

pub fn blockquote(content: Vec<Value>) -> Value {
    json!({"type": "blockquote", "content": content})
}

pub fn ul(items: Vec<Value>) -> Value {
    json!({"type": "bullet_list", "content": items})
}

pub fn li(content: Vec<Value>) -> Value {
    json!({"type": "list_item", "content": content})
}

pub fn slice(schema: &Schema, content: Vec<Value>, open_start: usize, open_end: usize) -> Slice {
    let json = json!({"content": content, "openStart": open_start, "openEnd": open_end});
    Slice::from_json(schema, Some(&json)).unwrap()
}

fn text_run() -> impl Strategy<Value = Value> {
    (
        "[abc]{1,4}",
        prop::option::of(prop_oneof![Just("em"), Just("strong")]),
    )
        .prop_map(|(t, mark)| match mark {
            Some(mark) => marked(&t, &[mark]),
            None => text(&t),
        })
}

fn textblock(type_name: &'static str) -> impl Strategy<Value = Value> {
    vec(text_run(), 0..4).prop_map(move |runs| {
        let mut block = json!({"type": type_name});
        if type_name == "heading" {
            block["attrs"] = json!({"level": 2});
        }
        if !runs.is_empty() {
            block["content"] = Value::Array(runs);
        }
        block
    })
}

fn block() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => textblock("paragraph"),
        1 => textblock("heading"),
        1 => Just(json!({"type": "horizontal_rule"})),
        1 => vec(textblock("paragraph"), 1..3).prop_map(blockquote),
        1 => vec(textblock("paragraph").prop_map(|para| li(vec![para])), 1..3).prop_map(ul),
    ]
}

/// Documents in the basic schema, a few blocks deep.
pub fn arb_doc() -> impl Strategy<Value = Node> {
    vec(block(), 1..4).prop_map(doc)
}
