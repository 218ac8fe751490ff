//! A ready-made schema: paragraphs, headings, quotes, lists, code blocks,
//! images and hard breaks, with link, em, strong and code marks.

use crate::model::{AttributeSpec, MarkSpec, NodeSpec, Schema, SchemaSpec};
use serde_json::Value;
use std::sync::OnceLock;

/// The `SchemaSpec` behind [`schema`]. Node order matters: `paragraph` comes first
/// in the `block` group, so it is the default block for filling.
pub fn spec() -> SchemaSpec {
    SchemaSpec::new()
        .node("doc", NodeSpec::new().content("block+"))
        .node("paragraph", NodeSpec::new().content("inline*").group("block"))
        .node(
            "blockquote",
            NodeSpec::new().content("block+").group("block").defining(),
        )
        .node("horizontal_rule", NodeSpec::new().group("block"))
        .node(
            "heading",
            NodeSpec::new()
                .attr("level", AttributeSpec::with_default(1).validate("number"))
                .content("inline*")
                .group("block")
                .defining(),
        )
        .node(
            "code_block",
            NodeSpec::new()
                .content("text*")
                .marks("")
                .group("block")
                .code()
                .defining(),
        )
        .node("text", NodeSpec::new().group("inline"))
        .node(
            "image",
            NodeSpec {
                draggable: true,
                ..NodeSpec::new()
                    .inline()
                    .attr("src", AttributeSpec::required().validate("string"))
                    .attr("alt", AttributeSpec::with_default(Value::Null))
                    .attr("title", AttributeSpec::with_default(Value::Null))
                    .group("inline")
            },
        )
        .node(
            "hard_break",
            NodeSpec {
                selectable: Some(false),
                ..NodeSpec::new().inline().group("inline")
            },
        )
        .node(
            "bullet_list",
            NodeSpec::new().content("list_item+").group("block"),
        )
        .node(
            "ordered_list",
            NodeSpec::new()
                .attr("order", AttributeSpec::with_default(1).validate("number"))
                .content("list_item+")
                .group("block"),
        )
        .node(
            "list_item",
            NodeSpec::new().content("paragraph block*").defining(),
        )
        .mark(
            "link",
            MarkSpec::new()
                .attr("href", AttributeSpec::required())
                .attr("title", AttributeSpec::with_default(Value::Null))
                .inclusive(false),
        )
        .mark("em", MarkSpec::new())
        .mark("strong", MarkSpec::new())
        .mark("code", MarkSpec::new())
}

/// The compiled basic schema. Built once; clones share it.
pub fn schema() -> Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA
        .get_or_init(|| Schema::new(spec()).expect("basic schema spec is valid"))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fragment;

    #[test]
    fn test_schema_shape() {
        let schema = schema();
        assert_eq!(schema.top_node_type().name(), "doc");
        let list_item = schema.node_type("list_item").unwrap();
        assert!(!list_item.is_in_group("block"));
        assert!(schema.node_type("image").unwrap().has_required_attrs());
        let code_block = schema.node_type("code_block").unwrap();
        let em = schema.mark_type("em").unwrap();
        assert!(!code_block.allows_mark_type(&em));
    }

    #[test]
    fn test_doc_fills_with_paragraph() {
        let schema = schema();
        let doc = schema.top_node_type();
        let fill = doc
            .content_match()
            .fill_before(&Fragment::empty(), true, 0)
            .unwrap();
        assert_eq!(fill.to_string(), "<paragraph>");
    }

    #[test]
    fn test_list_item_wraps_in_bullet_list() {
        let schema = schema();
        let list_item = schema.node_type("list_item").unwrap();
        let wrapping = schema
            .top_node_type()
            .content_match()
            .find_wrapping(&list_item)
            .unwrap();
        let names: Vec<_> = wrapping.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["bullet_list"]);
    }
}
