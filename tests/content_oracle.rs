mod proptest_config;

use proptest::collection::vec;
use proptest::prelude::*;
use rich_doc::model::{NodeSpec, SchemaSpec};
use rich_doc::Schema;

/// Leaf block types `a`, `b` and `c`, where `a` and `b` form group `grp`.
fn holder_schema(expr: &str) -> Schema {
    Schema::new(
        SchemaSpec::new()
            .node("doc", NodeSpec::new().content("holder"))
            .node("holder", NodeSpec::new().content(expr))
            .node("a", NodeSpec::new().group("grp"))
            .node("b", NodeSpec::new().group("grp"))
            .node("c", NodeSpec::new())
            .node("text", NodeSpec::new()),
    )
    .unwrap()
}

fn automaton_accepts(schema: &Schema, seq: &[&str]) -> bool {
    let mut state = schema.node_type("holder").unwrap().content_match();
    for name in seq {
        let node_type = schema.node_type(name).unwrap();
        match state.match_type(&node_type) {
            Some(next) => state = next,
            None => return false,
        }
    }
    state.valid_end()
}

fn arb_expr() -> impl Strategy<Value = String> {
    let atom = prop_oneof![Just("a"), Just("b"), Just("c"), Just("grp")].prop_map(String::from);
    atom.prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 2..4).prop_map(|items| items.join(" ")),
            vec(inner.clone(), 2..4).prop_map(|items| format!("({})", items.join(" | "))),
            (inner.clone(), prop_oneof![Just("*"), Just("+"), Just("?")])
                .prop_map(|(expr, op)| format!("({expr}){op}")),
            (inner, 0usize..=1, 1usize..=2).prop_map(|(expr, min, max)| {
                format!("({expr}){{{min},{}}}", max.max(min))
            }),
        ]
    })
}

fn arb_seq() -> impl Strategy<Value = Vec<&'static str>> {
    vec(prop_oneof![Just("a"), Just("b"), Just("c")], 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(proptest_config::cases()))]
    #[test]
    fn prop_automaton_agrees_with_backtracking(expr in arb_expr(), seq in arb_seq()) {
        let schema = holder_schema(&expr);
        let naive = rich_doc_oracle::parse(&expr, &schema).unwrap();
        prop_assert_eq!(
            automaton_accepts(&schema, &seq),
            rich_doc_oracle::matches(&naive, &seq),
            "expr {:?} seq {:?}", expr, seq
        );
    }
}

#[test]
fn test_group_expands_to_members() {
    let schema = holder_schema("grp+ c");
    let naive = rich_doc_oracle::parse("grp+ c", &schema).unwrap();
    for seq in [&["a", "c"][..], &["b", "a", "c"], &["c"], &["a", "b"]] {
        assert_eq!(
            automaton_accepts(&schema, seq),
            rich_doc_oracle::matches(&naive, seq),
            "{seq:?}"
        );
    }
    assert!(automaton_accepts(&schema, &["b", "a", "c"]));
    assert!(!automaton_accepts(&schema, &["c"]));
}
