#![no_main]

use libfuzzer_sys::fuzz_target;
use rich_doc::transform::Step;
use rich_doc::{Transform, basic};
use serde_json::json;

fuzz_target!(|data: &[u8]| {
    let Ok(serde_json::Value::Array(steps)) = serde_json::from_slice(data) else {
        return;
    };
    let schema = basic::schema();
    let doc = schema
        .node_from_json(&json!({"type": "doc", "content": [
            {"type": "paragraph", "content": [{"type": "text", "text": "one"}]},
            {"type": "blockquote", "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "two"}]}
            ]},
            {"type": "horizontal_rule"}
        ]}))
        .expect("seed doc is valid");

    let mut tr = Transform::new(doc);
    for json in &steps {
        if let Ok(step) = Step::from_json(&schema, json) {
            let _ = tr.maybe_step(step);
        }
    }
    // Applied steps keep documents valid and invert cleanly.
    assert!(tr.doc().check().is_ok());
    for (i, step) in tr.steps().iter().enumerate() {
        let before = &tr.docs()[i];
        let after = tr.docs().get(i + 1).unwrap_or(tr.doc());
        let inverse = step.invert(before).expect("inverts against its input");
        assert_eq!(inverse.apply(after).doc(), Some(before));
    }
});
