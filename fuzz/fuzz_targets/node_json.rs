#![no_main]

use libfuzzer_sys::fuzz_target;
use rich_doc::basic;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let schema = basic::schema();
    if let Ok(node) = schema.node_from_json(&json) {
        let _ = node.check();
        let back = schema
            .node_from_json(&node.to_json())
            .expect("serialized nodes decode");
        assert_eq!(back, node);
        for pos in 0..=node.content().size() {
            let _ = node.resolve(pos).expect("in range");
        }
    }
});
