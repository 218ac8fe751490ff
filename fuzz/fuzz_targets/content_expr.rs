#![no_main]

use libfuzzer_sys::fuzz_target;
use rich_doc::model::{NodeSpec, SchemaSpec};
use rich_doc::Schema;

fuzz_target!(|data: &[u8]| {
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };
    // Must either compile or return an error, never panic.
    let _ = Schema::new(
        SchemaSpec::new()
            .node("doc", NodeSpec::new().content(expr))
            .node("para", NodeSpec::new().content("text*").group("block"))
            .node("rule", NodeSpec::new().group("block"))
            .node("text", NodeSpec::new()),
    );
});
