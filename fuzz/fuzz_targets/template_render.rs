#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};
use templater_engine::Template;
use templater_sprig::sprig_functions;

fuzz_target!(|data: &[u8]| {
    let source = match std::str::from_utf8(data) {
        Ok(src) => src,
        Err(_) => return,
    };

    if let Ok(template) = Template::compile("fuzz-template-render", source, sprig_functions()) {
        let _ = template.render(&Value::Null);
        let _ = template.render(&json!({"name": "fuzz", "items": [1, 2, 3], "nested": {"k": true}}));
    }
});
