#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

use gauntlet_core::vars::Vars;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    template: String,
    key: String,
    value: String,
}

fuzz_target!(|input: FuzzInput| {
    let vars = Vars::new();
    vars.set(&input.key, Value::String(input.value));
    let _ = vars.expand_template(&input.template);
});
