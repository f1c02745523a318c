#![no_main]

use gauntlet_core::design::parse_condition_query;
use gauntlet_core::template::stub_placeholders;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(query) = std::str::from_utf8(data) {
        let _ = parse_condition_query(query);
        let _ = parse_condition_query(&stub_placeholders(query));
    }
});
