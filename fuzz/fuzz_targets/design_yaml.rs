#![no_main]

use gauntlet_core::design::Design;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        if let Ok(design) = Design::parse(yaml) {
            // 파싱에 성공한 설계는 항상 호스트를 하나 이상 가진다
            assert!(!design.hosts.is_empty());
            let _ = design.workers();
        }
    }
});
