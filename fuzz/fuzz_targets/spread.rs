#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use gauntlet_core::distribute::spread;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    total: u8,
    weights: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut weights: Vec<u32> = input.weights.iter().take(16).map(|&w| u32::from(w)).collect();
    weights.sort_unstable_by(|a, b| b.cmp(a));

    let counts = spread(usize::from(input.total), &weights);
    if usize::from(input.total) >= 2 {
        assert_eq!(counts.len(), weights.len());
    }
});
