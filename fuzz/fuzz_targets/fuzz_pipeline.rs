//! Fuzz target for pipeline parsing.
//!
//! Parsing must never panic, must yield one step per pipe-separated
//! segment, and building against the builtin whitelist must either accept
//! every step or stop at the first unknown one.

#![no_main]

use libfuzzer_sys::fuzz_target;

use hostaudit::pipeline::{self, ShellPipeline};
use hostaudit::whitelist::Whitelist;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if text.len() > 10_000 {
        return;
    }

    let Ok(steps) = pipeline::parse("fuzz", text) else {
        return;
    };
    let pipes = text.split_whitespace().filter(|t| *t == "|").count();
    assert_eq!(steps.len(), pipes + 1, "step count for {text:?}");

    let total = steps.len();
    let mut built = ShellPipeline::new();
    match pipeline::build(steps, &Whitelist::with_builtins(), &mut built) {
        Ok(()) => assert_eq!(built.len(), total),
        Err(rejected) => assert_eq!(built.len(), rejected.position),
    }
});
