//! Fuzz target for output comparison.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use hostaudit::compare::{Operator, compare_with};

#[derive(Debug, Arbitrary)]
struct Input {
    output: String,
    expected: String,
    operator: u8,
}

fuzz_target!(|input: Input| {
    if input.expected.len() > 1_000 {
        return;
    }
    let operator = Operator::ALL[usize::from(input.operator) % Operator::ALL.len()];
    let result = compare_with(&input.output, &input.expected, operator);
    if operator == Operator::Nil {
        assert_eq!(result.ok(), Some(true));
    }
});
