#![allow(dead_code, unused_imports)]

use spore_core::{SporeError, Value, NO_POS};
use spore_eval::{Evaluator, PrintOptions};

/// Evaluate an expression with a fresh evaluator.
pub fn eval(input: &str) -> Value {
    let evaluator = Evaluator::new();
    evaluator
        .eval_str(input)
        .unwrap_or_else(|e| panic!("evaluation failed for `{input}`: {e}"))
}

/// Evaluate, deeply force, and render the result as source text.
pub fn eval_rendered(input: &str) -> String {
    let evaluator = Evaluator::new();
    let value = evaluator
        .eval_str(input)
        .unwrap_or_else(|e| panic!("evaluation failed for `{input}`: {e}"));
    let value = evaluator
        .force_deep(&value)
        .unwrap_or_else(|e| panic!("deep forcing failed for `{input}`: {e}"));
    evaluator
        .print_value(&value, PrintOptions::default())
        .unwrap_or_else(|e| panic!("printing failed for `{input}`: {e}"))
}

/// Evaluate, expecting an error; deep-forces so lazy failures surface.
pub fn eval_err(input: &str) -> SporeError {
    let evaluator = Evaluator::new();
    match evaluator.eval_str(input) {
        Err(e) => e,
        Ok(value) => match evaluator.force_deep(&value) {
            Err(e) => e,
            Ok(_) => panic!("expected an error for `{input}`"),
        },
    }
}

pub fn eval_int(input: &str) -> i64 {
    match eval(input) {
        Value::Int(n) => n,
        other => panic!("expected an integer for `{input}`, got {other:?}"),
    }
}

pub fn eval_bool(input: &str) -> bool {
    match eval(input) {
        Value::Bool(b) => b,
        other => panic!("expected a Boolean for `{input}`, got {other:?}"),
    }
}

pub fn eval_string(input: &str) -> String {
    let evaluator = Evaluator::new();
    let value = evaluator
        .eval_str(input)
        .unwrap_or_else(|e| panic!("evaluation failed for `{input}`: {e}"));
    let forced = evaluator
        .force(&value, NO_POS)
        .unwrap_or_else(|e| panic!("forcing failed for `{input}`: {e}"));
    match forced {
        Value::String(s) => s.text.clone(),
        other => panic!("expected a string for `{input}`, got {other:?}"),
    }
}

/// Table-driven evaluation tests: each entry becomes one test comparing
/// the deeply forced, printed result against an expected rendering.
macro_rules! eval_tests {
    ($($name:ident: $src:expr => $expected:expr),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let rendered = crate::common::eval_rendered($src);
                assert_eq!(rendered, $expected, "for expression `{}`", $src);
            }
        )*
    };
}
pub(crate) use eval_tests;
