mod common;

use common::{eval_bool, eval_err, eval_int, eval_rendered, eval_string, eval_tests};
use spore_core::ErrorKind;

// ============================================================
// Core semantics
// ============================================================

eval_tests! {
    let_binding: "let x = 1; y = x + 1; in y" => "2",
    let_is_recursive: "let r = { a = 1; b = r.a + 1; }; in r.b" => "2",
    formals_with_default: "({x ? 10, y}: x + y) { y = 5; }" => "15",
    update_right_wins: "{ a = 1; } // { a = 2; b = 3; }" => "{ a = 2; b = 3; }",
    nested_with_shadowing: "with { a = 1; }; with { a = 2; }; a" => "2",
    try_eval_throw: "builtins.tryEval (throw \"nope\")" => "{ success = false; value = null; }",
    interpolation: "\"x${toString 3}y\"" => "\"x3y\"",
    list_concat: "[1 2] ++ [3]" => "[ 1 2 3 ]",
    attrpath_sugar_merges: "rec { a.b = 1; a.c = 2; }.a" => "{ b = 1; c = 2; }",
    if_does_not_force_other_branch: "if true then 1 else (throw \"x\")" => "1",
}

eval_tests! {
    rec_attrset: "rec { a = 1; b = a + 1; }.b" => "2",
    rec_select_through: "(rec { x = y + 1; y = 1; }).x" => "2",
    with_provides_names: "with { a = 40; b = 2; }; a + b" => "42",
    static_binding_beats_with: "let a = 1; in with { a = 2; }; a" => "1",
    empty_attrs: "{}" => "{ }",
    empty_list: "[]" => "[ ]",
    assert_true_passes: "assert 1 == 1; 42" => "42",
    not_operator: "!false" => "true",
    impl_operator: "false -> true" => "true",
    impl_short_circuits: "false -> (throw \"x\")" => "true",
    and_short_circuits: "false && (throw \"x\")" => "false",
    or_short_circuits: "true || (throw \"x\")" => "true",
    negate: "-(3 + 4)" => "-7",
    float_promotion: "1 + 2.5" => "3.5",
    division: "7 / 2" => "3",
    float_division: "7.0 / 2" => "3.5",
    has_attr: "{ a.b = 1; } ? a.b" => "true",
    has_attr_missing: "{ a = 1; } ? b.c" => "false",
    has_attr_through_non_set: "3 ? a" => "false",
    select_default: "{ a = 1; }.b or 2" => "2",
    select_default_on_non_set: "(1).a or \"fallback\"" => "\"fallback\"",
    select_chain_default: "{ a.b = 1; }.a.c or 9" => "9",
    curpos_without_file_is_null: "__curPos" => "null",
}

// ============================================================
// Laziness
// ============================================================

eval_tests! {
    unused_let_binding_never_forced: "let bad = throw \"boom\"; in 1" => "1",
    unused_attr_never_forced: "{ bad = throw \"boom\"; good = 1; }.good" => "1",
    lazy_list_elements: "builtins.elemAt [ (throw \"a\") 2 ] 1" => "2",
    with_namespace_lazy: "with (throw \"boom\"); 1" => "1",
    lazy_function_argument: "(x: 1) (throw \"unused\")" => "1",
    select_default_does_not_force: "{ }.missing or (1 + 1)" => "2",
}

#[test]
fn test_with_namespace_failure_surfaces_at_lookup() {
    let err = eval_err("with (throw \"boom\"); someName");
    assert_eq!(err.kind(), ErrorKind::Thrown);
}

#[test]
fn test_infinite_recursion_detected() {
    let err = eval_err("let x = x; in x");
    assert_eq!(err.kind(), ErrorKind::InfiniteRecursion);
}

#[test]
fn test_mutual_recursion_terminates() {
    assert_eq!(
        eval_int("let even = n: if n == 0 then true else odd (n - 1); odd = n: if n == 0 then false else even (n - 1); in if even 10 then 1 else 0"),
        1
    );
}

// ============================================================
// Functions
// ============================================================

#[test]
fn test_unexpected_argument_with_suggestions() {
    let err = eval_err("({x, y}: x) { x = 1; y = 2; z = 3; }");
    assert_eq!(err.kind(), ErrorKind::UnexpectedArgument);
    let suggestions = err.suggestions();
    assert!(
        suggestions.contains(&"x".to_string()) && suggestions.contains(&"y".to_string()),
        "suggestions were {suggestions:?}"
    );
}

#[test]
fn test_missing_argument() {
    let err = eval_err("({x, y}: x) { x = 1; }");
    assert_eq!(err.kind(), ErrorKind::MissingArgument);
}

eval_tests! {
    ellipsis_allows_extras: "({x, ...}: x) { x = 1; z = 3; }" => "1",
    at_pattern_binds_whole: "(args@{ a, ... }: args.b) { a = 1; b = 2; }" => "2",
    at_pattern_prefix_form: "({ a, ... }@args: args.b) { a = 1; b = 2; }" => "2",
    default_may_reference_formals: "({ a ? b + 1, b ? 3 }: a) {}" => "4",
    curried: "(a: b: a + b) 1 2" => "3",
    functor_attrs_callable: "({ __functor = self: x: self.n + x; n = 10; }) 5" => "15",
    primop_partial_application: "(builtins.add 40) 2" => "42",
    map_partial_primop: "map (builtins.add 1) [ 1 2 3 ]" => "[ 2 3 4 ]",
}

#[test]
fn test_calling_non_function_fails() {
    let err = eval_err("1 2");
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_stack_overflow_guard() {
    use spore_core::EvalConfig;
    use spore_eval::Evaluator;
    let config = EvalConfig {
        max_call_depth: 200,
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let err = evaluator.eval_str("let f = x: f x; in f 1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StackOverflow);
}

// ============================================================
// Equality
// ============================================================

eval_tests! {
    int_float_equality: "1 == 1.0" => "true",
    list_equality_is_deep: "[ { a = 1; } ] == [ { a = 1; } ]" => "true",
    string_context_ignored_in_equality:
        "builtins.unsafeDiscardStringContext \"x\" == \"x\"" => "true",
    lambdas_never_equal: "(x: x) == (x: x)" => "false",
    lambda_identity_equal: "let f = x: x; in f == f" => "true",
    derivations_compare_by_out_path:
        "{ type = \"derivation\"; outPath = \"/spore/store/a\"; name = \"x\"; } == { type = \"derivation\"; outPath = \"/spore/store/a\"; name = \"y\"; }"
        => "true",
    inequality: "1 != 2" => "true",
    null_equality: "null == null" => "true",
    comparison_chain: "1 < 2 && 2 <= 2 && 3 > 2 && 2 >= 2" => "true",
    string_comparison: "\"abc\" < \"abd\"" => "true",
    list_comparison: "[ 1 2 ] < [ 1 3 ]" => "true",
}

// ============================================================
// Recursive attrsets and __overrides
// ============================================================

eval_tests! {
    overrides_replace_value:
        "(rec { a = 1; __overrides = { a = 10; }; }).a" => "10",
    overrides_update_recursive_env:
        "(rec { a = 1; b = a + 1; __overrides = { a = 10; }; }).b" => "11",
    overrides_add_new_attrs:
        "(rec { a = 1; __overrides = { extra = 5; }; }).extra" => "5",
    dynamic_attrs_applied: "{ ${\"a\" + \"b\"} = 1; }.ab" => "1",
    dynamic_attr_null_skipped: "{ ${null} = 1; x = 2; }" => "{ x = 2; }",
    dynamic_wins_over_override_added:
        "(rec { a = 1; __overrides = { d = 1; }; ${\"d\"} = 2; }).d" => "2",
    inherit_from_outer: "let a = 1; in rec { inherit a; b = a + 1; }.b" => "2",
    inherit_from_expr: "let s = { v = 7; }; in { inherit (s) v; }.v" => "7",
}

#[test]
fn test_dynamic_collision_with_static_is_error() {
    let err = eval_err("{ a = 1; ${\"a\"} = 2; }");
    assert_eq!(err.kind(), ErrorKind::DuplicateAttribute);
}

// ============================================================
// Strings, paths, arithmetic edges
// ============================================================

#[test]
fn test_interpolated_string_has_no_context() {
    assert!(!eval_bool("builtins.hasContext \"x${toString 3}y\""));
}

#[test]
fn test_integer_overflow_is_error() {
    let err = eval_err("9223372036854775807 + 1");
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert!(err.to_string().contains("overflow"));
}

#[test]
fn test_division_by_zero() {
    let err = eval_err("1 / 0");
    assert!(err.to_string().contains("division by zero"));
}

#[test]
fn test_first_operand_decides_add_type() {
    assert_eq!(eval_string("\"n = \" + toString 4"), "n = 4");
    let err = eval_err("1 + \"x\"");
    assert!(err.to_string().contains("cannot add"));
}

#[test]
fn test_path_plus_string_is_path() {
    assert_eq!(eval_string("builtins.typeOf (/tmp + \"/sub\")"), "path");
    assert_eq!(eval_rendered("/tmp + \"/sub\""), "/tmp/sub");
}

#[test]
fn test_paths_canonicalise_lexically() {
    assert_eq!(eval_rendered("/tmp/a/../b"), "/tmp/b");
}

#[test]
fn test_interpolated_path_copies_to_store() {
    assert!(eval_bool("builtins.hasContext \"${/tmp/some-source}\""));
    assert!(eval_string("\"${/tmp/some-source}\"").starts_with("/spore/store/"));
}

#[test]
fn test_path_rejects_string_with_context() {
    let err = eval_err("/tmp + \"${/tmp/other}\"");
    assert!(err.to_string().contains("cannot be appended to a path"));
}

eval_tests! {
    indent_string: "''\n  hello\n  world\n''" => "\"hello\\nworld\\n\"",
    string_escapes: "\"a\\nb\"" => "\"a\\nb\"",
    uri_literal_is_string: "https://example.com/pkg.tar.gz" => "\"https://example.com/pkg.tar.gz\"",
}

// ============================================================
// Determinism and idempotence
// ============================================================

#[test]
fn test_evaluation_is_deterministic() {
    let a = eval_rendered("let f = n: if n == 0 then [] else [ n ] ++ f (n - 1); in f 5");
    let b = eval_rendered("let f = n: if n == 0 then [] else [ n ] ++ f (n - 1); in f 5");
    assert_eq!(a, b);
}

#[test]
fn test_force_deep_idempotent() {
    use spore_eval::Evaluator;
    let evaluator = Evaluator::new();
    let v = evaluator.eval_str("{ a = [ 1 (2 + 3) ]; b.c = \"x\"; }").unwrap();
    let once = evaluator.force_deep(&v).unwrap();
    let twice = evaluator.force_deep(&once).unwrap();
    let p1 = evaluator.print_value(&once, spore_eval::PrintOptions::default()).unwrap();
    let p2 = evaluator.print_value(&twice, spore_eval::PrintOptions::default()).unwrap();
    assert_eq!(p1, p2);
}

#[test]
fn test_thunk_memoisation_shares_outcome() {
    // Both references observe the same forced value.
    assert_eq!(eval_int("let x = 1 + 1; in x + x"), 4);
}
