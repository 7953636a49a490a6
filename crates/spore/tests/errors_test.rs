mod common;

use common::eval_err;
use spore_core::ErrorKind;

#[test]
fn test_undefined_variable_kind_and_suggestion() {
    let err = eval_err("builtens.typeOf 1");
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    assert!(err.suggestions().contains(&"builtins".to_string()));
}

#[test]
fn test_attribute_missing_suggestions() {
    let err = eval_err("{ alpha = 1; beta = 2; }.alhpa");
    assert_eq!(err.kind(), ErrorKind::AttributeMissing);
    assert!(err.suggestions().contains(&"alpha".to_string()));
}

#[test]
fn test_select_on_non_set_is_type_error() {
    let err = eval_err("(42).field");
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_assertion_failed_carries_condition_text() {
    let err = eval_err("assert 1 == 2; 3");
    assert_eq!(err.kind(), ErrorKind::AssertionFailed);
    assert!(err.to_string().contains("1 == 2"), "got: {err}");
}

#[test]
fn test_error_has_position() {
    let err = eval_err("\n\n  (42).field");
    let pos = spore_core::resolve_pos(err.pos()).expect("error should carry a position");
    assert_eq!(pos.line, 3);
}

#[test]
fn test_trace_frames_accumulate() {
    // The failure inside the callee records the call in its trace.
    let err = eval_err("let f = x: x.missing; in f 42");
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(
        err.trace().iter().any(|t| t.message.contains("while calling")),
        "trace was {:?}",
        err.trace()
    );
}

#[test]
fn test_builtin_failures_name_the_builtin() {
    let err = eval_err("builtins.length 42");
    assert!(
        err.trace()
            .iter()
            .any(|t| t.message.contains("'__length' builtin")),
        "trace was {:?}",
        err.trace()
    );
}

#[test]
fn test_explicit_throw_is_marked() {
    let err = eval_err("throw \"goodbye\"");
    assert!(
        err.trace()
            .iter()
            .any(|t| t.message.contains("caused by explicit throw")),
        "trace was {:?}",
        err.trace()
    );
}

#[test]
fn test_parse_errors_surface_verbatim() {
    let err = eval_err("let x = ; in x");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_duplicate_static_attr_is_parse_error() {
    let err = eval_err("{ a = 1; a = 2; }");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_blackhole_error_is_stable_across_forces() {
    use spore_core::{Symbol, Value, NO_POS};
    use spore_eval::Evaluator;
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str("let s = { loop = s.loop; }; in s")
        .unwrap();
    let loop_attr = match &v {
        Value::Attrs(attrs) => attrs.get(Symbol::intern("loop")).unwrap().value.clone(),
        other => panic!("expected attrs, got {other:?}"),
    };
    let e1 = evaluator.force(&loop_attr, NO_POS).unwrap_err();
    let e2 = evaluator.force(&loop_attr, NO_POS).unwrap_err();
    assert_eq!(e1.kind(), ErrorKind::InfiniteRecursion);
    assert_eq!(e1.kind(), e2.kind());
    assert_eq!(e1.pos(), e2.pos());
}

#[test]
fn test_display_full_renders_suggestions() {
    let err = eval_err("{ name = 1; }.naem");
    let rendered = err.display_full();
    assert!(rendered.contains("did you mean"), "got: {rendered}");
    assert!(rendered.contains("name"), "got: {rendered}");
}

#[test]
fn test_restricted_path_kind() {
    use spore_core::EvalConfig;
    use spore_eval::Evaluator;
    let config = EvalConfig {
        restrict_eval: true,
        allowed_paths: vec![],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let err = evaluator
        .eval_str("builtins.readFile /etc/hosts")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RestrictedPath);
}

#[test]
fn test_pure_mode_blocks_get_env() {
    use spore_core::EvalConfig;
    use spore_eval::Evaluator;
    std::env::set_var("SPORE_TEST_MARKER", "visible");
    let pure = Evaluator::with_config(EvalConfig {
        pure_eval: true,
        ..EvalConfig::default()
    });
    let v = pure.eval_str("builtins.getEnv \"SPORE_TEST_MARKER\"").unwrap();
    match v {
        spore_core::Value::String(s) => assert_eq!(s.text, ""),
        other => panic!("expected string, got {other:?}"),
    }
}
