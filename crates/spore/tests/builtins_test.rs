mod common;

use common::{eval_bool, eval_err, eval_int, eval_string, eval_tests};
use spore_core::ErrorKind;

// ============================================================
// Type predicates and typeOf
// ============================================================

eval_tests! {
    type_of_int: "builtins.typeOf 1" => "\"int\"",
    type_of_float: "builtins.typeOf 1.5" => "\"float\"",
    type_of_bool: "builtins.typeOf true" => "\"bool\"",
    type_of_null: "builtins.typeOf null" => "\"null\"",
    type_of_string: "builtins.typeOf \"s\"" => "\"string\"",
    type_of_list: "builtins.typeOf []" => "\"list\"",
    type_of_set: "builtins.typeOf {}" => "\"set\"",
    type_of_lambda: "builtins.typeOf (x: x)" => "\"lambda\"",
    is_int: "builtins.isInt 3" => "true",
    is_function_on_primop: "builtins.isFunction builtins.add" => "true",
    is_function_on_functor_is_false: "builtins.isFunction { __functor = s: x: x; }" => "false",
    is_null_top_level: "isNull null" => "true",
    is_attrs: "builtins.isAttrs { }" => "true",
}

// ============================================================
// Attribute-set builtins
// ============================================================

eval_tests! {
    attr_names_sorted: "builtins.attrNames { b = 1; a = 2; c = 3; }" => "[ \"a\" \"b\" \"c\" ]",
    attr_values_follow_names: "builtins.attrValues { b = 20; a = 10; }" => "[ 10 20 ]",
    get_attr: "builtins.getAttr \"x\" { x = 5; }" => "5",
    has_attr_builtin: "builtins.hasAttr \"x\" { x = 5; }" => "true",
    remove_attrs: "removeAttrs { a = 1; b = 2; c = 3; } [ \"a\" \"c\" ]" => "{ b = 2; }",
    list_to_attrs: "builtins.listToAttrs [ { name = \"a\"; value = 1; } { name = \"b\"; value = 2; } ]"
        => "{ a = 1; b = 2; }",
    list_to_attrs_first_wins: "(builtins.listToAttrs [ { name = \"a\"; value = 1; } { name = \"a\"; value = 2; } ]).a"
        => "1",
    intersect_attrs: "builtins.intersectAttrs { a = 0; b = 0; } { b = 2; c = 3; }" => "{ b = 2; }",
    cat_attrs: "builtins.catAttrs \"x\" [ { x = 1; } { y = 2; } { x = 3; } ]" => "[ 1 3 ]",
    map_attrs: "builtins.mapAttrs (name: value: name + toString value) { a = 1; }" => "{ a = \"a1\"; }",
    zip_attrs_with: "builtins.zipAttrsWith (name: values: values) [ { a = 1; } { a = 2; b = 3; } ]"
        => "{ a = [ 1 2 ]; b = [ 3 ]; }",
    function_args: "builtins.functionArgs ({ a, b ? 1, ... }: a)" => "{ a = false; b = true; }",
}

#[test]
fn test_get_attr_missing_suggests() {
    let err = eval_err("builtins.getAttr \"naem\" { name = 1; other = 2; }");
    assert_eq!(err.kind(), ErrorKind::AttributeMissing);
    assert!(err.suggestions().contains(&"name".to_string()));
}

// ============================================================
// List builtins
// ============================================================

eval_tests! {
    map_basic: "map (x: x * 2) [ 1 2 3 ]" => "[ 2 4 6 ]",
    filter_basic: "builtins.filter (x: x > 1) [ 1 2 3 ]" => "[ 2 3 ]",
    length_basic: "builtins.length [ 1 2 3 ]" => "3",
    head_tail: "builtins.head [ 1 2 ] + builtins.length (builtins.tail [ 1 2 ])" => "2",
    elem_found: "builtins.elem 2 [ 1 2 3 ]" => "true",
    elem_structural: "builtins.elem { a = 1; } [ { a = 1; } ]" => "true",
    concat_lists: "builtins.concatLists [ [ 1 ] [] [ 2 3 ] ]" => "[ 1 2 3 ]",
    concat_map: "builtins.concatMap (x: [ x x ]) [ 1 2 ]" => "[ 1 1 2 2 ]",
    foldl_strict: "builtins.foldl' (acc: x: acc + x) 0 [ 1 2 3 4 ]" => "10",
    gen_list: "builtins.genList (i: i * i) 4" => "[ 0 1 4 9 ]",
    all_true: "builtins.all (x: x > 0) [ 1 2 ]" => "true",
    any_false: "builtins.any (x: x > 5) [ 1 2 ]" => "false",
    sort_ints: "builtins.sort builtins.lessThan [ 3 1 2 ]" => "[ 1 2 3 ]",
    sort_is_stable: "map (p: p.k) (builtins.sort (a: b: a.n < b.n) [ { n = 1; k = \"a\"; } { n = 0; k = \"b\"; } { n = 1; k = \"c\"; } ])"
        => "[ \"b\" \"a\" \"c\" ]",
    partition_basic: "builtins.partition (x: x > 1) [ 1 2 3 ]" => "{ right = [ 2 3 ]; wrong = [ 1 ]; }",
    group_by: "builtins.groupBy (x: if x > 1 then \"big\" else \"small\") [ 1 2 3 ]"
        => "{ big = [ 2 3 ]; small = [ 1 ]; }",
}

#[test]
fn test_head_of_empty_list() {
    let err = eval_err("builtins.head []");
    assert!(err.to_string().contains("empty list"));
}

#[test]
fn test_elem_at_out_of_bounds() {
    let err = eval_err("builtins.elemAt [ 1 ] 5");
    assert!(err.to_string().contains("out of bounds"));
}

// ============================================================
// String builtins
// ============================================================

eval_tests! {
    to_string_int: "toString 42" => "\"42\"",
    to_string_null: "toString null" => "\"\"",
    to_string_bools: "toString true + toString false" => "\"1\"",
    to_string_list: "toString [ 1 2 ]" => "\"1 2\"",
    string_length: "builtins.stringLength \"hello\"" => "5",
    substring_basic: "builtins.substring 1 3 \"abcdef\"" => "\"bcd\"",
    substring_negative_len: "builtins.substring 2 (-1) \"abcdef\"" => "\"cdef\"",
    substring_clamps: "builtins.substring 4 10 \"abc\"" => "\"\"",
    concat_strings_sep: "builtins.concatStringsSep \", \" [ \"a\" \"b\" ]" => "\"a, b\"",
    replace_strings: "builtins.replaceStrings [ \"o\" ] [ \"0\" ] \"foobar\"" => "\"f00bar\"",
    replace_longest_listed_first: "builtins.replaceStrings [ \"ab\" \"a\" ] [ \"X\" \"Y\" ] \"aab\"" => "\"YX\"",
    match_hit: "builtins.match \"a(b+)c\" \"abbc\"" => "[ \"bb\" ]",
    match_miss: "builtins.match \"abc\" \"abcd\"" => "null",
    split_basic: "builtins.split \",\" \"a,b\"" => "[ \"a\" [ ] \"b\" ]",
    split_version: "builtins.splitVersion \"1.2a.3\"" => "[ \"1\" \"2\" \"a\" \"3\" ]",
    compare_versions_lt: "builtins.compareVersions \"1.9\" \"1.10\"" => "-1",
    compare_versions_pre: "builtins.compareVersions \"2.0-pre\" \"2.0\"" => "-1",
    parse_drv_name: "builtins.parseDrvName \"hello-2.12\"" => "{ name = \"hello\"; version = \"2.12\"; }",
    hash_string: "builtins.hashString \"sha256\" \"abc\""
        => "\"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\"",
}

// ============================================================
// Control builtins
// ============================================================

eval_tests! {
    try_eval_success: "builtins.tryEval 42" => "{ success = true; value = 42; }",
    try_eval_assert: "(builtins.tryEval (assert false; 1)).success" => "false",
    try_eval_search_path_miss: "(builtins.tryEval <no-such-entry/x>).success" => "false",
    seq_whnf_only: "builtins.seq { a = throw \"x\"; } 1" => "1",
}

#[test]
fn test_try_eval_does_not_catch_abort() {
    let err = eval_err("builtins.tryEval (abort \"stop\")");
    assert_eq!(err.kind(), ErrorKind::Abort);
}

#[test]
fn test_try_eval_does_not_catch_type_errors() {
    let err = eval_err("builtins.tryEval (1 + \"x\")");
    assert_eq!(err.kind(), ErrorKind::Eval);
}

#[test]
fn test_seq_forces_first() {
    let err = eval_err("builtins.seq (throw \"x\") 1");
    assert_eq!(err.kind(), ErrorKind::Thrown);
}

#[test]
fn test_deep_seq_forces_inside() {
    let err = eval_err("builtins.deepSeq { a = throw \"x\"; } 1");
    assert_eq!(err.kind(), ErrorKind::Thrown);
}

#[test]
fn test_throw_message() {
    let err = eval_err("throw \"custom message\"");
    assert_eq!(err.kind(), ErrorKind::Thrown);
    assert!(err.to_string().contains("custom message"));
}

// ============================================================
// JSON
// ============================================================

eval_tests! {
    to_json_scalars: "builtins.toJSON [ 1 true null \"x\" ]" => "\"[1,true,null,\\\"x\\\"]\"",
    from_json_object: "builtins.fromJSON ''{\"a\": 1, \"b\": [true, 2.5]}''"
        => "{ a = 1; b = [ true 2.5 ]; }",
    json_round_trip: "builtins.fromJSON (builtins.toJSON { a = [ 1 2 ]; b = \"s\"; })"
        => "{ a = [ 1 2 ]; b = \"s\"; }",
}

#[test]
fn test_to_json_rejects_functions() {
    let err = eval_err("builtins.toJSON (x: x)");
    assert!(err.to_string().contains("cannot serialise"));
}

// ============================================================
// String contexts
// ============================================================

#[test]
fn test_get_context_shape() {
    let rendered = common::eval_rendered(
        "builtins.getContext (builtins.appendContext \"s\" { \"/spore/store/abc-x\" = { path = true; }; })",
    );
    assert_eq!(rendered, "{ \"/spore/store/abc-x\" = { path = true; }; }");
}

#[test]
fn test_append_context_outputs() {
    let rendered = common::eval_rendered(
        "builtins.getContext (builtins.appendContext \"s\" { \"/spore/store/abc-x.drv\" = { outputs = [ \"out\" \"dev\" ]; }; })",
    );
    assert_eq!(
        rendered,
        "{ \"/spore/store/abc-x.drv\" = { outputs = [ \"dev\" \"out\" ]; }; }"
    );
}

#[test]
fn test_discard_context() {
    assert!(!eval_bool(
        "builtins.hasContext (builtins.unsafeDiscardStringContext \"${/tmp/ctx-src}\")"
    ));
}

#[test]
fn test_context_survives_concat() {
    assert!(eval_bool("builtins.hasContext (\"a\" + \"${/tmp/ctx-src}\" + \"b\")"));
}

// ============================================================
// Constants
// ============================================================

#[test]
fn test_constants() {
    assert!(eval_int("builtins.langVersion") >= 1);
    assert!(!eval_string("builtins.currentSystem").is_empty());
    assert_eq!(eval_string("builtins.storeDir"), "/spore/store");
    assert!(eval_bool("builtins ? tryEval"));
}
