mod common;

use std::fs;
use std::rc::Rc;

use spore_core::{ErrorKind, EvalConfig, SearchPathEntry, SimpleStore, Value};
use spore_eval::Evaluator;

fn write_module(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_import_file() {
    let dir = tempfile::tempdir().unwrap();
    let module = write_module(dir.path(), "answer.spore", "20 + 22");
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str(&format!("import {}", module.display()))
        .unwrap();
    assert_eq!(v.as_int(), Some(42));
}

#[test]
fn test_import_directory_uses_default_module() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "default.spore", "{ ok = true; }");
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str(&format!("(import {}).ok", dir.path().display()))
        .unwrap();
    assert_eq!(v.as_bool(), Some(true));
}

#[test]
fn test_import_is_memoised() {
    let dir = tempfile::tempdir().unwrap();
    let module = write_module(dir.path(), "mod.spore", "{ marker = 1; }");
    let evaluator = Evaluator::new();
    let expr = format!("import {}", module.display());
    let first = evaluator.eval_str(&expr).unwrap();
    // Rewrite the file: the cache must keep serving the first parse.
    fs::write(&module, "{ marker = 2; }").unwrap();
    let second = evaluator.eval_str(&expr).unwrap();
    let (Value::Attrs(a), Value::Attrs(b)) = (&first, &second) else {
        panic!("expected attrs");
    };
    assert!(Rc::ptr_eq(a, b), "second import should be the cached value");
}

#[test]
fn test_imported_file_sees_builtins_and_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "lib.spore", "{ double = x: x * 2; }");
    write_module(
        dir.path(),
        "main.spore",
        "(import ./lib.spore).double (builtins.length [ 1 2 3 ])",
    );
    let evaluator = Evaluator::new();
    let v = evaluator.eval_file(&dir.path().join("main.spore")).unwrap();
    assert_eq!(v.as_int(), Some(6));
}

#[test]
fn test_import_position_in_curpos() {
    let dir = tempfile::tempdir().unwrap();
    let module = write_module(dir.path(), "pos.spore", "(__curPos).line");
    let evaluator = Evaluator::new();
    let v = evaluator.eval_file(&module).unwrap();
    assert_eq!(v.as_int(), Some(1));
}

#[test]
fn test_restricted_import_outside_allowed_fails() {
    let allowed = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let module = write_module(outside.path(), "m.spore", "1");
    let config = EvalConfig {
        restrict_eval: true,
        allowed_paths: vec![allowed.path().to_path_buf()],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let err = evaluator
        .eval_str(&format!("import {}", module.display()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RestrictedPath);
}

#[test]
fn test_restricted_import_inside_allowed_succeeds() {
    let allowed = tempfile::tempdir().unwrap();
    let module = write_module(allowed.path(), "m.spore", "5");
    let config = EvalConfig {
        restrict_eval: true,
        allowed_paths: vec![allowed.path().to_path_buf()],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let v = evaluator
        .eval_str(&format!("import {}", module.display()))
        .unwrap();
    assert_eq!(v.as_int(), Some(5));
}

#[test]
fn test_search_path_resolution() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "mod.spore", "\"found\"");
    let config = EvalConfig {
        search_path: vec![SearchPathEntry {
            prefix: "lib".to_string(),
            value: dir.path().display().to_string(),
        }],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let v = evaluator.eval_str("import <lib/mod.spore>").unwrap();
    match v {
        Value::String(s) => assert_eq!(s.text, "found"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn test_search_path_longest_prefix_wins() {
    let generic = tempfile::tempdir().unwrap();
    let specific = tempfile::tempdir().unwrap();
    write_module(generic.path(), "x.spore", "\"generic\"");
    fs::create_dir_all(specific.path().join("sub")).unwrap();
    write_module(&specific.path().join("sub"), "x.spore", "\"specific\"");
    let config = EvalConfig {
        search_path: vec![
            SearchPathEntry {
                prefix: String::new(),
                value: generic.path().display().to_string(),
            },
            SearchPathEntry {
                prefix: "lib".to_string(),
                value: specific.path().join("sub").display().to_string(),
            },
        ],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    // `lib/x.spore` matches both the empty prefix (as a subdirectory that
    // does not exist) and the `lib` prefix; the longer prefix is tried
    // first and resolves.
    let v = evaluator.eval_str("import <lib/x.spore>").unwrap();
    match v {
        Value::String(s) => assert_eq!(s.text, "specific"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn test_search_path_miss_is_catchable() {
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str("(builtins.tryEval <nothing/here>).success")
        .unwrap();
    assert_eq!(v.as_bool(), Some(false));
}

#[test]
fn test_find_file_builtin() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "f.spore", "1");
    let config = EvalConfig {
        search_path: vec![SearchPathEntry {
            prefix: String::new(),
            value: dir.path().display().to_string(),
        }],
        ..EvalConfig::default()
    };
    let evaluator = Evaluator::with_config(config);
    let v = evaluator
        .eval_str("builtins.typeOf (builtins.findFile \"f.spore\")")
        .unwrap();
    match v {
        Value::String(s) => assert_eq!(s.text, "path"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn test_read_file_and_path_exists() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_module(dir.path(), "data.txt", "payload");
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str(&format!("builtins.readFile {}", file.display()))
        .unwrap();
    match v {
        Value::String(s) => assert_eq!(s.text, "payload"),
        other => panic!("expected string, got {other:?}"),
    }
    let exists = evaluator
        .eval_str(&format!("builtins.pathExists {}", file.display()))
        .unwrap();
    assert_eq!(exists.as_bool(), Some(true));
    let missing = evaluator
        .eval_str(&format!("builtins.pathExists {}/nope", dir.path().display()))
        .unwrap();
    assert_eq!(missing.as_bool(), Some(false));
}

#[test]
fn test_read_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "a.txt", "");
    fs::create_dir(dir.path().join("sub")).unwrap();
    let evaluator = Evaluator::new();
    let v = evaluator
        .eval_str(&format!("builtins.readDir {}", dir.path().display()))
        .unwrap();
    let rendered = evaluator
        .print_value(&v, spore_eval::PrintOptions::default())
        .unwrap();
    assert_eq!(rendered, "{ \"a.txt\" = \"regular\"; sub = \"directory\"; }");
}

#[test]
fn test_store_backed_coercion_is_deterministic() {
    let evaluator = Evaluator::with_parts(
        EvalConfig::default(),
        Rc::new(SimpleStore::default()),
        None,
    );
    let a = evaluator.eval_str("\"${/tmp/fixed-source}\"").unwrap();
    let b = evaluator.eval_str("\"${/tmp/fixed-source}\"").unwrap();
    let (Value::String(a), Value::String(b)) = (&a, &b) else {
        panic!("expected strings");
    };
    assert_eq!(a.text, b.text);
    assert_eq!(a.context, b.context);
}

#[test]
fn test_fetch_tarball_without_fetcher_fails() {
    let evaluator = Evaluator::new();
    let err = evaluator
        .eval_str("fetchTarball \"https://example.com/x.tar.gz\"")
        .unwrap_err();
    assert!(err.to_string().contains("not supported"));
}
