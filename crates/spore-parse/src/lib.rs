//! Lexer, parser, and static variable resolution for the spore language.
//!
//! The parser produces `spore_core::ast` trees whose variable references
//! are pre-resolved into (level, displacement) pairs by [`resolve::bind_vars`];
//! the evaluator performs no name lookup beyond `with` scopes.

pub mod lexer;
pub mod parser;
pub mod resolve;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use spore_core::ast::ExprRef;
use spore_core::error::SporeError;
use spore_core::pos::{register_origin, Origin};

pub use resolve::{bind_vars, StaticScope};

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Parse a source string. `base_path` anchors relative path literals.
pub fn parse_string(source: &str, origin: Origin, base_path: &Path) -> Result<ExprRef, SporeError> {
    let origin_id = register_origin(origin);
    let tokens = lexer::tokenize(source, origin_id)?;
    let mut parser = parser::Parser::new(
        tokens,
        origin_id,
        base_path.to_path_buf(),
        home_dir(),
    );
    parser.parse_toplevel()
}

/// Parse a file; relative path literals resolve against its directory.
pub fn parse_file(path: &Path) -> Result<ExprRef, SporeError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        SporeError::io(
            format!("cannot read '{}': {e}", path.display()),
            spore_core::pos::NO_POS,
        )
    })?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    parse_string(
        &source,
        Origin::File(Rc::new(path.to_path_buf())),
        &base,
    )
}

/// Parse standard input against the current directory.
pub fn parse_stdin() -> Result<ExprRef, SporeError> {
    use std::io::Read;
    let mut source = String::new();
    std::io::stdin()
        .read_to_string(&mut source)
        .map_err(|e| SporeError::io(format!("cannot read stdin: {e}"), spore_core::pos::NO_POS))?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    parse_string(&source, Origin::Stdin, &cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spore_core::ast::{AttrName, BinOp, Expr, PathAnchor, StrPart};
    use spore_core::symbol::Symbol;

    fn parse(src: &str) -> ExprRef {
        parse_string(src, Origin::Text, Path::new("/base"))
            .unwrap_or_else(|e| panic!("parse failed for `{src}`: {e}"))
    }

    fn parse_err(src: &str) -> SporeError {
        parse_string(src, Origin::Text, Path::new("/base"))
            .err()
            .unwrap_or_else(|| panic!("expected parse error for `{src}`"))
    }

    #[test]
    fn test_literals() {
        assert!(matches!(&*parse("42"), Expr::Int { n: 42, .. }));
        assert!(matches!(&*parse("4.25"), Expr::Float { f, .. } if *f == 4.25));
        assert!(matches!(&*parse(r#""hi""#), Expr::Str { .. }));
    }

    #[test]
    fn test_lambda_forms() {
        match &*parse("x: x") {
            Expr::Lambda(l) => {
                assert_eq!(l.arg, Some(Symbol::intern("x")));
                assert!(l.formals.is_none());
                assert_eq!(l.env_size(), 1);
            }
            other => panic!("expected lambda, got {other:?}"),
        }
        match &*parse("{ a, b ? 1, ... }: a") {
            Expr::Lambda(l) => {
                let formals = l.formals.as_ref().unwrap();
                assert_eq!(formals.formals.len(), 2);
                assert!(formals.ellipsis);
                assert!(formals.formals[1].default.is_some());
            }
            other => panic!("expected lambda, got {other:?}"),
        }
        match &*parse("args@{ a }: a") {
            Expr::Lambda(l) => {
                assert_eq!(l.arg, Some(Symbol::intern("args")));
                assert_eq!(l.env_size(), 2);
            }
            other => panic!("expected lambda, got {other:?}"),
        }
        match &*parse("{ a }@args: a") {
            Expr::Lambda(l) => assert_eq!(l.arg, Some(Symbol::intern("args"))),
            other => panic!("expected lambda, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_formal_rejected() {
        let err = parse_err("{ a, a }: a");
        assert!(err.to_string().contains("duplicate formal"));
    }

    #[test]
    fn test_empty_braces_are_attrset_unless_lambda() {
        assert!(matches!(&*parse("{}"), Expr::Attrs(a) if a.attrs.is_empty()));
        assert!(matches!(&*parse("{}: 1"), Expr::Lambda(_)));
    }

    #[test]
    fn test_application_is_n_ary() {
        match &*parse("f x y") {
            Expr::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_list_elements_do_not_apply() {
        match &*parse("[ f x ]") {
            Expr::List { items, .. } => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_select_with_default() {
        match &*parse("a.b.c or 3") {
            Expr::Select {
                path, or_default, ..
            } => {
                assert_eq!(path.len(), 2);
                assert!(or_default.is_some());
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_has_attr() {
        match &*parse("a ? b.c") {
            Expr::HasAttr { path, .. } => assert_eq!(path.len(), 2),
            other => panic!("expected has-attr, got {other:?}"),
        }
    }

    #[test]
    fn test_operator_precedence() {
        // `1 + 2 * 3` — mul binds tighter than the + chain.
        match &*parse("1 + 2 * 3") {
            Expr::ConcatStrings { parts, .. } => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&*parts[1].1, Expr::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("expected concat chain, got {other:?}"),
        }
        // `a // b // c` — update is right-associative.
        match &*parse("a // b // c") {
            Expr::BinOp {
                op: BinOp::Update,
                rhs,
                ..
            } => assert!(matches!(&**rhs, Expr::BinOp { op: BinOp::Update, .. })),
            other => panic!("expected update, got {other:?}"),
        }
        // `!a && b` — not binds tighter than &&.
        match &*parse("!a && b") {
            Expr::BinOp { op: BinOp::And, lhs, .. } => {
                assert!(matches!(&**lhs, Expr::Not { .. }))
            }
            other => panic!("expected and, got {other:?}"),
        }
        // `a ++ b ++ c` — concat is right-associative and tighter than *.
        match &*parse("a ++ b ++ c") {
            Expr::BinOp {
                op: BinOp::ListConcat,
                rhs,
                ..
            } => assert!(matches!(
                &**rhs,
                Expr::BinOp {
                    op: BinOp::ListConcat,
                    ..
                }
            )),
            other => panic!("expected concat, got {other:?}"),
        }
    }

    #[test]
    fn test_attrpath_merging() {
        match &*parse("{ a.b = 1; a.c = 2; }") {
            Expr::Attrs(attrs) => {
                assert_eq!(attrs.attrs.len(), 1);
                match &*attrs.attrs[0].value {
                    Expr::Attrs(nested) => {
                        assert_eq!(nested.attrs.len(), 2);
                        assert!(!nested.recursive);
                    }
                    other => panic!("expected nested attrs, got {other:?}"),
                }
            }
            other => panic!("expected attrs, got {other:?}"),
        }
    }

    #[test]
    fn test_attrpath_conflicts_rejected() {
        assert!(parse_err("{ a = 1; a = 2; }")
            .to_string()
            .contains("already defined"));
        assert!(parse_err("{ a = 1; a.b = 2; }")
            .to_string()
            .contains("already defined"));
    }

    #[test]
    fn test_inherit_forms() {
        match &*parse("{ inherit a; inherit (s) b c; }") {
            Expr::Attrs(attrs) => {
                assert_eq!(attrs.attrs.len(), 3);
                assert!(attrs.attrs[0].inherited);
                assert!(!attrs.attrs[1].inherited);
                assert!(matches!(&*attrs.attrs[1].value, Expr::Select { .. }));
            }
            other => panic!("expected attrs, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_attrs() {
        match &*parse(r#"{ ${k} = 1; "x${y}" = 2; }"#) {
            Expr::Attrs(attrs) => {
                assert!(attrs.attrs.is_empty());
                assert_eq!(attrs.dynamic.len(), 2);
            }
            other => panic!("expected attrs, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_attrs_rejected_in_let() {
        assert!(parse_err("let ${a} = 1; in 2")
            .to_string()
            .contains("dynamic attributes"));
    }

    #[test]
    fn test_string_attr_keys() {
        match &*parse(r#"{ "quoted key" = 1; }"#) {
            Expr::Attrs(attrs) => {
                assert_eq!(attrs.attrs[0].name, Symbol::intern("quoted key"));
            }
            other => panic!("expected attrs, got {other:?}"),
        }
    }

    #[test]
    fn test_rec_attrset() {
        assert!(matches!(&*parse("rec { a = 1; }"), Expr::Attrs(a) if a.recursive));
    }

    #[test]
    fn test_path_anchoring() {
        match &*parse("./foo/bar") {
            Expr::Path { anchor, base, .. } => {
                assert_eq!(*anchor, PathAnchor::Relative);
                assert_eq!(base, &PathBuf::from("/base/./foo/bar"));
            }
            other => panic!("expected path, got {other:?}"),
        }
        match &*parse("/abs/path") {
            Expr::Path { anchor, .. } => assert_eq!(*anchor, PathAnchor::Absolute),
            other => panic!("expected path, got {other:?}"),
        }
        match &*parse("<lib/mod>") {
            Expr::Path { anchor, base, .. } => {
                assert_eq!(*anchor, PathAnchor::Search);
                assert_eq!(base, &PathBuf::from("lib/mod"));
            }
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_string_interpolation_parses_inner_expr() {
        match &*parse(r#""x${toString 3}y""#) {
            Expr::Str { parts, .. } => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[1], StrPart::Interp(e) if matches!(&**e, Expr::Call { .. })));
            }
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_if_and_friends() {
        assert!(matches!(&*parse("if a then 1 else 2"), Expr::If { .. }));
        assert!(matches!(&*parse("assert a; 1"), Expr::Assert { .. }));
        assert!(matches!(&*parse("with a; b"), Expr::With { .. }));
        assert!(matches!(&*parse("let x = 1; in x"), Expr::Let { .. }));
    }

    #[test]
    fn test_curpos() {
        assert!(matches!(&*parse("__curPos"), Expr::CurPos { .. }));
    }

    #[test]
    fn test_lambda_gets_named_from_binding() {
        match &*parse("{ f = x: x; }") {
            Expr::Attrs(attrs) => match &*attrs.attrs[0].value {
                Expr::Lambda(l) => assert_eq!(l.name.get(), Some(Symbol::intern("f"))),
                other => panic!("expected lambda, got {other:?}"),
            },
            other => panic!("expected attrs, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_err("1 ;").to_string().contains("unexpected"));
    }

    #[test]
    fn test_select_or_in_attr_path_position() {
        // `or` is a valid attribute name.
        match &*parse("a.or") {
            Expr::Select { path, .. } => match &path[0] {
                AttrName::Static(sym) => assert_eq!(*sym, Symbol::intern("or")),
                other => panic!("expected static name, got {other:?}"),
            },
            other => panic!("expected select, got {other:?}"),
        }
    }

    mod resolve_tests {
        use super::*;
        use crate::resolve::{bind_vars, StaticScope};
        use spore_core::error::ErrorKind;

        fn root() -> Rc<StaticScope> {
            StaticScope::root(&[Symbol::intern("true"), Symbol::intern("builtins")])
        }

        fn bind(src: &str) -> Result<ExprRef, SporeError> {
            let expr = parse(src);
            bind_vars(&expr, &root())?;
            Ok(expr)
        }

        #[test]
        fn test_root_resolution() {
            let expr = bind("true").unwrap();
            match &*expr {
                Expr::Var(var) => {
                    assert_eq!(var.level.get(), 0);
                    assert_eq!(var.displ.get(), 0);
                    assert!(!var.from_with.get());
                }
                other => panic!("expected var, got {other:?}"),
            }
        }

        #[test]
        fn test_let_levels() {
            let expr = bind("let x = 1; in y: x").unwrap();
            // x inside the lambda body: one level up to the let frame.
            match &*expr {
                Expr::Let { body, .. } => match &**body {
                    Expr::Lambda(l) => match &*l.body {
                        Expr::Var(var) => {
                            assert_eq!(var.level.get(), 1);
                            assert_eq!(var.displ.get(), 0);
                        }
                        other => panic!("expected var, got {other:?}"),
                    },
                    other => panic!("expected lambda, got {other:?}"),
                },
                other => panic!("expected let, got {other:?}"),
            }
        }

        #[test]
        fn test_undefined_variable_is_static_error() {
            let err = bind("nosuchvariable").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
        }

        #[test]
        fn test_undefined_variable_suggestions() {
            let err = bind("bultins").unwrap_err();
            assert!(err.suggestions().contains(&"builtins".to_string()));
        }

        #[test]
        fn test_with_marks_from_with() {
            let expr = bind("with {}; pkgs").unwrap();
            match &*expr {
                Expr::With { body, .. } => match &**body {
                    Expr::Var(var) => assert!(var.from_with.get()),
                    other => panic!("expected var, got {other:?}"),
                },
                other => panic!("expected with, got {other:?}"),
            }
        }

        #[test]
        fn test_static_binding_wins_over_with() {
            let expr = bind("let a = 1; in with { a = 2; }; a").unwrap();
            fn find_final_var(e: &ExprRef) -> &spore_core::ast::ExprVar {
                match &**e {
                    Expr::Let { body, .. } => find_final_var(body),
                    Expr::With { body, .. } => find_final_var(body),
                    Expr::Var(var) => var,
                    other => panic!("expected var, got {other:?}"),
                }
            }
            let var = find_final_var(&expr);
            assert!(!var.from_with.get());
            // One level from inside the with frame to the let frame.
            assert_eq!(var.level.get(), 1);
        }

        #[test]
        fn test_rec_attrs_resolution() {
            let expr = bind("rec { a = 1; b = a; }").unwrap();
            match &*expr {
                Expr::Attrs(attrs) => match &*attrs.attrs[1].value {
                    Expr::Var(var) => {
                        assert_eq!(var.level.get(), 0);
                        assert_eq!(var.displ.get(), 0);
                    }
                    other => panic!("expected var, got {other:?}"),
                },
                other => panic!("expected attrs, got {other:?}"),
            }
        }

        #[test]
        fn test_inherited_value_skips_rec_frame() {
            // `inherit a` in a rec set refers to the *enclosing* a.
            let expr = bind("let a = 1; in rec { inherit a; }").unwrap();
            match &*expr {
                Expr::Let { body, .. } => match &**body {
                    Expr::Attrs(attrs) => match &*attrs.attrs[0].value {
                        Expr::Var(var) => {
                            // Resolved against the let frame, not the rec frame.
                            assert_eq!(var.level.get(), 0);
                        }
                        other => panic!("expected var, got {other:?}"),
                    },
                    other => panic!("expected attrs, got {other:?}"),
                },
                other => panic!("expected let, got {other:?}"),
            }
        }

        #[test]
        fn test_formal_defaults_see_other_formals() {
            let expr = bind("{ a ? b, b ? 1 }: a").unwrap();
            match &*expr {
                Expr::Lambda(l) => {
                    let formals = l.formals.as_ref().unwrap();
                    match &**formals.formals[0].default.as_ref().unwrap() {
                        Expr::Var(var) => {
                            assert_eq!(var.level.get(), 0);
                            assert_eq!(var.displ.get(), 1);
                        }
                        other => panic!("expected var, got {other:?}"),
                    }
                }
                other => panic!("expected lambda, got {other:?}"),
            }
        }
    }
}
