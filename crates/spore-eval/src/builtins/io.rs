use std::path::PathBuf;

use spore_core::bindings::BindingsBuilder;
use spore_core::symbol::Symbol;
use spore_core::value::{ContextElem, StringContext, Value};
use spore_core::SporeError;

use crate::coerce::{coerce_to_string, CoerceOpts};
use crate::force::{force, force_string};
use crate::imports;

use super::Registry;

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "import",
        1,
        Some("Load, parse, and evaluate a module file; results are memoised per path."),
        |ctx, pos, args| {
            let target = imports::import_target(ctx, &args[0], pos)?;
            imports::import_file(ctx, &target, pos)
        },
    );

    reg.add_primop("__pathExists", 1, None, |ctx, pos, args| {
        let forced = force(ctx, &args[0], pos)?;
        let mut context = StringContext::new();
        let path = crate::coerce::coerce_to_path(ctx, pos, &forced, &mut context)?;
        match ctx.sandbox.check_source_path(&path, pos) {
            Ok(resolved) => Ok(Value::Bool(resolved.exists())),
            Err(e) => Err(e),
        }
    });

    reg.add_primop(
        "__readFile",
        1,
        Some("The contents of a file, as a string."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let path = crate::coerce::coerce_to_path(ctx, pos, &args[0], &mut context)?;
            let resolved = ctx.sandbox.check_source_path(&path, pos)?;
            let text = std::fs::read_to_string(&resolved).map_err(|e| {
                SporeError::io(format!("cannot read '{}': {e}", resolved.display()), pos)
            })?;
            Ok(Value::string(text))
        },
    );

    reg.add_primop(
        "__readDir",
        1,
        Some("Directory entries as { name = \"regular\" | \"directory\" | \"symlink\" | \"unknown\"; }."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let path = crate::coerce::coerce_to_path(ctx, pos, &args[0], &mut context)?;
            let resolved = ctx.sandbox.check_source_path(&path, pos)?;
            let entries = std::fs::read_dir(&resolved).map_err(|e| {
                SporeError::io(format!("cannot read '{}': {e}", resolved.display()), pos)
            })?;
            let mut named: Vec<(String, &'static str)> = Vec::new();
            for entry in entries {
                ctx.check_interrupt()?;
                let entry = entry.map_err(|e| {
                    SporeError::io(format!("cannot read '{}': {e}", resolved.display()), pos)
                })?;
                let kind = match entry.file_type() {
                    Ok(t) if t.is_symlink() => "symlink",
                    Ok(t) if t.is_dir() => "directory",
                    Ok(t) if t.is_file() => "regular",
                    _ => "unknown",
                };
                named.push((entry.file_name().to_string_lossy().into_owned(), kind));
            }
            let mut builder = BindingsBuilder::new(named.len());
            for (name, kind) in named {
                builder.insert(Symbol::intern(&name), Value::string(kind), pos);
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "baseNameOf",
        1,
        Some("The final component of a path or path-like string."),
        |ctx, pos, args| {
            let forced = force(ctx, &args[0], pos)?;
            let mut context = StringContext::new();
            let text = coerce_to_string(
                ctx,
                pos,
                &forced,
                &mut context,
                CoerceOpts {
                    coerce_more: false,
                    copy_to_store: false,
                },
            )?;
            let trimmed = text.trim_end_matches('/');
            let base = match trimmed.rfind('/') {
                Some(i) => &trimmed[i + 1..],
                None => trimmed,
            };
            Ok(Value::string_with_context(base.to_string(), context))
        },
    );

    reg.add_primop(
        "dirOf",
        1,
        Some("Everything but the final path component; a path for path arguments."),
        |ctx, pos, args| {
            let forced = force(ctx, &args[0], pos)?;
            if let Value::Path(p) = &forced {
                let parent = p.parent().unwrap_or(p).to_path_buf();
                return Ok(Value::path(parent));
            }
            let mut context = StringContext::new();
            let text = coerce_to_string(
                ctx,
                pos,
                &forced,
                &mut context,
                CoerceOpts {
                    coerce_more: false,
                    copy_to_store: false,
                },
            )?;
            let dir = match text.rfind('/') {
                Some(0) => "/",
                Some(i) => &text[..i],
                None => ".",
            };
            Ok(Value::string_with_context(dir.to_string(), context))
        },
    );

    reg.add_primop(
        "__getEnv",
        1,
        Some("An environment variable, or \"\" when unset or in pure mode."),
        |ctx, pos, args| {
            let name = force_string(ctx, &args[0], pos, "while evaluating the argument of 'getEnv'")?;
            if ctx.config.pure_eval {
                return Ok(Value::string(""));
            }
            Ok(Value::string(
                std::env::var(&name.text).unwrap_or_default(),
            ))
        },
    );

    reg.add_primop(
        "__findFile",
        1,
        Some("Resolve a module reference through the search path."),
        |ctx, pos, args| {
            let query = force_string(ctx, &args[0], pos, "while evaluating the argument of 'findFile'")?;
            let found = crate::search_path::find_file(ctx, &query.text, pos)?;
            Ok(Value::path(found))
        },
    );

    reg.add_primop(
        "__storePath",
        1,
        Some("Mark an existing store path as a dependency of the result string."),
        |ctx, pos, args| {
            if ctx.config.pure_eval {
                return Err(SporeError::eval(
                    "'storePath' is not allowed in pure evaluation mode",
                    pos,
                ));
            }
            let mut context = StringContext::new();
            let path = crate::coerce::coerce_to_path(ctx, pos, &args[0], &mut context)?;
            let store_path = ctx
                .store
                .parse_store_path(&path.display().to_string())
                .map_err(|_| SporeError::InvalidPath {
                    path: path.display().to_string(),
                    pos,
                })?;
            let rendered = ctx.store.print_store_path(&store_path);
            let mut out_context = StringContext::new();
            out_context.insert(ContextElem::Opaque(rendered.clone()));
            Ok(Value::string_with_context(rendered, out_context))
        },
    );

    reg.add_primop(
        "fetchTarball",
        1,
        Some("Download and unpack a tarball, returning the resulting path."),
        |ctx, pos, args| {
            let forced = force(ctx, &args[0], pos)?;
            let url = match &forced {
                Value::Attrs(attrs) => {
                    let url_attr = attrs.get(Symbol::intern("url")).ok_or_else(|| {
                        SporeError::AttributeMissing {
                            name: "url".to_string(),
                            suggestions: Vec::new(),
                            pos,
                        }
                    })?;
                    force_string(ctx, &url_attr.value, pos, "while evaluating the 'url' attribute")?
                        .text
                        .clone()
                }
                _ => {
                    force_string(ctx, &forced, pos, "while evaluating the argument of 'fetchTarball'")?
                        .text
                        .clone()
                }
            };
            ctx.sandbox.check_uri(&url, pos)?;
            let fetcher = ctx.fetcher.as_ref().ok_or_else(|| {
                SporeError::eval("fetching is not supported by this evaluator", pos)
            })?;
            let path: PathBuf = fetcher
                .download_tarball(&url)
                .map_err(|e| e.add_trace(pos, format!("while fetching '{url}'")))?;
            Ok(Value::path(path))
        },
    );
}
