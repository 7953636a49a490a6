use std::path::{Path, PathBuf};
use std::rc::Rc;

use spore_core::ast::{Expr, ExprRef};
use spore_core::context::EvalContext;
use spore_core::error::{EvalResult, SporeError};
use spore_core::pos::{Origin, PosIdx};
use spore_core::value::Value;
use spore_core::DEFAULT_MODULE_FILE;

use spore_parse::resolve::{bind_vars, StaticScope};

// ── File imports and the file caches ──────────────────────────────

/// The static scope of the sealed root environment, rebuilt on demand
/// from the recorded slot names.
pub fn root_scope(ctx: &EvalContext) -> Rc<StaticScope> {
    StaticScope::root(&ctx.root_names.borrow())
}

/// Parse a source string and resolve its variables against the root
/// environment.
pub fn parse_bound(
    ctx: &EvalContext,
    source: &str,
    origin: Origin,
    base_path: &Path,
) -> Result<ExprRef, SporeError> {
    let expr = spore_parse::parse_string(source, origin, base_path)?;
    bind_vars(&expr, &root_scope(ctx))?;
    Ok(expr)
}

/// Import a module file: sandbox check, directory default, both caches,
/// then evaluation against the root environment.
pub fn import_file(ctx: &EvalContext, path: &Path, pos: PosIdx) -> EvalResult {
    import_module_file(ctx, path, pos, false)
}

/// Like [`import_file`]; `require_attrs` additionally insists the file's
/// top level is an attribute-set literal.
pub fn import_module_file(
    ctx: &EvalContext,
    path: &Path,
    pos: PosIdx,
    require_attrs: bool,
) -> EvalResult {
    ctx.check_interrupt()?;
    let original = path.to_path_buf();
    let mut target = ctx.sandbox.check_source_path(path, pos)?;
    if target.is_dir() {
        target = target.join(DEFAULT_MODULE_FILE);
    }

    if let Some(cached) = ctx.eval_cache.borrow().get(&target) {
        tracing::debug!(target: "spore::imports", "eval cache hit for '{}'", target.display());
        return Ok(cached.clone());
    }

    let expr = {
        let cached = ctx.parse_cache.borrow().get(&target).cloned();
        match cached {
            Some(expr) => expr,
            None => {
                let expr = spore_parse::parse_file(&target)?;
                bind_vars(&expr, &root_scope(ctx))?;
                ctx.parse_cache
                    .borrow_mut()
                    .insert(target.clone(), expr.clone());
                expr
            }
        }
    };

    if require_attrs && !matches!(&*expr, Expr::Attrs(_)) {
        return Err(SporeError::eval(
            format!(
                "file '{}' must be an attribute set literal",
                target.display()
            ),
            pos,
        ));
    }

    let _trace = ctx.push_trace(pos, format!("while importing '{}'", target.display()));
    let value = crate::eval::eval(ctx, &expr, &ctx.root_env())
        .map_err(|e| e.add_trace(pos, format!("while importing '{}'", target.display())))?;

    ctx.eval_cache
        .borrow_mut()
        .insert(target.clone(), value.clone());
    if original != target {
        ctx.eval_cache.borrow_mut().insert(original, value.clone());
    }
    Ok(value)
}

/// Resolve an import target the way the `import` builtin accepts it:
/// path values as-is, absolute strings, or derivation-like sets.
pub fn import_target(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
) -> Result<PathBuf, SporeError> {
    let mut context = spore_core::value::StringContext::new();
    crate::coerce::coerce_to_path(ctx, pos, v, &mut context)
}
