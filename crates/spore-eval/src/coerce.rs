use spore_core::context::EvalContext;
use spore_core::error::SporeError;
use spore_core::pos::PosIdx;
use spore_core::store::IngestMethod;
use spore_core::value::{ContextElem, StringContext, Value};

use crate::eval::{sym_out_path, sym_to_string};
use crate::force::force;

// ── Coercion to string ────────────────────────────────────────────

#[derive(Clone, Copy)]
pub struct CoerceOpts {
    /// Also coerce null, Booleans, numbers, and lists.
    pub coerce_more: bool,
    /// Ingest paths into the store and return the store path (with
    /// context) instead of the source path.
    pub copy_to_store: bool,
}

/// Render a value as a string, merging any store references it carries
/// into `context`.
pub fn coerce_to_string(
    ctx: &EvalContext,
    pos: PosIdx,
    v: &Value,
    context: &mut StringContext,
    opts: CoerceOpts,
) -> Result<String, SporeError> {
    let v = force(ctx, v, pos)?;
    match &v {
        Value::String(s) => {
            context.extend_from(&s.context);
            Ok(s.text.clone())
        }

        Value::Path(path) => {
            if opts.copy_to_store {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "source".to_string());
                let store_path = ctx
                    .store
                    .ingest_path(path, &name, IngestMethod::Recursive)
                    .map_err(|e| e.add_trace(pos, "while copying a path to the store"))?;
                let rendered = ctx.store.print_store_path(&store_path);
                context.insert(ContextElem::Opaque(rendered.clone()));
                Ok(rendered)
            } else {
                Ok(path.display().to_string())
            }
        }

        Value::Attrs(attrs) => {
            // A set coerces through its `__toString` functor, or
            // through its `outPath` attribute.
            if let Some(to_string) = attrs.get(sym_to_string()) {
                let rendered = crate::apply::apply(
                    ctx,
                    to_string.value.clone(),
                    &[v.clone()],
                    to_string.pos.or(pos),
                )?;
                return coerce_to_string(ctx, pos, &rendered, context, opts);
            }
            if let Some(out_path) = attrs.get(sym_out_path()) {
                return coerce_to_string(ctx, pos, &out_path.value, context, opts);
            }
            Err(SporeError::ty("a string", "a set", pos))
        }

        Value::External(ext) => ext.coerce_to_string(context).ok_or_else(|| {
            SporeError::eval(
                format!("cannot coerce {} to a string", ext.show_type()),
                pos,
            )
        }),

        Value::Null if opts.coerce_more => Ok(String::new()),
        Value::Bool(true) if opts.coerce_more => Ok("1".to_string()),
        Value::Bool(false) if opts.coerce_more => Ok(String::new()),
        Value::Int(n) if opts.coerce_more => Ok(n.to_string()),
        Value::Float(f) if opts.coerce_more => Ok(crate::print::fmt_float(*f)),
        Value::List(items) if opts.coerce_more => {
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&coerce_to_string(ctx, pos, item, context, opts)?);
            }
            Ok(out)
        }

        other => Err(SporeError::eval(
            format!("cannot coerce {} to a string", other.show_type()),
            pos,
        )),
    }
}

/// Coerce a value to a filesystem path: a path value, an absolute path
/// string, or a set with an `outPath`.
pub fn coerce_to_path(
    ctx: &EvalContext,
    pos: PosIdx,
    v: &Value,
    context: &mut StringContext,
) -> Result<std::path::PathBuf, SporeError> {
    let forced = force(ctx, v, pos)?;
    if let Value::Path(p) = &forced {
        return Ok(p.as_ref().clone());
    }
    let text = coerce_to_string(
        ctx,
        pos,
        &forced,
        context,
        CoerceOpts {
            coerce_more: false,
            copy_to_store: false,
        },
    )?;
    if !text.starts_with('/') {
        return Err(SporeError::eval(
            format!("string '{text}' does not represent an absolute path"),
            pos,
        ));
    }
    Ok(std::path::PathBuf::from(text))
}
