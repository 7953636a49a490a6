use std::cmp::Ordering;

use spore_core::context::EvalContext;
use spore_core::error::SporeError;
use spore_core::pos::PosIdx;
use spore_core::value::Value;

use crate::eval::{sym_derivation, sym_out_path, sym_type};
use crate::force::force;

// ── Structural equality ───────────────────────────────────────────

/// Deep structural equality after forcing both sides. Functions compare
/// equal only by identity; two derivations compare by their `outPath`.
pub fn eq_values(ctx: &EvalContext, a: &Value, b: &Value, pos: PosIdx) -> Result<bool, SporeError> {
    ctx.check_interrupt()?;
    let a = force(ctx, a, pos)?;
    let b = force(ctx, b, pos)?;

    // Identical payloads are equal without looking inside.
    if Value::ptr_eq(&a, &b) {
        return Ok(true);
    }

    // Ints and floats compare numerically across the type boundary.
    match (&a, &b) {
        (Value::Int(x), Value::Float(y)) => return Ok(*x as f64 == *y),
        (Value::Float(x), Value::Int(y)) => return Ok(*x == *y as f64),
        _ => {}
    }

    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Float(x), Value::Float(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Null, Value::Null) => Ok(true),
        // Context is ignored: equality is over the text alone.
        (Value::String(x), Value::String(y)) => Ok(x.text == y.text),
        (Value::Path(x), Value::Path(y)) => Ok(x == y),
        (Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys.iter()) {
                if !eq_values(ctx, x, y, pos)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Attrs(xs), Value::Attrs(ys)) => {
            // Two derivations are equal when their outPaths are.
            if is_derivation(ctx, &a, pos)? && is_derivation(ctx, &b, pos)? {
                if let (Some(x), Some(y)) = (xs.get(sym_out_path()), ys.get(sym_out_path())) {
                    return eq_values(ctx, &x.value, &y.value, pos);
                }
            }
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys.iter()) {
                if x.name != y.name || !eq_values(ctx, &x.value, &y.value, pos)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        // Functions are incomparable (identity was already handled).
        (Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp(_), _)
        | (_, Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp(_)) => Ok(false),
        (Value::External(x), Value::External(y)) => Ok(x.eq_external(y.as_ref())),
        (Value::Thunk(_), _) | (_, Value::Thunk(_)) => Err(SporeError::eval(
            "cannot compare a thunk (forcing failed to normalise a value)",
            pos,
        )),
        _ => Ok(false),
    }
}

/// Is this value an attribute set with `type = "derivation"`?
pub fn is_derivation(ctx: &EvalContext, v: &Value, pos: PosIdx) -> Result<bool, SporeError> {
    let Value::Attrs(attrs) = v else {
        return Ok(false);
    };
    let Some(type_attr) = attrs.get(sym_type()) else {
        return Ok(false);
    };
    match force(ctx, &type_attr.value, pos) {
        Ok(Value::String(s)) => Ok(sym_derivation().with_str(|d| s.text == d)),
        Ok(_) => Ok(false),
        // A failing `type` attribute is not an equality error.
        Err(_) => Ok(false),
    }
}

// ── Ordering ──────────────────────────────────────────────────────

/// Ordering for `<`, `<=`, `>`, `>=` and the `sort` builtin: numbers
/// (mixed int/float), strings, paths, and lists compared lexicographically.
pub fn compare_values(
    ctx: &EvalContext,
    a: &Value,
    b: &Value,
    pos: PosIdx,
) -> Result<Ordering, SporeError> {
    ctx.check_interrupt()?;
    let a = force(ctx, a, pos)?;
    let b = force(ctx, b, pos)?;
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => Ok(partial_cmp_floats(*x as f64, *y)),
        (Value::Float(x), Value::Int(y)) => Ok(partial_cmp_floats(*x, *y as f64)),
        (Value::Float(x), Value::Float(y)) => Ok(partial_cmp_floats(*x, *y)),
        (Value::String(x), Value::String(y)) => Ok(x.text.cmp(&y.text)),
        (Value::Path(x), Value::Path(y)) => Ok(x.as_os_str().cmp(y.as_os_str())),
        (Value::List(xs), Value::List(ys)) => {
            for (x, y) in xs.iter().zip(ys.iter()) {
                let ord = compare_values(ctx, x, y, pos)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(xs.len().cmp(&ys.len()))
        }
        _ => Err(SporeError::eval(
            format!("cannot compare {} with {}", a.show_type(), b.show_type()),
            pos,
        )),
    }
}

fn partial_cmp_floats(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or(Ordering::Greater)
}
