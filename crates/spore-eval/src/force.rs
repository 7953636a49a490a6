use std::rc::Rc;

use spore_core::bindings::Bindings;
use spore_core::context::EvalContext;
use spore_core::error::{EvalResult, SporeError};
use spore_core::pos::PosIdx;
use spore_core::value::{StringValue, Thunk, ThunkState, Value};

use crate::eval::eval;

// ── The forcing engine ────────────────────────────────────────────
//
// The central state machine: Suspended|App ──▶ Blackhole ──▶ Forced.
// Observing a Blackhole mid-force is infinite recursion; a failed force
// parks its error so every later force re-raises the same kind at the
// same position.

/// Drive `v` to weak-head normal form.
pub fn force(ctx: &EvalContext, v: &Value, pos: PosIdx) -> EvalResult {
    match v {
        Value::Thunk(thunk) => force_thunk(ctx, thunk, pos),
        other => Ok(other.clone()),
    }
}

fn force_thunk(ctx: &EvalContext, thunk: &Thunk, pos: PosIdx) -> EvalResult {
    {
        let state = thunk.state();
        match &*state {
            ThunkState::Forced(v) => return Ok(v.clone()),
            ThunkState::Failed(e) => return Err((**e).clone()),
            ThunkState::Blackhole => {
                return Err(SporeError::InfiniteRecursion { pos });
            }
            ThunkState::Suspended { .. } | ThunkState::App { .. } => {}
        }
    }

    let prev = thunk.replace_state(ThunkState::Blackhole);
    let result = match prev {
        ThunkState::Suspended { env, expr } => eval(ctx, &expr, &env),
        ThunkState::App { func, arg } => crate::apply::apply(ctx, func, &[arg], pos),
        // Unreachable: the states above returned early.
        other => {
            thunk.replace_state(other);
            return Err(SporeError::eval("thunk in impossible state", pos));
        }
    };

    match result {
        Ok(value) => {
            // A suspended variable may hand back another thunk; chase it
            // so Forced never holds a thunk.
            let value = match value {
                Value::Thunk(inner) => force_thunk(ctx, &inner, pos)?,
                other => other,
            };
            thunk.replace_state(ThunkState::Forced(value.clone()));
            Ok(value)
        }
        Err(e) => {
            thunk.replace_state(ThunkState::Failed(Rc::new(e.clone())));
            Err(e)
        }
    }
}

/// Force a value and every attribute and list element beneath it, once.
/// An identity set keeps shared subgraphs from being revisited; true
/// cycles still surface as infinite recursion through the blackhole.
pub fn force_deep(ctx: &EvalContext, v: &Value, pos: PosIdx) -> EvalResult {
    let mut seen = hashbrown::HashSet::new();
    force_deep_inner(ctx, v, pos, &mut seen)
}

fn force_deep_inner(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    seen: &mut hashbrown::HashSet<usize>,
) -> EvalResult {
    ctx.check_interrupt()?;
    let forced = force(ctx, v, pos)?;
    if let Some(addr) = forced.addr() {
        if !seen.insert(addr) {
            return Ok(forced);
        }
    }
    match &forced {
        Value::Attrs(attrs) => {
            for attr in attrs.iter() {
                force_deep_inner(ctx, &attr.value, attr.pos.or(pos), seen).map_err(|e| {
                    e.add_trace(
                        attr.pos,
                        format!("while evaluating the attribute '{}'", attr.name),
                    )
                })?;
            }
        }
        Value::List(items) => {
            for item in items.iter() {
                force_deep_inner(ctx, item, pos, seen)?;
            }
        }
        _ => {}
    }
    Ok(forced)
}

// ── Typed coercers ────────────────────────────────────────────────

fn type_error(expected: &str, found: &Value, pos: PosIdx, err_ctx: &str) -> SporeError {
    let err = SporeError::ty(expected, found.show_type(), pos);
    if err_ctx.is_empty() {
        err
    } else {
        err.add_trace(pos, err_ctx)
    }
}

pub fn force_int(ctx: &EvalContext, v: &Value, pos: PosIdx, err_ctx: &str) -> Result<i64, SporeError> {
    match force(ctx, v, pos)? {
        Value::Int(n) => Ok(n),
        other => Err(type_error("an integer", &other, pos, err_ctx)),
    }
}

/// Accepts an integer and promotes it, like the arithmetic primops do.
pub fn force_float(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<f64, SporeError> {
    match force(ctx, v, pos)? {
        Value::Float(f) => Ok(f),
        Value::Int(n) => Ok(n as f64),
        other => Err(type_error("a float", &other, pos, err_ctx)),
    }
}

pub fn force_bool(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<bool, SporeError> {
    match force(ctx, v, pos)? {
        Value::Bool(b) => Ok(b),
        other => Err(type_error("a Boolean", &other, pos, err_ctx)),
    }
}

pub fn force_attrs(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<Rc<Bindings>, SporeError> {
    match force(ctx, v, pos)? {
        Value::Attrs(attrs) => Ok(attrs),
        other => Err(type_error("a set", &other, pos, err_ctx)),
    }
}

pub fn force_list(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<Rc<Vec<Value>>, SporeError> {
    match force(ctx, v, pos)? {
        Value::List(items) => Ok(items),
        other => Err(type_error("a list", &other, pos, err_ctx)),
    }
}

pub fn force_string(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<Rc<StringValue>, SporeError> {
    match force(ctx, v, pos)? {
        Value::String(s) => Ok(s),
        other => Err(type_error("a string", &other, pos, err_ctx)),
    }
}

/// Like `force_string`, but the string must carry no store references.
pub fn force_string_no_ctx(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<Rc<StringValue>, SporeError> {
    let s = force_string(ctx, v, pos, err_ctx)?;
    if s.context.is_empty() {
        Ok(s)
    } else {
        let err = SporeError::eval(
            format!(
                "the string '{}' is not allowed to refer to a store path",
                s.text
            ),
            pos,
        );
        Err(if err_ctx.is_empty() {
            err
        } else {
            err.add_trace(pos, err_ctx)
        })
    }
}

/// Force to something callable: a function value, or an attribute set
/// with a `__functor` member.
pub fn force_function(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    err_ctx: &str,
) -> Result<Value, SporeError> {
    let forced = force(ctx, v, pos)?;
    match &forced {
        Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp(_) => Ok(forced),
        Value::Attrs(attrs) if attrs.contains(crate::eval::sym_functor()) => Ok(forced),
        other => Err(type_error("a function", other, pos, err_ctx)),
    }
}
