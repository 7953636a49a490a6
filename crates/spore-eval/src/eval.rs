use std::path::PathBuf;
use std::rc::Rc;

use spore_core::ast::{
    AttrName, AttrsExpr, BinOp, Expr, ExprRef, ExprVar, PathAnchor, StrPart,
};
use spore_core::bindings::{Attr, BindingsBuilder};
use spore_core::context::EvalContext;
use spore_core::env::{Env, EnvKind};
use spore_core::error::{best_matches, EvalResult, SporeError};
use spore_core::pos::{resolve_pos, Origin, PosIdx};
use spore_core::symbol::Symbol;
use spore_core::value::{StringContext, Value};

use crate::coerce::{coerce_to_string, CoerceOpts};
use crate::compare::{compare_values, eq_values};
use crate::force::{force, force_attrs, force_bool, force_string_no_ctx};

// ── Interned symbols used by the evaluator itself ─────────────────
//
// Dispatch on these names is hot; cache the interned keys once per
// thread instead of re-hashing the strings at every use.

struct KnownSyms {
    overrides: Symbol,
    functor: Symbol,
    out_path: Symbol,
    type_: Symbol,
    derivation: Symbol,
    to_string: Symbol,
    file: Symbol,
    line: Symbol,
    column: Symbol,
}

thread_local! {
    static SYMS: &'static KnownSyms = Box::leak(Box::new(KnownSyms {
        overrides: Symbol::intern("__overrides"),
        functor: Symbol::intern("__functor"),
        out_path: Symbol::intern("outPath"),
        type_: Symbol::intern("type"),
        derivation: Symbol::intern("derivation"),
        to_string: Symbol::intern("__toString"),
        file: Symbol::intern("file"),
        line: Symbol::intern("line"),
        column: Symbol::intern("column"),
    }));
}

pub(crate) fn sym_functor() -> Symbol {
    SYMS.with(|s| s.functor)
}

pub(crate) fn sym_out_path() -> Symbol {
    SYMS.with(|s| s.out_path)
}

pub(crate) fn sym_type() -> Symbol {
    SYMS.with(|s| s.type_)
}

pub(crate) fn sym_derivation() -> Symbol {
    SYMS.with(|s| s.derivation)
}

pub(crate) fn sym_to_string() -> Symbol {
    SYMS.with(|s| s.to_string)
}

fn sym_overrides() -> Symbol {
    SYMS.with(|s| s.overrides)
}

// ── Thunk construction ────────────────────────────────────────────

/// Build a value for a lazy position, eliding the thunk for expressions
/// that evaluate without failure or observable effect: literals and
/// already-resolved variables.
pub fn maybe_thunk(ctx: &EvalContext, expr: &ExprRef, env: &Env) -> Value {
    match &**expr {
        Expr::Int { n, .. } => {
            ctx.stats.thunks_avoided.set(ctx.stats.thunks_avoided.get() + 1);
            Value::Int(*n)
        }
        Expr::Float { f, .. } => {
            ctx.stats.thunks_avoided.set(ctx.stats.thunks_avoided.get() + 1);
            Value::Float(*f)
        }
        Expr::Str { parts, .. } => match parts.as_slice() {
            [StrPart::Lit(text)] => {
                ctx.stats.thunks_avoided.set(ctx.stats.thunks_avoided.get() + 1);
                Value::string(text.clone())
            }
            _ => new_thunk(ctx, expr, env),
        },
        Expr::Var(var) if !var.from_with.get() => {
            ctx.stats.thunks_avoided.set(ctx.stats.thunks_avoided.get() + 1);
            env.ancestor(var.level.get()).slot(var.displ.get())
        }
        _ => new_thunk(ctx, expr, env),
    }
}

/// Like `maybe_thunk`, but for slots of a binder that is still being
/// filled (`let`, `rec`, formal defaults): a sibling variable read here
/// would copy an unfilled slot, so only literals are elided.
pub fn maybe_thunk_rec(ctx: &EvalContext, expr: &ExprRef, env: &Env) -> Value {
    match &**expr {
        Expr::Int { .. } | Expr::Float { .. } => maybe_thunk(ctx, expr, env),
        Expr::Str { parts, .. } if matches!(parts.as_slice(), [StrPart::Lit(_)]) => {
            maybe_thunk(ctx, expr, env)
        }
        _ => new_thunk(ctx, expr, env),
    }
}

fn new_thunk(ctx: &EvalContext, expr: &ExprRef, env: &Env) -> Value {
    ctx.stats.thunks_created.set(ctx.stats.thunks_created.get() + 1);
    Value::thunk(env.clone(), expr.clone())
}

fn new_env(ctx: &EvalContext, up: Option<Env>, size: usize) -> Env {
    ctx.stats.envs_allocated.set(ctx.stats.envs_allocated.get() + 1);
    Env::new(up, size)
}

// ── The evaluator ─────────────────────────────────────────────────

/// Evaluate one expression to weak-head normal form. One rule per node
/// kind; laziness enters only through `maybe_thunk` positions.
pub fn eval(ctx: &EvalContext, expr: &ExprRef, env: &Env) -> EvalResult {
    match &**expr {
        Expr::Int { n, .. } => Ok(Value::Int(*n)),
        Expr::Float { f, .. } => Ok(Value::Float(*f)),

        Expr::Str { parts, pos } => eval_string_parts(ctx, parts, env, *pos),

        Expr::Path {
            anchor,
            base,
            parts,
            pos,
        } => eval_path(ctx, *anchor, base, parts, env, *pos),

        Expr::Var(var) => eval_var(ctx, var, env),

        Expr::Select {
            subject,
            path,
            or_default,
            pos,
        } => eval_select(ctx, subject, path, or_default.as_ref(), env, *pos),

        Expr::HasAttr { subject, path, pos } => eval_has_attr(ctx, subject, path, env, *pos),

        Expr::Attrs(attrs) => eval_attrs(ctx, attrs, env),

        Expr::List { items, pos: _ } => {
            if items.is_empty() {
                return Ok(empty_list());
            }
            let values = items.iter().map(|item| maybe_thunk(ctx, item, env)).collect();
            Ok(Value::list(values))
        }

        Expr::Lambda(lambda) => Ok(Value::Lambda(Rc::new(spore_core::value::Closure {
            lambda: Rc::clone(lambda),
            env: env.clone(),
        }))),

        Expr::Call { func, args, pos } => {
            let f = eval(ctx, func, env)?;
            let arg_values: Vec<Value> =
                args.iter().map(|arg| maybe_thunk(ctx, arg, env)).collect();
            crate::apply::apply(ctx, f, &arg_values, *pos)
        }

        Expr::Let { bindings, body, pos } => {
            let _trace = ctx
                .config
                .debug_mode
                .then(|| ctx.push_trace(*pos, "while evaluating a let"));
            let env2 = eval_binder_env(ctx, bindings, env);
            eval(ctx, body, &env2)
        }

        Expr::With {
            namespace,
            body,
            pos,
        } => {
            let _trace = ctx
                .config
                .debug_mode
                .then(|| ctx.push_trace(*pos, "while evaluating a with"));
            let ns = maybe_thunk(ctx, namespace, env);
            let env2 = Env::with_frame(env.clone(), ns);
            ctx.stats.envs_allocated.set(ctx.stats.envs_allocated.get() + 1);
            eval(ctx, body, &env2)
        }

        Expr::If {
            cond,
            then,
            otherwise,
            pos,
        } => {
            let c = eval(ctx, cond, env)?;
            if force_bool(ctx, &c, *pos, "while evaluating an if condition")? {
                eval(ctx, then, env)
            } else {
                eval(ctx, otherwise, env)
            }
        }

        Expr::Assert { cond, body, pos } => {
            let c = eval(ctx, cond, env)?;
            if force_bool(ctx, &c, *pos, "while evaluating an assert condition")? {
                eval(ctx, body, env)
            } else {
                Err(SporeError::AssertionFailed {
                    condition: cond.show(),
                    pos: *pos,
                })
            }
        }

        Expr::Not { expr, pos } => {
            let v = eval(ctx, expr, env)?;
            Ok(Value::Bool(!force_bool(
                ctx,
                &v,
                *pos,
                "while evaluating the operand of '!'",
            )?))
        }

        Expr::Negate { expr, pos } => {
            let v = force(ctx, &eval(ctx, expr, env)?, *pos)?;
            match v {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| SporeError::eval("integer overflow in negation", *pos)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(SporeError::ty("an integer or float", other.show_type(), *pos)),
            }
        }

        Expr::BinOp { op, lhs, rhs, pos } => eval_binop(ctx, *op, lhs, rhs, env, *pos),

        Expr::ConcatStrings { parts, pos, .. } => eval_concat(ctx, parts, env, *pos),

        Expr::CurPos { pos } => Ok(mk_pos_value(*pos)),
    }
}

thread_local! {
    static EMPTY_LIST: Value = Value::list(Vec::new());
}

/// Empty list literals share one allocation.
pub fn empty_list() -> Value {
    EMPTY_LIST.with(Value::clone)
}

// ── Variables ─────────────────────────────────────────────────────

fn eval_var(ctx: &EvalContext, var: &ExprVar, env: &Env) -> EvalResult {
    if !var.from_with.get() {
        let slot = env.ancestor(var.level.get()).slot(var.displ.get());
        return force(ctx, &slot, var.pos);
    }

    // Dynamic lookup through enclosing `with` frames, nearest first.
    // The namespace is forced only now, so a failing namespace surfaces
    // when a name is looked up, not when the frame is entered.
    let mut cur = Some(env);
    while let Some(e) = cur {
        if e.kind() == EnvKind::With {
            let ns = e.slot(0);
            let attrs = force_attrs(
                ctx,
                &ns,
                var.pos,
                "while evaluating the first expression of a with",
            )?;
            ctx.stats.attr_lookups.set(ctx.stats.attr_lookups.get() + 1);
            if let Some(attr) = attrs.get(var.name) {
                return force(ctx, &attr.value, var.pos);
            }
        }
        cur = e.up();
    }

    // Not found: gather candidates from every visible with namespace.
    let mut candidates = Vec::new();
    let mut cur = Some(env);
    while let Some(e) = cur {
        if e.kind() == EnvKind::With {
            if let Ok(attrs) = force_attrs(ctx, &e.slot(0), var.pos, "") {
                candidates.extend(attrs.names().map(|sym| sym.resolve()));
            }
        }
        cur = e.up();
    }
    let name = var.name.resolve();
    Err(SporeError::UndefinedVariable {
        suggestions: best_matches(candidates, &name),
        name,
        pos: var.pos,
    })
}

// ── Attribute sets ────────────────────────────────────────────────

/// Allocate and fill the activation record of a recursive binder
/// (`let` or `rec { … }`); inherited attributes evaluate in the
/// enclosing environment.
fn eval_binder_env(ctx: &EvalContext, bindings: &AttrsExpr, env: &Env) -> Env {
    let env2 = new_env(ctx, Some(env.clone()), bindings.attrs.len());
    for (displ, attr) in bindings.attrs.iter().enumerate() {
        let value = if attr.inherited {
            maybe_thunk(ctx, &attr.value, env)
        } else {
            maybe_thunk_rec(ctx, &attr.value, &env2)
        };
        env2.set_slot(displ as u32, value);
    }
    env2
}

fn eval_attrs(ctx: &EvalContext, attrs: &AttrsExpr, env: &Env) -> EvalResult {
    let mut builder =
        BindingsBuilder::new(attrs.attrs.len() + attrs.dynamic.len()).at(attrs.pos);
    let dynamic_env;

    if attrs.recursive {
        let env2 = new_env(ctx, Some(env.clone()), attrs.attrs.len());
        let has_overrides = attrs
            .attrs
            .iter()
            .any(|a| a.name == sym_overrides() && !a.inherited);

        for (displ, attr) in attrs.attrs.iter().enumerate() {
            let attr_env = if attr.inherited { env } else { &env2 };
            // With `__overrides` present every attribute must stay a
            // thunk, because its slot may be replaced below before it
            // is first forced.
            let value = if attr.inherited {
                maybe_thunk(ctx, &attr.value, attr_env)
            } else if has_overrides {
                ctx.stats.thunks_created.set(ctx.stats.thunks_created.get() + 1);
                Value::thunk(attr_env.clone(), attr.value.clone())
            } else {
                maybe_thunk_rec(ctx, &attr.value, attr_env)
            };
            env2.set_slot(displ as u32, value.clone());
            builder.push(Attr::new(attr.name, value, attr.pos));
        }

        // `__overrides` replaces recursive attributes after the fact:
        // both the built bindings and the environment slots, so thunks
        // that reference an overridden attribute see the new value.
        // Overrides may also introduce attributes of their own.
        if has_overrides {
            let overrides_displ = attrs
                .attrs
                .iter()
                .position(|a| a.name == sym_overrides())
                .expect("checked above");
            let ov = env2.slot(overrides_displ as u32);
            let ov_attrs = force_attrs(
                ctx,
                &ov,
                attrs.pos,
                "while evaluating the `__overrides` attribute",
            )?;
            for o in ov_attrs.iter() {
                if let Some(displ) = builder.replace_or_push(o.clone()) {
                    env2.set_slot(displ as u32, o.value.clone());
                }
            }
        }
        dynamic_env = env2;
    } else {
        for attr in &attrs.attrs {
            builder.push(Attr::new(
                attr.name,
                maybe_thunk(ctx, &attr.value, env),
                attr.pos,
            ));
        }
        dynamic_env = env.clone();
    }

    // Dynamic attributes apply after `rec` and `__overrides`. A null
    // name skips the attribute; a collision is an error.
    for dynamic in &attrs.dynamic {
        let name_val = eval(ctx, &dynamic.name_expr, &dynamic_env)?;
        if matches!(name_val, Value::Null) {
            continue;
        }
        let name_str = force_string_no_ctx(
            ctx,
            &name_val,
            dynamic.pos,
            "while evaluating the name of a dynamic attribute",
        )?;
        let sym = Symbol::intern(&name_str.text);
        let value = maybe_thunk(ctx, &dynamic.value, &dynamic_env);
        if builder.find(sym).is_some() {
            // Colliding with a declared attribute is an error; an
            // attribute that only `__overrides` introduced is replaced,
            // since dynamic attributes apply last.
            if attrs.attrs.iter().any(|a| a.name == sym) {
                return Err(SporeError::DuplicateAttribute {
                    name: name_str.text.clone(),
                    pos: dynamic.pos,
                });
            }
            let _ = builder.replace_or_push(Attr::new(sym, value, dynamic.pos));
        } else {
            builder.insert(sym, value, dynamic.pos);
        }
    }

    Ok(Value::attrs(builder.finish()))
}

// ── Select and has-attr ───────────────────────────────────────────

fn attr_name_symbol(
    ctx: &EvalContext,
    name: &AttrName,
    env: &Env,
    pos: PosIdx,
) -> Result<Symbol, SporeError> {
    match name {
        AttrName::Static(sym) => Ok(*sym),
        AttrName::Dynamic(expr) => {
            let v = eval(ctx, expr, env)?;
            let s = force_string_no_ctx(
                ctx,
                &v,
                pos,
                "while evaluating an attribute name",
            )?;
            Ok(Symbol::intern(&s.text))
        }
    }
}

fn eval_select(
    ctx: &EvalContext,
    subject: &ExprRef,
    path: &[AttrName],
    or_default: Option<&ExprRef>,
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    let _trace = ctx.config.debug_mode.then(|| {
        ctx.push_trace(
            pos,
            format!("while evaluating the attribute '{}'", Expr::show_attr_path(path)),
        )
    });

    let mut v = eval(ctx, subject, env)?;
    let mut cur_pos = subject.pos().or(pos);
    for name in path {
        let sym = attr_name_symbol(ctx, name, env, pos)?;
        let forced = force(ctx, &v, cur_pos)?;
        match &forced {
            Value::Attrs(attrs) => {
                ctx.stats.attr_lookups.set(ctx.stats.attr_lookups.get() + 1);
                match attrs.get(sym) {
                    Some(attr) => {
                        cur_pos = attr.pos.or(cur_pos);
                        v = attr.value.clone();
                    }
                    None => {
                        if let Some(default) = or_default {
                            return eval(ctx, default, env);
                        }
                        let name = sym.resolve();
                        return Err(SporeError::AttributeMissing {
                            suggestions: best_matches(
                                attrs.names().map(|s| s.resolve()),
                                &name,
                            ),
                            name,
                            pos,
                        }
                        .add_trace(
                            pos,
                            format!(
                                "while evaluating the attribute '{}'",
                                Expr::show_attr_path(path)
                            ),
                        ));
                    }
                }
            }
            other => {
                // A non-set along the path falls back to the default
                // without forcing anything further.
                if let Some(default) = or_default {
                    return eval(ctx, default, env);
                }
                return Err(SporeError::ty("a set", other.show_type(), pos).add_trace(
                    pos,
                    format!(
                        "while evaluating the attribute '{}'",
                        Expr::show_attr_path(path)
                    ),
                ));
            }
        }
    }
    force(ctx, &v, pos)
}

fn eval_has_attr(
    ctx: &EvalContext,
    subject: &ExprRef,
    path: &[AttrName],
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    let mut v = eval(ctx, subject, env)?;
    for name in path {
        let sym = attr_name_symbol(ctx, name, env, pos)?;
        let forced = force(ctx, &v, pos)?;
        match &forced {
            Value::Attrs(attrs) => match attrs.get(sym) {
                Some(attr) => v = attr.value.clone(),
                None => return Ok(Value::Bool(false)),
            },
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

// ── Operators ─────────────────────────────────────────────────────

fn eval_binop(
    ctx: &EvalContext,
    op: BinOp,
    lhs: &ExprRef,
    rhs: &ExprRef,
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    match op {
        BinOp::Eq | BinOp::Ne => {
            let a = eval(ctx, lhs, env)?;
            let b = eval(ctx, rhs, env)?;
            let equal = eq_values(ctx, &a, &b, pos)?;
            Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }))
        }

        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let a = eval(ctx, lhs, env)?;
            let b = eval(ctx, rhs, env)?;
            let ordering = compare_values(ctx, &a, &b, pos)?;
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }

        BinOp::And => {
            let a = eval(ctx, lhs, env)?;
            if !force_bool(ctx, &a, pos, "in the left operand of '&&'")? {
                return Ok(Value::Bool(false));
            }
            let b = eval(ctx, rhs, env)?;
            Ok(Value::Bool(force_bool(
                ctx,
                &b,
                pos,
                "in the right operand of '&&'",
            )?))
        }

        BinOp::Or => {
            let a = eval(ctx, lhs, env)?;
            if force_bool(ctx, &a, pos, "in the left operand of '||'")? {
                return Ok(Value::Bool(true));
            }
            let b = eval(ctx, rhs, env)?;
            Ok(Value::Bool(force_bool(
                ctx,
                &b,
                pos,
                "in the right operand of '||'",
            )?))
        }

        BinOp::Impl => {
            let a = eval(ctx, lhs, env)?;
            if !force_bool(ctx, &a, pos, "in the left operand of '->'")? {
                return Ok(Value::Bool(true));
            }
            let b = eval(ctx, rhs, env)?;
            Ok(Value::Bool(force_bool(
                ctx,
                &b,
                pos,
                "in the right operand of '->'",
            )?))
        }

        BinOp::Update => {
            let a = eval(ctx, lhs, env)?;
            let lhs_attrs = force_attrs(ctx, &a, pos, "in the left operand of '//'")?;
            let b = eval(ctx, rhs, env)?;
            let rhs_attrs = force_attrs(ctx, &b, pos, "in the right operand of '//'")?;
            // An empty side means the other set can be reused as-is.
            if lhs_attrs.is_empty() {
                return Ok(Value::Attrs(rhs_attrs));
            }
            if rhs_attrs.is_empty() {
                return Ok(Value::Attrs(lhs_attrs));
            }
            Ok(Value::attrs(lhs_attrs.update(&rhs_attrs)))
        }

        BinOp::ListConcat => {
            let a = eval(ctx, lhs, env)?;
            let lhs_items = crate::force::force_list(ctx, &a, pos, "in the left operand of '++'")?;
            let b = eval(ctx, rhs, env)?;
            let rhs_items = crate::force::force_list(ctx, &b, pos, "in the right operand of '++'")?;
            ctx.stats.list_concats.set(ctx.stats.list_concats.get() + 1);
            if lhs_items.is_empty() {
                return Ok(Value::List(rhs_items));
            }
            if rhs_items.is_empty() {
                return Ok(Value::List(lhs_items));
            }
            let mut out = Vec::with_capacity(lhs_items.len() + rhs_items.len());
            out.extend(lhs_items.iter().cloned());
            out.extend(rhs_items.iter().cloned());
            Ok(Value::list(out))
        }

        BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let a = force(ctx, &eval(ctx, lhs, env)?, pos)?;
            let b = force(ctx, &eval(ctx, rhs, env)?, pos)?;
            arith(op, &a, &b, pos)
        }
    }
}

pub(crate) fn arith(op: BinOp, a: &Value, b: &Value, pos: PosIdx) -> EvalResult {
    let (name, int_op): (&str, fn(i64, i64) -> Option<i64>) = match op {
        BinOp::Sub => ("subtracting", i64::checked_sub),
        BinOp::Mul => ("multiplying", i64::checked_mul),
        BinOp::Div => ("dividing", i64::checked_div),
        _ => unreachable!("arith called with non-arithmetic operator"),
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if op == BinOp::Div && *y == 0 {
                return Err(SporeError::eval("division by zero", pos));
            }
            int_op(*x, *y)
                .map(Value::Int)
                .ok_or_else(|| SporeError::eval(format!("integer overflow in {name} {x} and {y}"), pos))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = as_float(a);
            let y = as_float(b);
            if op == BinOp::Div && y == 0.0 {
                return Err(SporeError::eval("division by zero", pos));
            }
            Ok(Value::Float(match op {
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                _ => x / y,
            }))
        }
        (Value::Int(_) | Value::Float(_), other) | (other, _) => Err(SporeError::ty(
            "an integer or float",
            other.show_type(),
            pos,
        )),
    }
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        _ => unreachable!("as_float on non-number"),
    }
}

/// `+`-chains: the first operand's type decides whether this is checked
/// integer addition, float addition, string concatenation with context
/// merging, or path concatenation.
fn eval_concat(
    ctx: &EvalContext,
    parts: &[(PosIdx, ExprRef)],
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Int,
        Float,
        Str,
        Path,
    }

    let mut kind = None;
    let mut int_acc: i64 = 0;
    let mut float_acc: f64 = 0.0;
    let mut text = String::new();
    let mut context = StringContext::new();

    for (i, (part_pos, part)) in parts.iter().enumerate() {
        let v = force(ctx, &eval(ctx, part, env)?, *part_pos)?;
        let first = i == 0;
        if first {
            kind = Some(match &v {
                Value::Int(_) => Kind::Int,
                Value::Float(_) => Kind::Float,
                Value::Path(_) => Kind::Path,
                _ => Kind::Str,
            });
        }
        match kind.expect("set on first iteration") {
            Kind::Int => match &v {
                Value::Int(n) => {
                    int_acc = int_acc.checked_add(*n).ok_or_else(|| {
                        SporeError::eval(
                            format!("integer overflow in adding {int_acc} + {n}"),
                            *part_pos,
                        )
                    })?;
                }
                Value::Float(f) => {
                    kind = Some(Kind::Float);
                    float_acc = int_acc as f64 + f;
                }
                other => {
                    return Err(SporeError::eval(
                        format!("cannot add {} to an integer", other.show_type()),
                        *part_pos,
                    ))
                }
            },
            Kind::Float => match &v {
                Value::Int(n) => float_acc += *n as f64,
                Value::Float(f) => float_acc += f,
                other => {
                    return Err(SporeError::eval(
                        format!("cannot add {} to a float", other.show_type()),
                        *part_pos,
                    ))
                }
            },
            string_or_path => {
                let copy_to_store = string_or_path == Kind::Str;
                let part_text = coerce_to_string(
                    ctx,
                    *part_pos,
                    &v,
                    &mut context,
                    CoerceOpts {
                        coerce_more: false,
                        copy_to_store,
                    },
                )
                .map_err(|e| e.add_trace(*part_pos, "while evaluating a path segment"))?;
                text.push_str(&part_text);
            }
        }
    }

    match kind.expect("concat of at least one part") {
        Kind::Int => Ok(Value::Int(int_acc)),
        Kind::Float => Ok(Value::Float(float_acc)),
        Kind::Path => {
            if !context.is_empty() {
                return Err(SporeError::eval(
                    "a string that refers to a store path cannot be appended to a path",
                    pos,
                ));
            }
            Ok(Value::path(spore_core::sandbox::normalize_lexical(
                &PathBuf::from(text),
            )))
        }
        Kind::Str => Ok(Value::string_with_context(text, context)),
    }
}

// ── String and path literals ──────────────────────────────────────

fn eval_string_parts(
    ctx: &EvalContext,
    parts: &[StrPart],
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    if let [StrPart::Lit(text)] = parts {
        return Ok(Value::string(text.clone()));
    }
    let mut text = String::new();
    let mut context = StringContext::new();
    for part in parts {
        match part {
            StrPart::Lit(lit) => text.push_str(lit),
            StrPart::Interp(expr) => {
                let v = eval(ctx, expr, env)?;
                let piece = coerce_to_string(
                    ctx,
                    pos,
                    &v,
                    &mut context,
                    CoerceOpts {
                        coerce_more: false,
                        copy_to_store: true,
                    },
                )
                .map_err(|e| {
                    e.add_trace(expr.pos().or(pos), "while evaluating a string interpolation")
                })?;
                text.push_str(&piece);
            }
        }
    }
    Ok(Value::string_with_context(text, context))
}

fn eval_path(
    ctx: &EvalContext,
    anchor: PathAnchor,
    base: &PathBuf,
    parts: &[StrPart],
    env: &Env,
    pos: PosIdx,
) -> EvalResult {
    if anchor == PathAnchor::Search {
        let found = crate::search_path::find_file(ctx, &base.to_string_lossy(), pos)?;
        return Ok(Value::path(found));
    }
    let mut text = base.to_string_lossy().into_owned();
    if !parts.is_empty() {
        let mut context = StringContext::new();
        for part in parts {
            match part {
                StrPart::Lit(lit) => text.push_str(lit),
                StrPart::Interp(expr) => {
                    let v = eval(ctx, expr, env)?;
                    let piece = coerce_to_string(
                        ctx,
                        pos,
                        &v,
                        &mut context,
                        CoerceOpts {
                            coerce_more: false,
                            copy_to_store: false,
                        },
                    )
                    .map_err(|e| e.add_trace(pos, "while evaluating a path segment"))?;
                    text.push_str(&piece);
                }
            }
        }
        if !context.is_empty() {
            return Err(SporeError::eval(
                "a string that refers to a store path cannot be appended to a path",
                pos,
            ));
        }
    }
    Ok(Value::path(spore_core::sandbox::normalize_lexical(
        &PathBuf::from(text),
    )))
}

// ── Positions as values ───────────────────────────────────────────

/// `{ file, line, column }` for a source-file position, null otherwise.
pub fn mk_pos_value(pos: PosIdx) -> Value {
    match resolve_pos(pos) {
        Some(resolved) => match &resolved.origin {
            Origin::File(path) => {
                let mut builder = BindingsBuilder::new(3);
                builder.insert(
                    SYMS.with(|s| s.file),
                    Value::string(path.display().to_string()),
                    pos,
                );
                builder.insert(SYMS.with(|s| s.line), Value::Int(resolved.line as i64), pos);
                builder.insert(
                    SYMS.with(|s| s.column),
                    Value::Int(resolved.column as i64),
                    pos,
                );
                Value::attrs(builder.finish())
            }
            _ => Value::Null,
        },
        None => Value::Null,
    }
}
