use spore_core::context::EvalContext;
use spore_core::env::Env;
use spore_core::error::{best_matches, EvalResult, SporeError};
use spore_core::pos::PosIdx;
use spore_core::value::{PrimOp, PrimOpApp, Value};

use crate::eval::{eval, maybe_thunk_rec, sym_functor};
use crate::force::{force, force_attrs};

use std::rc::Rc;

// ── Function application ──────────────────────────────────────────
//
// One loop consumes the argument vector against the current callee:
// lambdas bind one argument (positional or formal pattern), primops
// fire when saturated or curry into a PrimOpApp chain, functor sets
// rewrite to `functor self arg`, anything else is a type error.

pub fn apply(ctx: &EvalContext, fun: Value, args: &[Value], pos: PosIdx) -> EvalResult {
    let _depth = ctx.enter_call(pos)?;
    let _trace = ctx.push_trace(pos, "while calling a function");

    let mut cur = force(ctx, &fun, pos)?;
    let mut remaining = args;

    while !remaining.is_empty() {
        match cur.clone() {
            Value::Lambda(closure) => {
                if ctx.config.trace_function_calls {
                    tracing::debug!(
                        target: "spore::calls",
                        "function-trace entered {} at {}",
                        closure.lambda.display_name(),
                        spore_core::pos::show_pos(closure.lambda.pos)
                    );
                }
                cur = call_lambda(ctx, &closure, &remaining[0], pos)?;
                remaining = &remaining[1..];
            }

            Value::PrimOp(primop) => {
                if remaining.len() < primop.arity {
                    return Ok(make_app_chain(cur, remaining));
                }
                let (used, rest) = remaining.split_at(primop.arity);
                let result = call_primop(ctx, &primop, used, pos)?;
                cur = force(ctx, &result, pos)?;
                remaining = rest;
            }

            Value::PrimOpApp(_) => {
                // Walk the left spine to find the primop and the
                // arguments already accumulated, in order.
                let mut acc: Vec<Value> = Vec::new();
                let mut leaf = cur.clone();
                while let Value::PrimOpApp(app) = leaf {
                    acc.push(app.arg.clone());
                    leaf = app.func.clone();
                }
                acc.reverse();
                let primop = match leaf {
                    Value::PrimOp(p) => p,
                    other => {
                        return Err(SporeError::eval(
                            format!(
                                "malformed partial application of {}",
                                other.show_type()
                            ),
                            pos,
                        ))
                    }
                };
                let needed = primop.arity - acc.len();
                if remaining.len() < needed {
                    return Ok(make_app_chain(cur, remaining));
                }
                let (used, rest) = remaining.split_at(needed);
                acc.extend(used.iter().cloned());
                let result = call_primop(ctx, &primop, &acc, pos)?;
                cur = force(ctx, &result, pos)?;
                remaining = rest;
            }

            Value::Attrs(attrs) => match attrs.get(sym_functor()) {
                Some(functor) => {
                    // Open recursion: rewrite as `functor self arg`.
                    let functor_val = functor.value.clone();
                    let self_val = cur.clone();
                    let result = apply(
                        ctx,
                        functor_val,
                        &[self_val, remaining[0].clone()],
                        functor.pos.or(pos),
                    )
                    .map_err(|e| {
                        e.add_trace(
                            pos,
                            "while calling a functor (an attribute set with a '__functor' attribute)",
                        )
                    })?;
                    cur = result;
                    remaining = &remaining[1..];
                }
                None => {
                    return Err(SporeError::ty(
                        "a function",
                        "a set",
                        pos,
                    )
                    .add_trace(pos, "attempt to call something which is not a function"))
                }
            },

            other => {
                return Err(SporeError::ty("a function", other.show_type(), pos)
                    .add_trace(pos, "attempt to call something which is not a function"))
            }
        }
    }

    Ok(cur)
}

/// Bind one argument against a lambda and evaluate its body.
fn call_lambda(
    ctx: &EvalContext,
    closure: &spore_core::value::Closure,
    arg: &Value,
    pos: PosIdx,
) -> EvalResult {
    let lambda = &closure.lambda;
    let env2 = Env::new(Some(closure.env.clone()), lambda.env_size());
    ctx.stats.envs_allocated.set(ctx.stats.envs_allocated.get() + 1);

    match &lambda.formals {
        None => {
            // Plain positional lambda: one slot for the argument.
            env2.set_slot(0, arg.clone());
        }
        Some(formals) => {
            let arg_attrs = force_attrs(
                ctx,
                arg,
                lambda.pos,
                "while evaluating the value passed for the lambda argument",
            )
            .map_err(|e| e.add_trace(pos, "from call site"))?;

            let mut displ = 0u32;
            if lambda.arg.is_some() {
                env2.set_slot(displ, arg.clone());
                displ += 1;
            }

            // Match each formal against the supplied attributes; missing
            // ones fall back to their default or fail.
            for formal in &formals.formals {
                match arg_attrs.get(formal.name) {
                    Some(attr) => env2.set_slot(displ, attr.value.clone()),
                    None => match &formal.default {
                        Some(default) => {
                            env2.set_slot(displ, maybe_thunk_rec(ctx, default, &env2));
                        }
                        None => {
                            return Err(SporeError::MissingArgument {
                                func: lambda.display_name(),
                                name: formal.name.resolve(),
                                pos: lambda.pos,
                            }
                            .add_trace(pos, "from call site"))
                        }
                    },
                }
                displ += 1;
            }

            // Without an ellipsis, every supplied attribute must match
            // a formal.
            if !formals.ellipsis {
                for attr in arg_attrs.iter() {
                    if !formals.has(attr.name) {
                        let name = attr.name.resolve();
                        return Err(SporeError::UnexpectedArgument {
                            func: lambda.display_name(),
                            suggestions: best_matches(
                                formals.formals.iter().map(|f| f.name.resolve()),
                                &name,
                            ),
                            name,
                            pos: lambda.pos,
                        }
                        .add_trace(pos, "from call site"));
                    }
                }
            }
        }
    }

    ctx.stats.function_calls.set(ctx.stats.function_calls.get() + 1);
    if ctx.config.count_calls {
        ctx.stats.count_function_call(&lambda.display_name());
    }

    eval(ctx, &lambda.body, &env2)
        .map_err(|e| e.add_trace(pos, format!("while calling {}", lambda.display_name())))
}

fn call_primop(
    ctx: &EvalContext,
    primop: &Rc<PrimOp>,
    args: &[Value],
    pos: PosIdx,
) -> EvalResult {
    ctx.stats.primop_calls.set(ctx.stats.primop_calls.get() + 1);
    if ctx.config.count_calls {
        ctx.stats.count_function_call(&primop.name);
    }
    (primop.func)(ctx, pos, args).map_err(|e| {
        // An explicit `throw` is reported as such; an error that merely
        // happened inside a builtin names the builtin.
        if primop.name == "throw" && e.is_catchable() {
            e.add_trace(pos, "caused by explicit throw")
        } else {
            e.add_trace(pos, format!("while calling the '{}' builtin", primop.name))
        }
    })
}

/// Too few arguments: park them in a left-biased PrimOpApp chain whose
/// leftmost leaf is the primop.
fn make_app_chain(fun: Value, args: &[Value]) -> Value {
    let mut cur = fun;
    for arg in args {
        cur = Value::PrimOpApp(Rc::new(PrimOpApp {
            func: cur,
            arg: arg.clone(),
        }));
    }
    cur
}
