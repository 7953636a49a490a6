use spore_core::value::{Thunk, Value};
use spore_core::SporeError;

use crate::apply::apply;
use crate::compare::eq_values;
use crate::force::{force, force_bool, force_int, force_list};

use super::Registry;

/// A lazy one-argument application `f x`, built without an AST.
fn lazy_call(ctx: &spore_core::EvalContext, f: &Value, x: Value) -> Value {
    ctx.stats.thunks_created.set(ctx.stats.thunks_created.get() + 1);
    Value::Thunk(Thunk::deferred_app(f.clone(), x))
}

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "map",
        2,
        Some("Apply a function to every list element, lazily."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'map'")?;
            Ok(Value::list(
                items
                    .iter()
                    .map(|item| lazy_call(ctx, &args[0], item.clone()))
                    .collect(),
            ))
        },
    );

    reg.add_primop(
        "__filter",
        2,
        Some("Keep the elements the predicate accepts."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'filter'")?;
            let mut out = Vec::new();
            for item in items.iter() {
                ctx.check_interrupt()?;
                let keep = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
                if force_bool(ctx, &keep, pos, "while evaluating the return value of the filter predicate")? {
                    out.push(item.clone());
                }
            }
            Ok(Value::list(out))
        },
    );

    reg.add_primop("__length", 1, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[0], pos, "while evaluating the argument of 'length'")?;
        Ok(Value::Int(items.len() as i64))
    });

    reg.add_primop("__head", 1, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[0], pos, "while evaluating the argument of 'head'")?;
        match items.first() {
            Some(first) => force(ctx, first, pos),
            None => Err(SporeError::eval("'head' called on an empty list", pos)),
        }
    });

    reg.add_primop("__tail", 1, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[0], pos, "while evaluating the argument of 'tail'")?;
        if items.is_empty() {
            return Err(SporeError::eval("'tail' called on an empty list", pos));
        }
        Ok(Value::list(items[1..].to_vec()))
    });

    reg.add_primop("__elemAt", 2, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[0], pos, "while evaluating the first argument of 'elemAt'")?;
        let n = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'elemAt'")?;
        let item = usize::try_from(n)
            .ok()
            .and_then(|i| items.get(i))
            .ok_or_else(|| SporeError::eval(format!("list index {n} is out of bounds"), pos))?;
        force(ctx, item, pos)
    });

    reg.add_primop(
        "__elem",
        2,
        Some("Whether a value occurs in a list, by structural equality."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'elem'")?;
            for item in items.iter() {
                if eq_values(ctx, &args[0], item, pos)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        },
    );

    reg.add_primop("__concatLists", 1, None, |ctx, pos, args| {
        let lists = force_list(ctx, &args[0], pos, "while evaluating the argument of 'concatLists'")?;
        let mut out = Vec::new();
        for list in lists.iter() {
            let items = force_list(ctx, list, pos, "while evaluating an element of 'concatLists'")?;
            out.extend(items.iter().cloned());
        }
        ctx.stats.list_concats.set(ctx.stats.list_concats.get() + 1);
        Ok(Value::list(out))
    });

    reg.add_primop("__concatMap", 2, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'concatMap'")?;
        let mut out = Vec::new();
        for item in items.iter() {
            let mapped = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
            let list = force_list(ctx, &mapped, pos, "while evaluating the return value of the concatMap function")?;
            out.extend(list.iter().cloned());
        }
        Ok(Value::list(out))
    });

    reg.add_primop(
        "__foldl'",
        3,
        Some("Strict left fold: the accumulator is forced at every step."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[2], pos, "while evaluating the third argument of 'foldl''")?;
            let mut acc = force(ctx, &args[1], pos)?;
            for item in items.iter() {
                ctx.check_interrupt()?;
                acc = apply(ctx, args[0].clone(), &[acc, item.clone()], pos)?;
                acc = force(ctx, &acc, pos)?;
            }
            Ok(acc)
        },
    );

    reg.add_primop(
        "__genList",
        2,
        Some("The list [ f 0 … f (n - 1) ], with lazy elements."),
        |ctx, pos, args| {
            let n = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'genList'")?;
            let n = usize::try_from(n).map_err(|_| {
                SporeError::eval(format!("cannot create a list of size {n}"), pos)
            })?;
            Ok(Value::list(
                (0..n)
                    .map(|i| lazy_call(ctx, &args[0], Value::Int(i as i64)))
                    .collect(),
            ))
        },
    );

    reg.add_primop("__all", 2, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'all'")?;
        for item in items.iter() {
            let v = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
            if !force_bool(ctx, &v, pos, "while evaluating the return value of the 'all' predicate")? {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });

    reg.add_primop("__any", 2, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'any'")?;
        for item in items.iter() {
            let v = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
            if force_bool(ctx, &v, pos, "while evaluating the return value of the 'any' predicate")? {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });

    reg.add_primop(
        "__sort",
        2,
        Some("Stable merge sort using a `a: b: bool` strictly-before comparator."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'sort'")?;
            let sorted = merge_sort(ctx, args[0].clone(), items.to_vec(), pos)?;
            Ok(Value::list(sorted))
        },
    );

    reg.add_primop("__partition", 2, None, |ctx, pos, args| {
        let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'partition'")?;
        let mut right = Vec::new();
        let mut wrong = Vec::new();
        for item in items.iter() {
            let v = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
            if force_bool(ctx, &v, pos, "while evaluating the return value of the 'partition' predicate")? {
                right.push(item.clone());
            } else {
                wrong.push(item.clone());
            }
        }
        let mut builder = spore_core::BindingsBuilder::new(2);
        builder.insert(spore_core::Symbol::intern("right"), Value::list(right), pos);
        builder.insert(spore_core::Symbol::intern("wrong"), Value::list(wrong), pos);
        Ok(Value::attrs(builder.finish()))
    });

    reg.add_primop(
        "__groupBy",
        2,
        Some("Group list elements into a set keyed by f element."),
        |ctx, pos, args| {
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'groupBy'")?;
            let mut order: Vec<spore_core::Symbol> = Vec::new();
            let mut groups: hashbrown::HashMap<spore_core::Symbol, Vec<Value>> =
                hashbrown::HashMap::new();
            for item in items.iter() {
                let key = apply(ctx, args[0].clone(), &[item.clone()], pos)?;
                let key = crate::force::force_string(
                    ctx,
                    &key,
                    pos,
                    "while evaluating the return value of the 'groupBy' function",
                )?;
                let sym = spore_core::Symbol::intern(&key.text);
                groups
                    .entry(sym)
                    .or_insert_with(|| {
                        order.push(sym);
                        Vec::new()
                    })
                    .push(item.clone());
            }
            let mut builder = spore_core::BindingsBuilder::new(order.len());
            for sym in order {
                let values = groups.remove(&sym).unwrap_or_default();
                builder.insert(sym, Value::list(values), pos);
            }
            Ok(Value::attrs(builder.finish()))
        },
    );
}

/// Merge sort with a fallible user comparator (`strictly before`).
fn merge_sort(
    ctx: &spore_core::EvalContext,
    cmp: Value,
    mut items: Vec<Value>,
    pos: spore_core::PosIdx,
) -> Result<Vec<Value>, SporeError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(ctx, cmp.clone(), items, pos)?;
    let right = merge_sort(ctx, cmp.clone(), right, pos)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = left.into_iter().peekable();
    let mut ri = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (li.peek(), ri.peek()) {
        ctx.check_interrupt()?;
        // Stable: take from the left unless the right is strictly before.
        let before = apply(ctx, cmp.clone(), &[r.clone(), l.clone()], pos)?;
        if force_bool(ctx, &before, pos, "while evaluating the return value of the sort comparator")? {
            out.push(ri.next().unwrap());
        } else {
            out.push(li.next().unwrap());
        }
    }
    out.extend(li);
    out.extend(ri);
    Ok(out)
}
