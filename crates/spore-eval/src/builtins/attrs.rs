use spore_core::bindings::{Attr, BindingsBuilder};
use spore_core::symbol::Symbol;
use spore_core::value::{Thunk, Value};
use spore_core::SporeError;

use crate::eval::mk_pos_value;
use crate::force::{force, force_attrs, force_list, force_string, force_string_no_ctx};

use super::Registry;

/// A lazy two-argument application `f a b`, built without an AST.
fn lazy_call2(ctx: &spore_core::EvalContext, f: &Value, a: Value, b: Value) -> Value {
    ctx.stats.thunks_created.set(ctx.stats.thunks_created.get() + 2);
    let partial = Value::Thunk(Thunk::deferred_app(f.clone(), a));
    Value::Thunk(Thunk::deferred_app(partial, b))
}

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "__attrNames",
        1,
        Some("The attribute names of a set, sorted lexicographically."),
        |ctx, pos, args| {
            let attrs = force_attrs(ctx, &args[0], pos, "while evaluating the argument of 'attrNames'")?;
            let mut names: Vec<Symbol> = attrs.names().collect();
            names.sort_by(|a, b| Symbol::cmp_lexical(*a, *b));
            Ok(Value::list(
                names.into_iter().map(|sym| Value::string(sym.resolve())).collect(),
            ))
        },
    );

    reg.add_primop(
        "__attrValues",
        1,
        Some("The attribute values of a set, in lexicographic name order."),
        |ctx, pos, args| {
            let attrs = force_attrs(ctx, &args[0], pos, "while evaluating the argument of 'attrValues'")?;
            let mut pairs: Vec<(Symbol, Value)> =
                attrs.iter().map(|a| (a.name, a.value.clone())).collect();
            pairs.sort_by(|a, b| Symbol::cmp_lexical(a.0, b.0));
            Ok(Value::list(pairs.into_iter().map(|(_, v)| v).collect()))
        },
    );

    reg.add_primop(
        "__getAttr",
        2,
        Some("Look an attribute up by name."),
        |ctx, pos, args| {
            let name = force_string(ctx, &args[0], pos, "while evaluating the attribute name")?;
            let attrs = force_attrs(ctx, &args[1], pos, "while evaluating the set argument of 'getAttr'")?;
            let sym = Symbol::intern(&name.text);
            ctx.stats.attr_lookups.set(ctx.stats.attr_lookups.get() + 1);
            match attrs.get(sym) {
                Some(attr) => force(ctx, &attr.value, pos),
                None => Err(SporeError::AttributeMissing {
                    suggestions: spore_core::best_matches(
                        attrs.names().map(|s| s.resolve()),
                        &name.text,
                    ),
                    name: name.text.clone(),
                    pos,
                }),
            }
        },
    );

    reg.add_primop("__hasAttr", 2, None, |ctx, pos, args| {
        let name = force_string(ctx, &args[0], pos, "while evaluating the attribute name")?;
        let attrs = force_attrs(ctx, &args[1], pos, "while evaluating the set argument of 'hasAttr'")?;
        Ok(Value::Bool(attrs.contains(Symbol::intern(&name.text))))
    });

    reg.add_primop(
        "__unsafeGetAttrPos",
        2,
        Some("The source position of an attribute's definition, or null."),
        |ctx, pos, args| {
            let name = force_string(ctx, &args[0], pos, "while evaluating the attribute name")?;
            let attrs = force_attrs(ctx, &args[1], pos, "")?;
            match attrs.get(Symbol::intern(&name.text)) {
                Some(attr) => Ok(mk_pos_value(attr.pos)),
                None => Ok(Value::Null),
            }
        },
    );

    reg.add_primop(
        "removeAttrs",
        2,
        Some("Copy a set without the named attributes."),
        |ctx, pos, args| {
            let attrs = force_attrs(ctx, &args[0], pos, "while evaluating the first argument of 'removeAttrs'")?;
            let names = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'removeAttrs'")?;
            let mut removed: Vec<Symbol> = Vec::with_capacity(names.len());
            for name in names.iter() {
                let s = force_string(ctx, name, pos, "while evaluating a name in 'removeAttrs'")?;
                removed.push(Symbol::intern(&s.text));
            }
            let mut builder = BindingsBuilder::new(attrs.len());
            for attr in attrs.iter() {
                if !removed.contains(&attr.name) {
                    builder.push(attr.clone());
                }
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__listToAttrs",
        1,
        Some("Build a set from { name, value } entries; the first occurrence of a name wins."),
        |ctx, pos, args| {
            let entries = force_list(ctx, &args[0], pos, "while evaluating the argument of 'listToAttrs'")?;
            let name_sym = Symbol::intern("name");
            let value_sym = Symbol::intern("value");
            let mut builder = BindingsBuilder::new(entries.len());
            for entry in entries.iter() {
                let entry_attrs =
                    force_attrs(ctx, entry, pos, "while evaluating an element of 'listToAttrs'")?;
                let name_attr = entry_attrs.get(name_sym).ok_or_else(|| {
                    SporeError::AttributeMissing {
                        name: "name".to_string(),
                        suggestions: Vec::new(),
                        pos,
                    }
                })?;
                let name = force_string_no_ctx(ctx, &name_attr.value, pos, "while evaluating an attribute name")?;
                let sym = Symbol::intern(&name.text);
                if builder.find(sym).is_some() {
                    continue;
                }
                let value_attr = entry_attrs.get(value_sym).ok_or_else(|| {
                    SporeError::AttributeMissing {
                        name: "value".to_string(),
                        suggestions: Vec::new(),
                        pos,
                    }
                })?;
                builder.insert(sym, value_attr.value.clone(), pos);
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__intersectAttrs",
        2,
        Some("The attributes of the second set whose names occur in the first."),
        |ctx, pos, args| {
            let lhs = force_attrs(ctx, &args[0], pos, "while evaluating the first argument of 'intersectAttrs'")?;
            let rhs = force_attrs(ctx, &args[1], pos, "while evaluating the second argument of 'intersectAttrs'")?;
            let mut builder = BindingsBuilder::new(lhs.len().min(rhs.len()));
            for attr in rhs.iter() {
                if lhs.contains(attr.name) {
                    builder.push(attr.clone());
                }
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__catAttrs",
        2,
        Some("Collect the values of the named attribute across a list of sets."),
        |ctx, pos, args| {
            let name = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'catAttrs'")?;
            let sets = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'catAttrs'")?;
            let sym = Symbol::intern(&name.text);
            let mut out = Vec::new();
            for set in sets.iter() {
                let attrs = force_attrs(ctx, set, pos, "while evaluating an element of 'catAttrs'")?;
                if let Some(attr) = attrs.get(sym) {
                    out.push(attr.value.clone());
                }
            }
            Ok(Value::list(out))
        },
    );

    reg.add_primop(
        "__mapAttrs",
        2,
        Some("Apply a function to every attribute: f name value."),
        |ctx, pos, args| {
            let attrs = force_attrs(ctx, &args[1], pos, "while evaluating the second argument of 'mapAttrs'")?;
            let mut builder = BindingsBuilder::new(attrs.len());
            for attr in attrs.iter() {
                let value = lazy_call2(
                    ctx,
                    &args[0],
                    Value::string(attr.name.resolve()),
                    attr.value.clone(),
                );
                builder.push(Attr::new(attr.name, value, attr.pos));
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__zipAttrsWith",
        2,
        Some("Merge a list of sets, applying f name values to each name's collected values."),
        |ctx, pos, args| {
            let sets = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'zipAttrsWith'")?;
            // Collect per-name value lists in first-seen order.
            let mut order: Vec<Symbol> = Vec::new();
            let mut collected: hashbrown::HashMap<Symbol, Vec<Value>> = hashbrown::HashMap::new();
            for set in sets.iter() {
                let attrs = force_attrs(ctx, set, pos, "while evaluating an element of 'zipAttrsWith'")?;
                for attr in attrs.iter() {
                    collected
                        .entry(attr.name)
                        .or_insert_with(|| {
                            order.push(attr.name);
                            Vec::new()
                        })
                        .push(attr.value.clone());
                }
            }
            let mut builder = BindingsBuilder::new(order.len());
            for name in order {
                let values = collected.remove(&name).unwrap_or_default();
                let value = lazy_call2(
                    ctx,
                    &args[0],
                    Value::string(name.resolve()),
                    Value::list(values),
                );
                builder.insert(name, value, pos);
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__functionArgs",
        1,
        Some("The formal names of a lambda, mapped to whether each has a default."),
        |ctx, pos, args| {
            let f = force(ctx, &args[0], pos)?;
            match &f {
                Value::Lambda(closure) => {
                    let mut builder = BindingsBuilder::new(
                        closure.lambda.formals.as_ref().map_or(0, |f| f.formals.len()),
                    );
                    if let Some(formals) = &closure.lambda.formals {
                        for formal in &formals.formals {
                            builder.insert(
                                formal.name,
                                Value::Bool(formal.default.is_some()),
                                formal.pos,
                            );
                        }
                    }
                    Ok(Value::attrs(builder.finish()))
                }
                Value::PrimOp(_) | Value::PrimOpApp(_) => {
                    Ok(Value::attrs(spore_core::Bindings::empty()))
                }
                other => Err(SporeError::ty("a function", other.show_type(), pos)),
            }
        },
    );
}
