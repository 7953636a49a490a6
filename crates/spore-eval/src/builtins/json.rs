use spore_core::bindings::BindingsBuilder;
use spore_core::context::EvalContext;
use spore_core::pos::PosIdx;
use spore_core::symbol::Symbol;
use spore_core::value::{StringContext, Value};
use spore_core::SporeError;

use crate::coerce::{coerce_to_string, CoerceOpts};
use crate::compare::is_derivation;
use crate::eval::{sym_out_path, sym_to_string};
use crate::force::{force, force_string};

use super::Registry;

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "__toJSON",
        1,
        Some("Serialise a value to a JSON string, deeply forcing it."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let json = value_to_json(ctx, &args[0], pos, &mut context)?;
            let text = serde_json::to_string(&json)
                .map_err(|e| SporeError::eval(format!("cannot serialise to JSON: {e}"), pos))?;
            Ok(Value::string_with_context(text, context))
        },
    );

    reg.add_primop(
        "__fromJSON",
        1,
        Some("Parse a JSON string into a value."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'fromJSON'")?;
            let parsed: serde_json::Value = serde_json::from_str(&s.text)
                .map_err(|e| SporeError::eval(format!("cannot parse JSON: {e}"), pos))?;
            Ok(json_to_value(&parsed, pos))
        },
    );
}

fn value_to_json(
    ctx: &EvalContext,
    v: &Value,
    pos: PosIdx,
    context: &mut StringContext,
) -> Result<serde_json::Value, SporeError> {
    ctx.check_interrupt()?;
    let v = force(ctx, v, pos)?;
    Ok(match &v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| SporeError::eval("cannot serialise NaN or infinity to JSON", pos))?,
        Value::String(s) => {
            context.extend_from(&s.context);
            serde_json::Value::String(s.text.clone())
        }
        Value::Path(_) => {
            let text = coerce_to_string(
                ctx,
                pos,
                &v,
                context,
                CoerceOpts {
                    coerce_more: false,
                    copy_to_store: true,
                },
            )?;
            serde_json::Value::String(text)
        }
        Value::Attrs(attrs) => {
            // Derivations and sets with a custom rendering serialise as
            // the string they coerce to.
            if is_derivation(ctx, &v, pos)?
                || attrs.contains(sym_to_string())
                || attrs.contains(sym_out_path())
            {
                let text = coerce_to_string(
                    ctx,
                    pos,
                    &v,
                    context,
                    CoerceOpts {
                        coerce_more: false,
                        copy_to_store: true,
                    },
                )?;
                serde_json::Value::String(text)
            } else {
                let mut object = serde_json::Map::with_capacity(attrs.len());
                for attr in attrs.iter() {
                    let value = value_to_json(ctx, &attr.value, pos, context).map_err(|e| {
                        e.add_trace(
                            attr.pos,
                            format!("while evaluating the attribute '{}'", attr.name),
                        )
                    })?;
                    object.insert(attr.name.resolve(), value);
                }
                serde_json::Value::Object(object)
            }
        }
        Value::List(items) => {
            let mut array = Vec::with_capacity(items.len());
            for item in items.iter() {
                array.push(value_to_json(ctx, item, pos, context)?);
            }
            serde_json::Value::Array(array)
        }
        other => {
            return Err(SporeError::eval(
                format!("cannot serialise {} to JSON", other.show_type()),
                pos,
            ))
        }
    })
}

fn json_to_value(json: &serde_json::Value, pos: PosIdx) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(|item| json_to_value(item, pos)).collect())
        }
        serde_json::Value::Object(object) => {
            let mut builder = BindingsBuilder::new(object.len());
            for (key, value) in object {
                builder.insert(Symbol::intern(key), json_to_value(value, pos), pos);
            }
            Value::attrs(builder.finish())
        }
    }
}
