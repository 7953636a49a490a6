use spore_core::bindings::BindingsBuilder;
use spore_core::symbol::Symbol;
use spore_core::value::{StringContext, Value};
use spore_core::SporeError;

use crate::coerce::{coerce_to_string, CoerceOpts};
use crate::force::{force, force_deep};

use super::Registry;

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "throw",
        1,
        Some("Abort evaluation with an error message; catchable by tryEval."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let message = coerce_to_string(
                ctx,
                pos,
                &args[0],
                &mut context,
                CoerceOpts {
                    coerce_more: false,
                    copy_to_store: false,
                },
            )
            .map_err(|e| e.add_trace(pos, "while evaluating the error message passed to throw"))?;
            Err(SporeError::Thrown { message, pos })
        },
    );

    reg.add_primop(
        "abort",
        1,
        Some("Abort evaluation unconditionally; not catchable."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let message = coerce_to_string(
                ctx,
                pos,
                &args[0],
                &mut context,
                CoerceOpts {
                    coerce_more: false,
                    copy_to_store: false,
                },
            )
            .map_err(|e| e.add_trace(pos, "while evaluating the error message passed to abort"))?;
            Err(SporeError::Abort { message, pos })
        },
    );

    reg.add_primop(
        "__tryEval",
        1,
        Some("Evaluate an expression, converting throw and failed assertions into { success, value }."),
        |ctx, pos, args| {
            let mut builder = BindingsBuilder::new(2);
            let success = Symbol::intern("success");
            let value = Symbol::intern("value");
            match force(ctx, &args[0], pos) {
                Ok(v) => {
                    builder.insert(success, Value::Bool(true), pos);
                    builder.insert(value, v, pos);
                }
                Err(e) if e.is_catchable() => {
                    builder.insert(success, Value::Bool(false), pos);
                    builder.insert(value, Value::Null, pos);
                }
                Err(e) => return Err(e),
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop(
        "__seq",
        2,
        Some("Force the first argument, then return the second."),
        |ctx, pos, args| {
            force(ctx, &args[0], pos)?;
            force(ctx, &args[1], pos)
        },
    );

    reg.add_primop(
        "__deepSeq",
        2,
        Some("Deeply force the first argument, then return the second."),
        |ctx, pos, args| {
            force_deep(ctx, &args[0], pos)?;
            force(ctx, &args[1], pos)
        },
    );

    reg.add_primop(
        "__trace",
        2,
        Some("Print the first argument to stderr, then return the second."),
        |ctx, pos, args| {
            let forced = force(ctx, &args[0], pos)?;
            let rendered = match &forced {
                Value::String(s) => s.text.clone(),
                other => crate::print::print_value(ctx, other, crate::print::PrintOptions::default())?,
            };
            eprintln!("trace: {rendered}");
            Ok(args[1].clone())
        },
    );
}
