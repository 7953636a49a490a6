use spore_core::value::Value;

use crate::force::force;

use super::Registry;

macro_rules! type_predicate {
    ($reg:expr, $name:literal, $pattern:pat) => {
        $reg.add_primop($name, 1, None, |ctx, pos, args| {
            Ok(Value::Bool(matches!(force(ctx, &args[0], pos)?, $pattern)))
        });
    };
}

pub fn register(reg: &mut Registry) {
    type_predicate!(reg, "__isInt", Value::Int(_));
    type_predicate!(reg, "__isFloat", Value::Float(_));
    type_predicate!(reg, "__isBool", Value::Bool(_));
    type_predicate!(reg, "__isString", Value::String(_));
    type_predicate!(reg, "__isPath", Value::Path(_));
    type_predicate!(reg, "__isList", Value::List(_));
    type_predicate!(reg, "__isAttrs", Value::Attrs(_));
    type_predicate!(reg, "isNull", Value::Null);

    reg.add_primop(
        "__isFunction",
        1,
        Some("Whether the value can be applied (functor sets excluded)."),
        |ctx, pos, args| Ok(Value::Bool(force(ctx, &args[0], pos)?.is_function())),
    );

    reg.add_primop(
        "__typeOf",
        1,
        Some("The name of the value's type, as a string."),
        |ctx, pos, args| Ok(Value::string(force(ctx, &args[0], pos)?.type_of())),
    );
}
