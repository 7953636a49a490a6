use spore_core::ast::BinOp;
use spore_core::value::Value;

use crate::compare::compare_values;
use crate::eval::arith;
use crate::force::{force, force_float, force_int};

use super::Registry;

pub fn register(reg: &mut Registry) {
    reg.add_primop("__add", 2, Some("Return the sum of two numbers."), |ctx, pos, args| {
        let a = force(ctx, &args[0], pos)?;
        let b = force(ctx, &args[1], pos)?;
        match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x
                .checked_add(*y)
                .map(Value::Int)
                .ok_or_else(|| {
                    spore_core::SporeError::eval(
                        format!("integer overflow in adding {x} + {y}"),
                        pos,
                    )
                }),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let x = force_float(ctx, &a, pos, "while evaluating the first argument of 'add'")?;
                let y = force_float(ctx, &b, pos, "while evaluating the second argument of 'add'")?;
                Ok(Value::Float(x + y))
            }
            (other, _) if !matches!(other, Value::Int(_) | Value::Float(_)) => Err(
                spore_core::SporeError::ty("an integer or float", other.show_type(), pos),
            ),
            (_, other) => Err(spore_core::SporeError::ty(
                "an integer or float",
                other.show_type(),
                pos,
            )),
        }
    });

    reg.add_primop("__sub", 2, Some("Return the difference of two numbers."), |ctx, pos, args| {
        let a = force(ctx, &args[0], pos)?;
        let b = force(ctx, &args[1], pos)?;
        arith(BinOp::Sub, &a, &b, pos)
    });

    reg.add_primop("__mul", 2, Some("Return the product of two numbers."), |ctx, pos, args| {
        let a = force(ctx, &args[0], pos)?;
        let b = force(ctx, &args[1], pos)?;
        arith(BinOp::Mul, &a, &b, pos)
    });

    reg.add_primop("__div", 2, Some("Return the quotient of two numbers."), |ctx, pos, args| {
        let a = force(ctx, &args[0], pos)?;
        let b = force(ctx, &args[1], pos)?;
        arith(BinOp::Div, &a, &b, pos)
    });

    reg.add_primop(
        "__lessThan",
        2,
        Some("Whether the first value orders strictly before the second."),
        |ctx, pos, args| {
            Ok(Value::Bool(
                compare_values(ctx, &args[0], &args[1], pos)?.is_lt(),
            ))
        },
    );

    reg.add_primop("__bitAnd", 2, None, |ctx, pos, args| {
        let a = force_int(ctx, &args[0], pos, "while evaluating the first argument of 'bitAnd'")?;
        let b = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'bitAnd'")?;
        Ok(Value::Int(a & b))
    });

    reg.add_primop("__bitOr", 2, None, |ctx, pos, args| {
        let a = force_int(ctx, &args[0], pos, "while evaluating the first argument of 'bitOr'")?;
        let b = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'bitOr'")?;
        Ok(Value::Int(a | b))
    });

    reg.add_primop("__bitXor", 2, None, |ctx, pos, args| {
        let a = force_int(ctx, &args[0], pos, "while evaluating the first argument of 'bitXor'")?;
        let b = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'bitXor'")?;
        Ok(Value::Int(a ^ b))
    });

    reg.add_primop(
        "__ceil",
        1,
        Some("Round a number up to the nearest integer."),
        |ctx, pos, args| {
            let f = force_float(ctx, &args[0], pos, "while evaluating the argument of 'ceil'")?;
            Ok(Value::Int(f.ceil() as i64))
        },
    );

    reg.add_primop(
        "__floor",
        1,
        Some("Round a number down to the nearest integer."),
        |ctx, pos, args| {
            let f = force_float(ctx, &args[0], pos, "while evaluating the argument of 'floor'")?;
            Ok(Value::Int(f.floor() as i64))
        },
    );
}
