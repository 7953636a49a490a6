use std::fmt::Write;

use spore_core::context::EvalContext;
use spore_core::error::SporeError;
use spore_core::pos::{show_pos, NO_POS};
use spore_core::symbol::Symbol;
use spore_core::value::Value;

use crate::force::force;

// ── Value printing ────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub struct PrintOptions {
    /// Force thunks while printing; otherwise they render as `«thunk»`.
    pub force: bool,
    /// Depth at which substructure is elided as `…`.
    pub max_depth: Option<usize>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        PrintOptions {
            force: true,
            max_depth: None,
        }
    }
}

/// Render a value as (re-parseable, for pure data) source text. Shared
/// substructure already printed renders as `«repeated»` so cycles stay
/// finite.
pub fn print_value(
    ctx: &EvalContext,
    v: &Value,
    opts: PrintOptions,
) -> Result<String, SporeError> {
    let mut out = String::new();
    let mut seen = hashbrown::HashSet::new();
    print_inner(ctx, v, opts, 0, &mut seen, &mut out)?;
    Ok(out)
}

fn print_inner(
    ctx: &EvalContext,
    v: &Value,
    opts: PrintOptions,
    depth: usize,
    seen: &mut hashbrown::HashSet<usize>,
    out: &mut String,
) -> Result<(), SporeError> {
    if let Some(max) = opts.max_depth {
        if depth > max {
            out.push('…');
            return Ok(());
        }
    }

    let forced;
    let v = if opts.force {
        forced = force(ctx, v, NO_POS)?;
        &forced
    } else if let Value::Thunk(t) = v {
        match t.forced_value() {
            Some(inner) => {
                forced = inner;
                &forced
            }
            None => {
                out.push_str("«thunk»");
                return Ok(());
            }
        }
    } else {
        v
    };

    match v {
        Value::Int(n) => write!(out, "{n}").unwrap(),
        Value::Float(f) => out.push_str(&fmt_float(*f)),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Null => out.push_str("null"),
        Value::String(s) => print_string(&s.text, out),
        Value::Path(p) => write!(out, "{}", p.display()).unwrap(),

        Value::List(items) => {
            if let Some(addr) = v.addr() {
                if !seen.insert(addr) {
                    out.push_str("«repeated»");
                    return Ok(());
                }
            }
            out.push_str("[ ");
            for item in items.iter() {
                print_inner(ctx, item, opts, depth + 1, seen, out)?;
                out.push(' ');
            }
            out.push(']');
        }

        Value::Attrs(attrs) => {
            if let Some(addr) = v.addr() {
                if !seen.insert(addr) {
                    out.push_str("«repeated»");
                    return Ok(());
                }
            }
            // Lexical name order for human consumption.
            let mut sorted: Vec<_> = attrs.iter().collect();
            sorted.sort_by(|a, b| Symbol::cmp_lexical(a.name, b.name));
            out.push_str("{ ");
            for attr in sorted {
                print_attr_name(attr.name, out);
                out.push_str(" = ");
                print_inner(ctx, &attr.value, opts, depth + 1, seen, out)?;
                out.push_str("; ");
            }
            out.push('}');
        }

        Value::Lambda(closure) => {
            write!(out, "«lambda @ {}»", show_pos(closure.lambda.pos)).unwrap()
        }
        Value::PrimOp(p) => write!(out, "«primop {}»", p.name).unwrap(),
        Value::PrimOpApp(_) => out.push_str("«partially applied primop»"),
        Value::Thunk(_) => out.push_str("«thunk»"),
        Value::External(ext) => out.push_str(&ext.print()),
    }
    Ok(())
}

fn print_attr_name(name: Symbol, out: &mut String) {
    name.with_str(|s| {
        let plain = !s.is_empty()
            && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-'))
            && !is_keyword(s);
        if plain {
            out.push_str(s);
        } else {
            print_string(s, out);
        }
    });
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "if" | "then" | "else" | "assert" | "with" | "let" | "in" | "rec" | "inherit" | "or"
    )
}

/// Quote and escape a string so it re-parses to the same text.
fn print_string(text: &str, out: &mut String) {
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out.push('"');
}

/// Floats always print with a decimal point (or exponent) so the text
/// re-parses as a float.
pub fn fmt_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_float() {
        assert_eq!(fmt_float(3.0), "3.0");
        assert_eq!(fmt_float(3.25), "3.25");
        assert_eq!(fmt_float(-0.5), "-0.5");
    }

    #[test]
    fn test_print_string_escapes() {
        let mut out = String::new();
        print_string("a\"b\\c\nd${e}", &mut out);
        assert_eq!(out, r#""a\"b\\c\nd\${e}""#);
    }

    #[test]
    fn test_print_simple_values() {
        let ctx = EvalContext::default();
        let opts = PrintOptions::default();
        assert_eq!(print_value(&ctx, &Value::Int(42), opts).unwrap(), "42");
        assert_eq!(print_value(&ctx, &Value::Null, opts).unwrap(), "null");
        assert_eq!(
            print_value(&ctx, &Value::list(vec![Value::Int(1), Value::Int(2)]), opts).unwrap(),
            "[ 1 2 ]"
        );
    }
}
