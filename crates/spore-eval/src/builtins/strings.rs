use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use regex::Regex;

use spore_core::bindings::BindingsBuilder;
use spore_core::symbol::Symbol;
use spore_core::value::{StringContext, Value};
use spore_core::SporeError;

use crate::coerce::{coerce_to_string, CoerceOpts};
use crate::force::{force_int, force_list, force_string};

use super::Registry;

// Compiled patterns are cached per thread; expressions routinely match
// with the same regex in a tight loop.
thread_local! {
    static REGEX_CACHE: RefCell<hashbrown::HashMap<String, Rc<Regex>>> =
        RefCell::new(hashbrown::HashMap::new());
}

fn compile_regex(pattern: &str, pos: spore_core::PosIdx) -> Result<Rc<Regex>, SporeError> {
    REGEX_CACHE.with(|cache| {
        if let Some(re) = cache.borrow().get(pattern) {
            return Ok(Rc::clone(re));
        }
        // The original dialect uses POSIX EREs anchored by the caller;
        // anchor `match` at both ends explicitly where needed.
        let re = Regex::new(pattern).map_err(|e| {
            SporeError::eval(format!("invalid regular expression '{pattern}': {e}"), pos)
        })?;
        let re = Rc::new(re);
        cache.borrow_mut().insert(pattern.to_string(), Rc::clone(&re));
        Ok(re)
    })
}

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "toString",
        1,
        Some("Render a value as a string, keeping any store references."),
        |ctx, pos, args| {
            let mut context = StringContext::new();
            let text = coerce_to_string(
                ctx,
                pos,
                &args[0],
                &mut context,
                CoerceOpts {
                    coerce_more: true,
                    copy_to_store: false,
                },
            )
            .map_err(|e| e.add_trace(pos, "while evaluating the argument of 'toString'"))?;
            Ok(Value::string_with_context(text, context))
        },
    );

    reg.add_primop("__stringLength", 1, None, |ctx, pos, args| {
        let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'stringLength'")?;
        Ok(Value::Int(s.text.len() as i64))
    });

    reg.add_primop(
        "__substring",
        3,
        Some("Byte slice [start, start + len) of a string; negative len means the rest."),
        |ctx, pos, args| {
            let start = force_int(ctx, &args[0], pos, "while evaluating the first argument of 'substring'")?;
            let len = force_int(ctx, &args[1], pos, "while evaluating the second argument of 'substring'")?;
            let s = force_string(ctx, &args[2], pos, "while evaluating the third argument of 'substring'")?;
            if start < 0 {
                return Err(SporeError::eval("negative start position in 'substring'", pos));
            }
            let bytes = s.text.as_bytes();
            let begin = (start as usize).min(bytes.len());
            let end = if len < 0 {
                bytes.len()
            } else {
                begin.saturating_add(len as usize).min(bytes.len())
            };
            let text = String::from_utf8_lossy(&bytes[begin..end]).into_owned();
            Ok(Value::string_with_context(text, s.context.clone()))
        },
    );

    reg.add_primop(
        "__concatStringsSep",
        2,
        Some("Join a list of strings with a separator, merging contexts."),
        |ctx, pos, args| {
            let sep = force_string(ctx, &args[0], pos, "while evaluating the separator of 'concatStringsSep'")?;
            let items = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'concatStringsSep'")?;
            let mut context = sep.context.clone();
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(&sep.text);
                }
                let piece = coerce_to_string(
                    ctx,
                    pos,
                    item,
                    &mut context,
                    CoerceOpts {
                        coerce_more: false,
                        copy_to_store: false,
                    },
                )?;
                out.push_str(&piece);
            }
            Ok(Value::string_with_context(out, context))
        },
    );

    reg.add_primop(
        "__replaceStrings",
        3,
        Some("Replace occurrences of each pattern with the matching replacement, left to right."),
        |ctx, pos, args| {
            let from_list = force_list(ctx, &args[0], pos, "while evaluating the first argument of 'replaceStrings'")?;
            let to_list = force_list(ctx, &args[1], pos, "while evaluating the second argument of 'replaceStrings'")?;
            if from_list.len() != to_list.len() {
                return Err(SporeError::eval(
                    "'replaceStrings' expects lists of equal length",
                    pos,
                ));
            }
            let s = force_string(ctx, &args[2], pos, "while evaluating the third argument of 'replaceStrings'")?;

            let mut froms = Vec::with_capacity(from_list.len());
            for f in from_list.iter() {
                froms.push(force_string(ctx, f, pos, "while evaluating a pattern in 'replaceStrings'")?);
            }
            let mut tos = Vec::with_capacity(to_list.len());
            for t in to_list.iter() {
                tos.push(force_string(ctx, t, pos, "while evaluating a replacement in 'replaceStrings'")?);
            }

            let bytes = s.text.as_bytes();
            let mut context = s.context.clone();
            let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
            let mut i = 0;
            while i <= bytes.len() {
                let mut replaced = false;
                for (from, to) in froms.iter().zip(tos.iter()) {
                    let pat = from.text.as_bytes();
                    if bytes[i..].starts_with(pat) {
                        out.extend_from_slice(to.text.as_bytes());
                        context.extend_from(&to.context);
                        replaced = true;
                        if pat.is_empty() {
                            // The empty pattern matches at every position;
                            // copy one byte through and continue.
                            if i < bytes.len() {
                                out.push(bytes[i]);
                            }
                            i += 1;
                        } else {
                            i += pat.len();
                        }
                        break;
                    }
                }
                if !replaced {
                    if i < bytes.len() {
                        out.push(bytes[i]);
                    }
                    i += 1;
                }
            }
            let text = String::from_utf8_lossy(&out).into_owned();
            Ok(Value::string_with_context(text, context))
        },
    );

    reg.add_primop(
        "__match",
        2,
        Some("Match a whole string against a regex: null, or the list of capture groups."),
        |ctx, pos, args| {
            let pattern = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'match'")?;
            let s = force_string(ctx, &args[1], pos, "while evaluating the second argument of 'match'")?;
            let re = compile_regex(&format!("^(?:{})$", pattern.text), pos)?;
            match re.captures(&s.text) {
                None => Ok(Value::Null),
                Some(caps) => Ok(Value::list(
                    caps.iter()
                        .skip(1)
                        .map(|group| match group {
                            Some(m) => Value::string(m.as_str()),
                            None => Value::Null,
                        })
                        .collect(),
                )),
            }
        },
    );

    reg.add_primop(
        "__split",
        2,
        Some("Split on a regex, alternating unmatched text and capture-group lists."),
        |ctx, pos, args| {
            let pattern = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'split'")?;
            let s = force_string(ctx, &args[1], pos, "while evaluating the second argument of 'split'")?;
            let re = compile_regex(&pattern.text, pos)?;
            let mut out = Vec::new();
            let mut last = 0;
            for caps in re.captures_iter(&s.text) {
                let whole = caps.get(0).expect("capture 0 is the whole match");
                out.push(Value::string(&s.text[last..whole.start()]));
                out.push(Value::list(
                    caps.iter()
                        .skip(1)
                        .map(|group| match group {
                            Some(m) => Value::string(m.as_str()),
                            None => Value::Null,
                        })
                        .collect(),
                ));
                last = whole.end();
                if whole.start() == whole.end() {
                    // Zero-width match; avoid spinning in place.
                    break;
                }
            }
            out.push(Value::string(&s.text[last..]));
            Ok(Value::list(out))
        },
    );

    reg.add_primop(
        "__splitVersion",
        1,
        Some("Split a version string into numeric and alphabetic components."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'splitVersion'")?;
            Ok(Value::list(
                split_version(&s.text).into_iter().map(Value::string).collect(),
            ))
        },
    );

    reg.add_primop(
        "__compareVersions",
        2,
        Some("Compare two version strings: -1, 0, or 1."),
        |ctx, pos, args| {
            let a = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'compareVersions'")?;
            let b = force_string(ctx, &args[1], pos, "while evaluating the second argument of 'compareVersions'")?;
            let result = match compare_versions(&a.text, &b.text) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            Ok(Value::Int(result))
        },
    );

    reg.add_primop(
        "__parseDrvName",
        1,
        Some("Split a package name into { name, version } at the last dash before a digit."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'parseDrvName'")?;
            let (name, version) = parse_drv_name(&s.text);
            let mut builder = BindingsBuilder::new(2);
            builder.insert(Symbol::intern("name"), Value::string(name), pos);
            builder.insert(Symbol::intern("version"), Value::string(version), pos);
            Ok(Value::attrs(builder.finish()))
        },
    );
}

/// Version components: maximal runs of digits or of letters; separators
/// vanish.
fn split_version(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_numeric = false;
    for c in s.chars() {
        if c == '.' || c == '-' || c == '_' {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            continue;
        }
        let numeric = c.is_ascii_digit();
        if !cur.is_empty() && numeric != cur_numeric {
            out.push(std::mem::take(&mut cur));
        }
        cur_numeric = numeric;
        cur.push(c);
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let av = split_version(a);
    let bv = split_version(b);
    let len = av.len().max(bv.len());
    for i in 0..len {
        let x = av.get(i).map(String::as_str).unwrap_or("");
        let y = bv.get(i).map(String::as_str).unwrap_or("");
        let ord = compare_component(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// `pre` sorts before everything; numbers sort after non-numbers; two
/// numbers compare numerically.
fn compare_component(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => {
            if a == "pre" {
                Ordering::Less
            } else if b == "pre" {
                Ordering::Greater
            } else {
                match (a.parse::<i64>().is_ok(), b.parse::<i64>().is_ok()) {
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => a.cmp(b),
                }
            }
        }
    }
}

fn parse_drv_name(s: &str) -> (String, String) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-'
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_digit()
        {
            return (s[..i].to_string(), s[i + 1..].to_string());
        }
        i += 1;
    }
    (s.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_version() {
        assert_eq!(split_version("1.2.3"), vec!["1", "2", "3"]);
        assert_eq!(split_version("1.2a.3"), vec!["1", "2", "a", "3"]);
        assert_eq!(split_version("2.0-pre1"), vec!["2", "0", "pre", "1"]);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0", "1.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0-pre", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("2.3a", "2.3"), Ordering::Greater);
    }

    #[test]
    fn test_parse_drv_name() {
        assert_eq!(
            parse_drv_name("hello-2.12"),
            ("hello".to_string(), "2.12".to_string())
        );
        assert_eq!(
            parse_drv_name("gcc-wrapper-13.2"),
            ("gcc-wrapper".to_string(), "13.2".to_string())
        );
        assert_eq!(parse_drv_name("plain"), ("plain".to_string(), String::new()));
    }
}
