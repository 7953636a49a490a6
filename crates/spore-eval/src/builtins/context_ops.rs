use std::collections::BTreeMap;

use spore_core::bindings::BindingsBuilder;
use spore_core::symbol::Symbol;
use spore_core::value::{ContextElem, StringContext, Value};
use spore_core::SporeError;

use crate::force::{force_attrs, force_bool, force_list, force_string};

use super::Registry;

// ── String-context primops ────────────────────────────────────────
//
// The evaluator never interprets contexts, it only threads them; these
// primops expose them for derivation-building code. The exchange format
// maps each referenced path to `{ path?, allOutputs?, outputs? }`.

#[derive(Default)]
struct ContextInfo {
    path: bool,
    all_outputs: bool,
    outputs: Vec<String>,
}

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "__getContext",
        1,
        Some("The store references of a string, grouped per referenced path."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'getContext'")?;
            let mut grouped: BTreeMap<String, ContextInfo> = BTreeMap::new();
            for elem in s.context.iter() {
                match elem {
                    ContextElem::Opaque(p) => grouped.entry(p.clone()).or_default().path = true,
                    ContextElem::Built { drv, output } => grouped
                        .entry(drv.clone())
                        .or_default()
                        .outputs
                        .push(output.clone()),
                    ContextElem::DeepClosure(drv) => {
                        grouped.entry(drv.clone()).or_default().all_outputs = true
                    }
                }
            }
            let mut builder = BindingsBuilder::new(grouped.len());
            for (path, info) in grouped {
                let mut inner = BindingsBuilder::new(3);
                if info.path {
                    inner.insert(Symbol::intern("path"), Value::Bool(true), pos);
                }
                if info.all_outputs {
                    inner.insert(Symbol::intern("allOutputs"), Value::Bool(true), pos);
                }
                if !info.outputs.is_empty() {
                    let mut outputs = info.outputs;
                    outputs.sort();
                    inner.insert(
                        Symbol::intern("outputs"),
                        Value::list(outputs.into_iter().map(Value::string).collect()),
                        pos,
                    );
                }
                builder.insert(Symbol::intern(&path), Value::attrs(inner.finish()), pos);
            }
            Ok(Value::attrs(builder.finish()))
        },
    );

    reg.add_primop("__hasContext", 1, None, |ctx, pos, args| {
        let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'hasContext'")?;
        Ok(Value::Bool(!s.context.is_empty()))
    });

    reg.add_primop(
        "__unsafeDiscardStringContext",
        1,
        Some("The same text with an empty context."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the argument of 'unsafeDiscardStringContext'")?;
            Ok(Value::string(s.text.clone()))
        },
    );

    reg.add_primop(
        "__appendContext",
        2,
        Some("Attach additional store references, in the getContext exchange format."),
        |ctx, pos, args| {
            let s = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'appendContext'")?;
            let added = force_attrs(ctx, &args[1], pos, "while evaluating the second argument of 'appendContext'")?;

            let mut context = s.context.clone();
            let path_sym = Symbol::intern("path");
            let all_sym = Symbol::intern("allOutputs");
            let outputs_sym = Symbol::intern("outputs");

            for entry in added.iter() {
                let path = entry.name.resolve();
                let info = force_attrs(ctx, &entry.value, pos, "while evaluating a context entry")?;
                if let Some(flag) = info.get(path_sym) {
                    if force_bool(ctx, &flag.value, pos, "while evaluating the 'path' flag")? {
                        context.insert(ContextElem::Opaque(path.clone()));
                    }
                }
                if let Some(flag) = info.get(all_sym) {
                    if force_bool(ctx, &flag.value, pos, "while evaluating the 'allOutputs' flag")? {
                        context.insert(ContextElem::DeepClosure(path.clone()));
                    }
                }
                if let Some(outputs) = info.get(outputs_sym) {
                    let outputs = force_list(ctx, &outputs.value, pos, "while evaluating the 'outputs' list")?;
                    for output in outputs.iter() {
                        let output = force_string(ctx, output, pos, "while evaluating an output name")?;
                        if output.text.is_empty() {
                            return Err(SporeError::eval("empty output name in string context", pos));
                        }
                        context.insert(ContextElem::Built {
                            drv: path.clone(),
                            output: output.text.clone(),
                        });
                    }
                }
            }
            Ok(Value::String(std::rc::Rc::new(
                spore_core::StringValue::with_context(s.text.clone(), context),
            )))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_info_default_is_empty() {
        let info = ContextInfo::default();
        assert!(!info.path && !info.all_outputs && info.outputs.is_empty());
    }

    #[test]
    fn test_context_grouping_shapes() {
        let mut context = StringContext::new();
        context.insert(ContextElem::Opaque("/spore/store/a-x".into()));
        context.insert(ContextElem::Built {
            drv: "/spore/store/b-y.drv".into(),
            output: "out".into(),
        });
        context.insert(ContextElem::Built {
            drv: "/spore/store/b-y.drv".into(),
            output: "dev".into(),
        });
        let mut grouped: BTreeMap<String, ContextInfo> = BTreeMap::new();
        for elem in context.iter() {
            match elem {
                ContextElem::Opaque(p) => grouped.entry(p.clone()).or_default().path = true,
                ContextElem::Built { drv, output } => grouped
                    .entry(drv.clone())
                    .or_default()
                    .outputs
                    .push(output.clone()),
                ContextElem::DeepClosure(drv) => {
                    grouped.entry(drv.clone()).or_default().all_outputs = true
                }
            }
        }
        assert!(grouped["/spore/store/a-x"].path);
        assert_eq!(grouped["/spore/store/b-y.drv"].outputs.len(), 2);
    }
}
