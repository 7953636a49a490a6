use std::rc::Rc;

use spore_core::context::EvalContext;
use spore_core::error::EvalResult;
use spore_core::pos::PosIdx;
use spore_core::value::{PrimOp, Value};
use spore_core::LANG_VERSION;

mod arith;
mod attrs;
mod context_ops;
mod control;
mod hash;
mod io;
mod json;
mod lists;
mod predicates;
mod strings;

// ── The primop registry ───────────────────────────────────────────
//
// Collected before the root environment is sealed. Every entry lands in
// the root environment under its registered name; names starting with
// `__` additionally appear in `builtins` under the shortened name.

pub struct Registry {
    entries: Vec<(String, Value)>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            entries: Vec::new(),
        }
    }

    pub fn add_constant(&mut self, name: &str, value: Value) {
        self.entries.push((name.to_string(), value));
    }

    pub fn add_primop(
        &mut self,
        name: &str,
        arity: usize,
        doc: Option<&'static str>,
        func: impl Fn(&EvalContext, PosIdx, &[Value]) -> EvalResult + 'static,
    ) {
        assert!(arity >= 1, "primop '{name}' must have arity >= 1");
        self.entries.push((
            name.to_string(),
            Value::PrimOp(Rc::new(PrimOp {
                name: name.to_string(),
                arity,
                doc,
                func: Box::new(func),
            })),
        ));
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

/// Everything a fresh evaluator starts with.
pub fn register_builtins(reg: &mut Registry) {
    reg.add_constant("true", Value::Bool(true));
    reg.add_constant("false", Value::Bool(false));
    reg.add_constant("null", Value::Null);
    reg.add_constant("__langVersion", Value::Int(LANG_VERSION));
    reg.add_constant("__currentSystem", Value::string(current_system()));

    arith::register(reg);
    attrs::register(reg);
    context_ops::register(reg);
    control::register(reg);
    hash::register(reg);
    io::register(reg);
    json::register(reg);
    lists::register(reg);
    predicates::register(reg);
    strings::register(reg);
}

fn current_system() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{os}", std::env::consts::ARCH)
}
