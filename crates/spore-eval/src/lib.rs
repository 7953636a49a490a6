//! Lazy evaluator for the spore language.
//!
//! The crate is a library of free functions over [`EvalContext`]
//! (forcing, application, coercion, equality, search-path and import
//! resolution) plus the [`Evaluator`] facade that seals the root
//! environment, owns the builtin registry, and exposes the host API.

pub mod apply;
pub mod builtins;
pub mod coerce;
pub mod compare;
pub mod eval;
pub mod force;
pub mod imports;
pub mod print;
pub mod search_path;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use spore_core::bindings::BindingsBuilder;
use spore_core::context::{EvalConfig, EvalContext, StatsSnapshot};
use spore_core::env::Env;
use spore_core::error::{EvalResult, SporeError};
use spore_core::pos::{Origin, PosIdx, NO_POS};
use spore_core::store::{Fetcher, SimpleStore, Store};
use spore_core::symbol::Symbol;
use spore_core::value::{PrimOpFn, Value};

pub use builtins::Registry;
pub use print::PrintOptions;

/// One evaluator instance: configuration, caches, statistics, and the
/// sealed root environment. Strictly single-threaded; instances share
/// nothing with each other.
pub struct Evaluator {
    ctx: Rc<EvalContext>,
    pending: RefCell<Option<Registry>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::with_parts(EvalConfig::default(), Rc::new(SimpleStore::default()), None)
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Evaluator::with_parts(config, Rc::new(SimpleStore::default()), None)
    }

    pub fn with_parts(
        config: EvalConfig,
        store: Rc<dyn Store>,
        fetcher: Option<Rc<dyn Fetcher>>,
    ) -> Self {
        let ctx = Rc::new(EvalContext::new(config, store, fetcher));
        let mut registry = Registry::new();
        builtins::register_builtins(&mut registry);
        registry.add_constant(
            "__storeDir",
            Value::string(ctx.store.store_dir().display().to_string()),
        );
        Evaluator {
            ctx,
            pending: RefCell::new(Some(registry)),
        }
    }

    pub fn ctx(&self) -> &EvalContext {
        &self.ctx
    }

    /// Register an additional primop. Only possible before the first
    /// evaluation; the registry is closed when the root environment is
    /// sealed.
    pub fn add_primop(
        &self,
        name: &str,
        arity: usize,
        doc: Option<&'static str>,
        func: PrimOpFn,
    ) -> Result<(), SporeError> {
        match &mut *self.pending.borrow_mut() {
            Some(registry) => {
                registry.add_primop(name, arity, doc, move |ctx, pos, args| {
                    func(ctx, pos, args)
                });
                Ok(())
            }
            None => Err(SporeError::eval(
                "the primop registry is closed once evaluation has started",
                NO_POS,
            )),
        }
    }

    /// Build the root environment from the registry: every entry under
    /// its registered name, and `builtins` as an attribute set keyed by
    /// the names with any `__` prefix stripped.
    fn seal(&self) {
        let Some(registry) = self.pending.borrow_mut().take() else {
            return;
        };
        let entries = registry.into_entries();

        let mut builtins_builder = BindingsBuilder::new(entries.len());
        for (name, value) in &entries {
            let short = name.strip_prefix("__").unwrap_or(name);
            builtins_builder.insert(Symbol::intern(short), value.clone(), NO_POS);
        }
        let builtins_value = Value::attrs(builtins_builder.finish());

        let mut names: Vec<Symbol> = entries.iter().map(|(n, _)| Symbol::intern(n)).collect();
        names.push(Symbol::intern("builtins"));

        let env = Env::new(None, names.len());
        self.ctx
            .stats
            .envs_allocated
            .set(self.ctx.stats.envs_allocated.get() + 1);
        for (i, (_, value)) in entries.into_iter().enumerate() {
            env.set_slot(i as u32, value);
        }
        env.set_slot((names.len() - 1) as u32, builtins_value.clone());

        *self.ctx.root_names.borrow_mut() = names;
        *self.ctx.root_env.borrow_mut() = Some(env);
        *self.ctx.builtins.borrow_mut() = Some(builtins_value);
    }

    /// Look a builtin up by its `builtins` attribute name.
    pub fn get_builtin(&self, name: &str) -> Option<Value> {
        self.seal();
        let builtins = self.ctx.builtins.borrow();
        let Some(Value::Attrs(attrs)) = &*builtins else {
            return None;
        };
        attrs.get(Symbol::intern(name)).map(|a| a.value.clone())
    }

    /// Parse and evaluate a source string to weak-head normal form.
    pub fn eval_str(&self, source: &str) -> EvalResult {
        self.seal();
        let base = std::env::current_dir().unwrap_or_else(|_| "/".into());
        let expr = imports::parse_bound(&self.ctx, source, Origin::Text, &base)?;
        eval::eval(&self.ctx, &expr, &self.ctx.root_env())
    }

    /// Parse a source string against the root scope without evaluating.
    pub fn parse_str(&self, source: &str) -> Result<spore_core::ast::ExprRef, SporeError> {
        self.seal();
        let base = std::env::current_dir().unwrap_or_else(|_| "/".into());
        imports::parse_bound(&self.ctx, source, Origin::Text, &base)
    }

    /// Evaluate a pre-parsed, pre-bound expression.
    pub fn eval_expr(&self, expr: &spore_core::ast::ExprRef) -> EvalResult {
        self.seal();
        eval::eval(&self.ctx, expr, &self.ctx.root_env())
    }

    /// Import a module file through the caches and sandbox.
    pub fn eval_file(&self, path: &Path) -> EvalResult {
        self.seal();
        imports::import_file(&self.ctx, path, NO_POS)
    }

    pub fn force(&self, v: &Value, pos: PosIdx) -> EvalResult {
        force::force(&self.ctx, v, pos)
    }

    pub fn force_deep(&self, v: &Value) -> EvalResult {
        force::force_deep(&self.ctx, v, NO_POS)
    }

    pub fn print_value(&self, v: &Value, opts: PrintOptions) -> Result<String, SporeError> {
        print::print_value(&self.ctx, v, opts)
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spore_core::error::ErrorKind;

    fn eval_ok(src: &str) -> Value {
        let evaluator = Evaluator::new();
        evaluator
            .eval_str(src)
            .unwrap_or_else(|e| panic!("evaluation failed for `{src}`: {e}"))
    }

    fn eval_err(src: &str) -> SporeError {
        let evaluator = Evaluator::new();
        evaluator
            .eval_str(src)
            .err()
            .unwrap_or_else(|| panic!("expected an error for `{src}`"))
    }

    #[test]
    fn test_simple_arithmetic() {
        assert_eq!(eval_ok("1 + 2 * 3").as_int(), Some(7));
        assert_eq!(eval_ok("(1 + 2) * 3").as_int(), Some(9));
    }

    #[test]
    fn test_let_and_lambda() {
        assert_eq!(eval_ok("let f = x: x + 1; in f 41").as_int(), Some(42));
    }

    #[test]
    fn test_laziness_of_unused_bindings() {
        // The bad binding is never forced.
        assert_eq!(eval_ok("let bad = throw \"boom\"; x = 1; in x").as_int(), Some(1));
    }

    #[test]
    fn test_builtins_namespace() {
        assert_eq!(eval_ok("builtins.add 40 2").as_int(), Some(42));
        assert_eq!(eval_ok("__add 40 2").as_int(), Some(42));
    }

    #[test]
    fn test_get_builtin() {
        let evaluator = Evaluator::new();
        assert!(evaluator.get_builtin("tryEval").is_some());
        assert!(evaluator.get_builtin("no-such-builtin").is_none());
    }

    #[test]
    fn test_add_primop_before_seal() {
        let evaluator = Evaluator::new();
        evaluator
            .add_primop(
                "__answer",
                1,
                None,
                Box::new(|ctx, pos, args| {
                    crate::force::force(ctx, &args[0], pos)?;
                    Ok(Value::Int(42))
                }),
            )
            .unwrap();
        assert_eq!(evaluator.eval_str("__answer null").unwrap().as_int(), Some(42));
        // Registry closed after first evaluation.
        let err = evaluator
            .add_primop("__late", 1, None, Box::new(|_, _, _| Ok(Value::Null)))
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_undefined_variable_before_eval() {
        let err = eval_err("definitely-not-bound");
        assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_statistics_move() {
        let evaluator = Evaluator::new();
        evaluator.eval_str("let f = x: x; in f (f (f 1))").unwrap();
        let stats = evaluator.statistics();
        assert!(stats.function_calls >= 3);
        assert!(stats.envs_allocated >= 4);
    }

    #[test]
    fn test_print_round_trip_pure_data() {
        let evaluator = Evaluator::new();
        let v = evaluator
            .eval_str(r#"{ a = 1; b = [ true null "x\ny" ]; c = 1.5; }"#)
            .unwrap();
        let printed = evaluator.print_value(&v, PrintOptions::default()).unwrap();
        let reparsed = evaluator.eval_str(&printed).unwrap();
        let equal = crate::compare::eq_values(evaluator.ctx(), &v, &reparsed, NO_POS).unwrap();
        assert!(equal, "round-trip failed: {printed}");
    }

    #[test]
    fn test_force_idempotent() {
        let evaluator = Evaluator::new();
        let v = evaluator.eval_str("let x = { a = 1 + 1; }; in x").unwrap();
        let a1 = match &v {
            Value::Attrs(attrs) => attrs.get(Symbol::intern("a")).unwrap().value.clone(),
            other => panic!("expected attrs, got {other:?}"),
        };
        let f1 = evaluator.force(&a1, NO_POS).unwrap();
        let f2 = evaluator.force(&a1, NO_POS).unwrap();
        assert_eq!(f1.as_int(), Some(2));
        assert_eq!(f2.as_int(), Some(2));
    }

    #[test]
    fn test_failed_force_is_stable() {
        let evaluator = Evaluator::new();
        let v = evaluator
            .eval_str("{ bad = 1 + \"x\"; }")
            .unwrap();
        let bad = match &v {
            Value::Attrs(attrs) => attrs.get(Symbol::intern("bad")).unwrap().value.clone(),
            other => panic!("expected attrs, got {other:?}"),
        };
        let e1 = evaluator.force(&bad, NO_POS).unwrap_err();
        let e2 = evaluator.force(&bad, NO_POS).unwrap_err();
        assert_eq!(e1.kind(), e2.kind());
        assert_eq!(e1.pos(), e2.pos());
    }
}
