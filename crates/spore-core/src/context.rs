use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::ast::ExprRef;
use crate::env::Env;
use crate::error::SporeError;
use crate::pos::PosIdx;
use crate::sandbox::PathSandbox;
use crate::store::{Fetcher, SimpleStore, Store};
use crate::symbol::Symbol;
use crate::value::Value;

// ── Configuration ─────────────────────────────────────────────────

/// One search-path entry: `prefix=value` (empty prefix matches anything).
#[derive(Debug, Clone)]
pub struct SearchPathEntry {
    pub prefix: String,
    pub value: String,
}

impl SearchPathEntry {
    /// Parse the `prefix=value` / bare-path forms used on the command line.
    pub fn parse(s: &str) -> SearchPathEntry {
        match s.split_once('=') {
            Some((prefix, value)) => SearchPathEntry {
                prefix: prefix.to_string(),
                value: value.to_string(),
            },
            None => SearchPathEntry {
                prefix: String::new(),
                value: s.to_string(),
            },
        }
    }
}

/// Toggles fixed at evaluator construction.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub pure_eval: bool,
    pub restrict_eval: bool,
    pub allowed_paths: Vec<PathBuf>,
    pub allowed_uris: Vec<String>,
    pub max_call_depth: usize,
    pub trace_function_calls: bool,
    pub count_calls: bool,
    /// Push a debug-trace frame at every user-visible evaluation step
    /// rather than the reduced set.
    pub debug_mode: bool,
    pub search_path: Vec<SearchPathEntry>,
    /// Directory behind the built-in `spore/…` search-path prefix.
    pub core_modules_dir: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            pure_eval: false,
            restrict_eval: false,
            allowed_paths: Vec::new(),
            allowed_uris: Vec::new(),
            max_call_depth: 10_000,
            trace_function_calls: false,
            count_calls: false,
            debug_mode: false,
            search_path: Vec::new(),
            core_modules_dir: None,
        }
    }
}

// ── Statistics ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EvalStats {
    pub thunks_created: Cell<u64>,
    pub thunks_avoided: Cell<u64>,
    pub envs_allocated: Cell<u64>,
    pub list_concats: Cell<u64>,
    pub primop_calls: Cell<u64>,
    pub function_calls: Cell<u64>,
    pub attr_lookups: Cell<u64>,
    per_function: RefCell<hashbrown::HashMap<String, u64>>,
}

impl EvalStats {
    pub fn count_function_call(&self, name: &str) {
        let mut map = self.per_function.borrow_mut();
        *map.entry_ref(name).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            thunks_created: self.thunks_created.get(),
            thunks_avoided: self.thunks_avoided.get(),
            envs_allocated: self.envs_allocated.get(),
            list_concats: self.list_concats.get(),
            primop_calls: self.primop_calls.get(),
            function_calls: self.function_calls.get(),
            attr_lookups: self.attr_lookups.get(),
            symbols_interned: crate::symbol::symbol_count() as u64,
            per_function_calls: self
                .per_function
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

/// A point-in-time copy of the counters, serialisable for `--stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub thunks_created: u64,
    pub thunks_avoided: u64,
    pub envs_allocated: u64,
    pub list_concats: u64,
    pub primop_calls: u64,
    pub function_calls: u64,
    pub attr_lookups: u64,
    pub symbols_interned: u64,
    pub per_function_calls: BTreeMap<String, u64>,
}

// ── Debug trace stack ─────────────────────────────────────────────

/// One frame of the debug trace stack.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub pos: PosIdx,
    pub message: String,
    pub is_error: bool,
}

/// RAII guard pairing every trace push with a pop on all exits.
pub struct TraceGuard<'a> {
    ctx: &'a EvalContext,
}

impl Drop for TraceGuard<'_> {
    fn drop(&mut self) {
        self.ctx.trace_stack.borrow_mut().pop();
    }
}

/// RAII guard for the call-depth counter.
pub struct CallDepthGuard<'a> {
    ctx: &'a EvalContext,
}

impl fmt::Debug for CallDepthGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDepthGuard").finish()
    }
}

impl Drop for CallDepthGuard<'_> {
    fn drop(&mut self) {
        self.ctx.call_depth.set(self.ctx.call_depth.get() - 1);
    }
}

// ── Evaluation context ────────────────────────────────────────────

/// All per-evaluator state: configuration, caches, the debug trace
/// stack, statistics, the sandbox, and the sealed root environment.
///
/// A context is owned and driven by exactly one thread; coexisting
/// evaluators share nothing (the symbol and position tables are
/// thread-local and append-only, so sharing them within a thread is
/// harmless).
pub struct EvalContext {
    pub config: EvalConfig,
    pub sandbox: PathSandbox,
    pub store: Rc<dyn Store>,
    pub fetcher: Option<Rc<dyn Fetcher>>,

    pub parse_cache: RefCell<hashbrown::HashMap<PathBuf, ExprRef>>,
    pub eval_cache: RefCell<hashbrown::HashMap<PathBuf, Value>>,
    pub search_path_cache: RefCell<hashbrown::HashMap<String, Option<PathBuf>>>,

    pub trace_stack: RefCell<Vec<TraceFrame>>,
    pub call_depth: Cell<usize>,
    pub stats: EvalStats,

    /// Root environment, sealed before user evaluation begins.
    pub root_env: RefCell<Option<Env>>,
    /// Names of the root slots in displacement order, for static resolution.
    pub root_names: RefCell<Vec<Symbol>>,
    /// The `builtins` attribute set, for `get_builtin`.
    pub builtins: RefCell<Option<Value>>,

    interrupt: Arc<AtomicBool>,
}

impl EvalContext {
    pub fn new(config: EvalConfig, store: Rc<dyn Store>, fetcher: Option<Rc<dyn Fetcher>>) -> Self {
        let sandbox = if config.restrict_eval || config.pure_eval {
            PathSandbox::restricted(
                config.allowed_paths.clone(),
                config.allowed_uris.clone(),
                config.pure_eval,
            )
        } else {
            PathSandbox::unrestricted()
        };
        EvalContext {
            config,
            sandbox,
            store,
            fetcher,
            parse_cache: RefCell::new(hashbrown::HashMap::new()),
            eval_cache: RefCell::new(hashbrown::HashMap::new()),
            search_path_cache: RefCell::new(hashbrown::HashMap::new()),
            trace_stack: RefCell::new(Vec::new()),
            call_depth: Cell::new(0),
            stats: EvalStats::default(),
            root_env: RefCell::new(None),
            root_names: RefCell::new(Vec::new()),
            builtins: RefCell::new(None),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that can flip the interrupt flag from a signal handler.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Cooperative cancellation check, called inside potentially
    /// unbounded loops.
    pub fn check_interrupt(&self) -> Result<(), SporeError> {
        if self.interrupt.load(Ordering::Relaxed) {
            Err(SporeError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Push a debug-trace frame; the guard pops it on every exit path.
    pub fn push_trace(&self, pos: PosIdx, message: impl Into<String>) -> TraceGuard<'_> {
        self.trace_stack.borrow_mut().push(TraceFrame {
            pos,
            message: message.into(),
            is_error: false,
        });
        TraceGuard { ctx: self }
    }

    /// Enter a function call, guarding against host-stack exhaustion.
    pub fn enter_call(&self, pos: PosIdx) -> Result<CallDepthGuard<'_>, SporeError> {
        let depth = self.call_depth.get();
        if depth >= self.config.max_call_depth {
            return Err(SporeError::StackOverflow { pos });
        }
        self.call_depth.set(depth + 1);
        Ok(CallDepthGuard { ctx: self })
    }

    pub fn root_env(&self) -> Env {
        self.root_env
            .borrow()
            .clone()
            .expect("evaluation attempted before the root environment was sealed")
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        EvalContext::new(EvalConfig::default(), Rc::new(SimpleStore::default()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::NO_POS;

    #[test]
    fn test_depth_guard_restores() {
        let ctx = EvalContext::default();
        {
            let _g1 = ctx.enter_call(NO_POS).unwrap();
            let _g2 = ctx.enter_call(NO_POS).unwrap();
            assert_eq!(ctx.call_depth.get(), 2);
        }
        assert_eq!(ctx.call_depth.get(), 0);
    }

    #[test]
    fn test_depth_limit() {
        let mut config = EvalConfig::default();
        config.max_call_depth = 1;
        let ctx = EvalContext::new(config, Rc::new(SimpleStore::default()), None);
        let _g = ctx.enter_call(NO_POS).unwrap();
        let err = ctx.enter_call(NO_POS).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StackOverflow);
    }

    #[test]
    fn test_trace_guard_pops() {
        let ctx = EvalContext::default();
        {
            let _g = ctx.push_trace(NO_POS, "while testing");
            assert_eq!(ctx.trace_stack.borrow().len(), 1);
        }
        assert!(ctx.trace_stack.borrow().is_empty());
    }

    #[test]
    fn test_interrupt() {
        let ctx = EvalContext::default();
        assert!(ctx.check_interrupt().is_ok());
        ctx.interrupt_handle().store(true, Ordering::Relaxed);
        assert!(ctx.check_interrupt().is_err());
    }

    #[test]
    fn test_stats_snapshot() {
        let ctx = EvalContext::default();
        ctx.stats.thunks_created.set(5);
        ctx.stats.count_function_call("map");
        ctx.stats.count_function_call("map");
        let snap = ctx.stats.snapshot();
        assert_eq!(snap.thunks_created, 5);
        assert_eq!(snap.per_function_calls.get("map"), Some(&2));
    }
}
