//! Core data model for the spore language.
//!
//! Everything the parser produces and the evaluator consumes lives here:
//! interned symbols, the position table, the AST, the value union with
//! its thunk cells, sorted attribute bindings, environment frames, string
//! contexts, errors, the evaluation context, and the external store and
//! sandbox interfaces.

pub mod ast;
pub mod bindings;
pub mod context;
pub mod env;
pub mod error;
pub mod pos;
pub mod sandbox;
pub mod store;
pub mod symbol;
pub mod value;

pub use bindings::{Attr, Bindings, BindingsBuilder};
pub use context::{
    EvalConfig, EvalContext, EvalStats, SearchPathEntry, StatsSnapshot, TraceFrame,
};
pub use env::{Env, EnvKind};
pub use error::{best_matches, ErrorKind, EvalResult, SporeError, TraceItem};
pub use pos::{add_pos, register_origin, resolve_pos, show_pos, Origin, OriginId, Pos, PosIdx, NO_POS};
pub use sandbox::PathSandbox;
pub use store::{Derivation, Fetcher, IngestMethod, SimpleStore, Store, StorePath};
pub use symbol::{symbol_count, Symbol};
pub use value::{
    Closure, ContextElem, ExternalValue, PrimOp, PrimOpApp, PrimOpFn, StringContext, StringValue,
    Thunk, ThunkState, Value,
};

/// Default module filename appended when an import target is a directory.
pub const DEFAULT_MODULE_FILE: &str = "default.spore";

/// Search-path prefix reserved for the bundled core modules.
pub const CORE_MODULES_PREFIX: &str = "spore";

/// Reported by `builtins.langVersion`.
pub const LANG_VERSION: i64 = 6;
