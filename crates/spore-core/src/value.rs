use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{ExprRef, LambdaExpr};
use crate::bindings::Bindings;
use crate::context::EvalContext;
use crate::env::Env;
use crate::error::{EvalResult, SporeError};
use crate::pos::PosIdx;

// ── String context ────────────────────────────────────────────────

/// One store reference carried by a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextElem {
    /// A plain store path the string refers to.
    Opaque(String),
    /// An output of a derivation that is yet to be built.
    Built { drv: String, output: String },
    /// The full runtime closure of a derivation.
    DeepClosure(String),
}

impl ContextElem {
    /// Render to the marked string form used by the context primops:
    /// `!output!drvpath`, `=drvpath`, or a plain store path.
    pub fn render(&self) -> String {
        match self {
            ContextElem::Opaque(p) => p.clone(),
            ContextElem::Built { drv, output } => format!("!{output}!{drv}"),
            ContextElem::DeepClosure(drv) => format!("={drv}"),
        }
    }

    /// Inverse of `render`.
    pub fn parse(s: &str) -> Result<ContextElem, SporeError> {
        if let Some(rest) = s.strip_prefix('!') {
            match rest.split_once('!') {
                Some((output, drv)) if !output.is_empty() && !drv.is_empty() => {
                    Ok(ContextElem::Built {
                        drv: drv.to_string(),
                        output: output.to_string(),
                    })
                }
                _ => Err(SporeError::eval(
                    format!("invalid string context element '{s}'"),
                    crate::pos::NO_POS,
                )),
            }
        } else if let Some(drv) = s.strip_prefix('=') {
            Ok(ContextElem::DeepClosure(drv.to_string()))
        } else if s.is_empty() {
            Err(SporeError::eval(
                "invalid empty string context element",
                crate::pos::NO_POS,
            ))
        } else {
            Ok(ContextElem::Opaque(s.to_string()))
        }
    }
}

/// The set of store references implied by a string. Contexts merge by set
/// union whenever strings are concatenated, interpolated, or coerced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringContext(BTreeSet<ContextElem>);

impl StringContext {
    pub fn new() -> Self {
        StringContext(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, elem: ContextElem) {
        self.0.insert(elem);
    }

    pub fn extend_from(&mut self, other: &StringContext) {
        for elem in &other.0 {
            self.0.insert(elem.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextElem> {
        self.0.iter()
    }
}

// ── Value payloads ────────────────────────────────────────────────

/// A string payload: text plus the store references it carries.
#[derive(Debug, Clone)]
pub struct StringValue {
    pub text: String,
    pub context: StringContext,
}

impl StringValue {
    pub fn new(text: impl Into<String>) -> Self {
        StringValue {
            text: text.into(),
            context: StringContext::new(),
        }
    }

    pub fn with_context(text: impl Into<String>, context: StringContext) -> Self {
        StringValue {
            text: text.into(),
            context,
        }
    }
}

/// A lambda closed over its defining environment.
#[derive(Debug)]
pub struct Closure {
    pub lambda: Rc<LambdaExpr>,
    pub env: Env,
}

/// The native function behind a primop. Receives the evaluation context,
/// the call position, and exactly `arity` argument values.
pub type PrimOpFn = Box<dyn Fn(&EvalContext, PosIdx, &[Value]) -> EvalResult>;

/// A built-in function. Arity is at least 1; zero-argument builtins are
/// registered as unary primops applied to a sentinel, which gives them
/// thunk semantics.
pub struct PrimOp {
    pub name: String,
    pub arity: usize,
    pub doc: Option<&'static str>,
    pub func: PrimOpFn,
}

impl fmt::Debug for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<primop {}>", self.name)
    }
}

/// A partial primop application. Chains are left-biased: the leftmost leaf
/// of `func` is always a `PrimOp`, and walking the left spine yields the
/// accumulated arguments in order.
#[derive(Debug)]
pub struct PrimOpApp {
    pub func: Value,
    pub arg: Value,
}

/// Hook for host-defined values.
pub trait ExternalValue: fmt::Debug {
    /// Type name for diagnostics, e.g. `"an external value"`.
    fn show_type(&self) -> &'static str;
    /// Printable rendering.
    fn print(&self) -> String;
    /// Equality against another external value.
    fn eq_external(&self, other: &dyn ExternalValue) -> bool;
    /// String coercion, if this external supports it.
    fn coerce_to_string(&self, context: &mut StringContext) -> Option<String>;
}

// ── Thunks ────────────────────────────────────────────────────────

/// The state of a lazily evaluated cell.
///
/// `Suspended` and `App` transition through `Blackhole` to `Forced` exactly
/// once; observing `Blackhole` during forcing signals infinite recursion.
/// A failed forcing parks the error in `Failed` so every later force
/// re-raises the same kind at the same position.
#[derive(Debug)]
pub enum ThunkState {
    Suspended { env: Env, expr: ExprRef },
    App { func: Value, arg: Value },
    Blackhole,
    Forced(Value),
    Failed(Rc<SporeError>),
}

/// A shared, interior-mutable thunk cell.
#[derive(Clone, Debug)]
pub struct Thunk(Rc<RefCell<ThunkState>>);

impl Thunk {
    pub fn suspended(env: Env, expr: ExprRef) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Suspended { env, expr })))
    }

    pub fn deferred_app(func: Value, arg: Value) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::App { func, arg })))
    }

    pub fn ptr_eq(&self, other: &Thunk) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the cell, for identity sets in deep forcing.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn is_forced(&self) -> bool {
        matches!(&*self.0.borrow(), ThunkState::Forced(_))
    }

    /// The forced value, if forcing already happened.
    pub fn forced_value(&self) -> Option<Value> {
        match &*self.0.borrow() {
            ThunkState::Forced(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Borrow the state (the forcing engine drives the transitions).
    pub fn state(&self) -> std::cell::Ref<'_, ThunkState> {
        self.0.borrow()
    }

    /// Swap in a new state, returning the previous one.
    pub fn replace_state(&self, state: ThunkState) -> ThunkState {
        self.0.replace(state)
    }

    /// The source position of a suspended thunk, for blackhole reporting.
    pub fn suspended_pos(&self) -> PosIdx {
        match &*self.0.borrow() {
            ThunkState::Suspended { expr, .. } => expr.pos(),
            _ => crate::pos::NO_POS,
        }
    }
}

// ── The value union ───────────────────────────────────────────────

/// A runtime value in weak-head normal form, or a thunk that will become
/// one. Cloning is cheap: payloads are reference-counted.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    String(Rc<StringValue>),
    Path(Rc<PathBuf>),
    List(Rc<Vec<Value>>),
    Attrs(Rc<Bindings>),
    Lambda(Rc<Closure>),
    PrimOp(Rc<PrimOp>),
    PrimOpApp(Rc<PrimOpApp>),
    Thunk(Thunk),
    External(Rc<dyn ExternalValue>),
}

impl Value {
    // -- constructors --

    pub fn string(text: impl Into<String>) -> Value {
        Value::String(Rc::new(StringValue::new(text)))
    }

    pub fn string_with_context(text: impl Into<String>, context: StringContext) -> Value {
        Value::String(Rc::new(StringValue::with_context(text, context)))
    }

    pub fn path(p: impl Into<PathBuf>) -> Value {
        Value::Path(Rc::new(p.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn attrs(bindings: Bindings) -> Value {
        Value::Attrs(Rc::new(bindings))
    }

    pub fn thunk(env: Env, expr: ExprRef) -> Value {
        Value::Thunk(Thunk::suspended(env, expr))
    }

    // -- inspection --

    /// Human-readable type description used in diagnostics.
    pub fn show_type(&self) -> &'static str {
        match self {
            Value::Int(_) => "an integer",
            Value::Float(_) => "a float",
            Value::Bool(_) => "a Boolean",
            Value::Null => "null",
            Value::String(_) => "a string",
            Value::Path(_) => "a path",
            Value::List(_) => "a list",
            Value::Attrs(_) => "a set",
            Value::Lambda(_) => "a function",
            Value::PrimOp(_) => "a built-in function",
            Value::PrimOpApp(_) => "a partially applied built-in function",
            Value::Thunk(_) => "a thunk",
            Value::External(ext) => ext.show_type(),
        }
    }

    /// The `builtins.typeOf` name. Thunks must be forced before asking.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Attrs(_) => "set",
            Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp(_) => "lambda",
            Value::Thunk(_) => "thunk",
            Value::External(_) => "external",
        }
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, Value::Thunk(_))
    }

    /// True for every callable shape except functor attribute sets.
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp(_)
        )
    }

    /// Reference identity: same payload allocation (or same thunk cell).
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::String(x), Value::String(y)) => Rc::ptr_eq(x, y),
            (Value::Path(x), Value::Path(y)) => Rc::ptr_eq(x, y),
            (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
            (Value::Attrs(x), Value::Attrs(y)) => Rc::ptr_eq(x, y),
            (Value::Lambda(x), Value::Lambda(y)) => Rc::ptr_eq(x, y),
            (Value::PrimOp(x), Value::PrimOp(y)) => Rc::ptr_eq(x, y),
            (Value::PrimOpApp(x), Value::PrimOpApp(y)) => Rc::ptr_eq(x, y),
            (Value::Thunk(x), Value::Thunk(y)) => x.ptr_eq(y),
            _ => false,
        }
    }

    /// Stable address of the payload, for identity sets. Immediate values
    /// have no address.
    pub fn addr(&self) -> Option<usize> {
        match self {
            Value::String(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Path(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::List(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Attrs(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Lambda(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::PrimOp(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::PrimOpApp(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Thunk(t) => Some(t.addr()),
            Value::External(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            _ => None,
        }
    }

    /// The position most representative of this value, for error reporting.
    pub fn determine_pos(&self, fallback: PosIdx) -> PosIdx {
        match self {
            Value::Attrs(attrs) => attrs.pos().or(fallback),
            Value::Lambda(closure) => closure.lambda.pos.or(fallback),
            Value::Thunk(t) => t.suspended_pos().or(fallback),
            _ => fallback,
        }
    }

    // -- accessors (no forcing; callers force first) --

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&Rc<StringValue>> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_attrs(&self) -> Option<&Rc<Bindings>> {
        match self {
            Value::Attrs(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<Vec<Value>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_value() {
        // Tag plus one pointer-sized payload.
        assert!(std::mem::size_of::<Value>() <= 24);
    }

    #[test]
    fn test_context_elem_roundtrip() {
        let elems = [
            ContextElem::Opaque("/store/abc-x".into()),
            ContextElem::Built {
                drv: "/store/abc-x.drv".into(),
                output: "out".into(),
            },
            ContextElem::DeepClosure("/store/abc-x.drv".into()),
        ];
        for elem in elems {
            assert_eq!(ContextElem::parse(&elem.render()).unwrap(), elem);
        }
    }

    #[test]
    fn test_context_elem_parse_rejects_malformed() {
        assert!(ContextElem::parse("").is_err());
        assert!(ContextElem::parse("!noclosingbang").is_err());
        assert!(ContextElem::parse("!!").is_err());
    }

    #[test]
    fn test_context_union() {
        let mut a = StringContext::new();
        a.insert(ContextElem::Opaque("/store/a".into()));
        let mut b = StringContext::new();
        b.insert(ContextElem::Opaque("/store/a".into()));
        b.insert(ContextElem::Opaque("/store/b".into()));
        a.extend_from(&b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_ptr_eq_shares_payload() {
        let s = Value::string("hello");
        let t = s.clone();
        assert!(Value::ptr_eq(&s, &t));
        assert!(!Value::ptr_eq(&s, &Value::string("hello")));
    }

    #[test]
    fn test_show_type() {
        assert_eq!(Value::Int(1).show_type(), "an integer");
        assert_eq!(Value::Null.show_type(), "null");
        assert_eq!(Value::list(vec![]).show_type(), "a list");
    }
}
