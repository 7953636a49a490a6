use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::pos::PosIdx;
use crate::symbol::Symbol;

// ── Abstract syntax ───────────────────────────────────────────────
//
// Trees are produced by `spore-parse` and consumed by `spore-eval`.
// Every variable reference is pre-resolved by the binding pass into a
// (level, displacement) pair, or marked `from_with` for dynamic lookup
// through enclosing `with` frames; the evaluator performs no name
// resolution beyond that.

pub type ExprRef = Rc<Expr>;

/// A piece of a string or path literal: either literal text or an
/// interpolated `${…}` expression.
#[derive(Debug)]
pub enum StrPart {
    Lit(String),
    Interp(ExprRef),
}

/// How a path literal is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAnchor {
    /// `/absolute/path` — used verbatim.
    Absolute,
    /// `./relative` or `../relative` — resolved against the parse base path.
    Relative,
    /// `~/path` — resolved against the home directory.
    Home,
    /// `<prefix/rest>` — resolved through the search path at eval time.
    Search,
}

/// One component of an attribute path in a select or has-attr expression.
#[derive(Debug)]
pub enum AttrName {
    Static(Symbol),
    Dynamic(ExprRef),
}

/// A variable reference, resolved at parse time.
///
/// `level` counts environments to skip upward and `displ` indexes into the
/// frame. When `from_with` is set the pair is meaningless and the evaluator
/// instead searches enclosing `with` frames by name.
#[derive(Debug)]
pub struct ExprVar {
    pub name: Symbol,
    pub pos: PosIdx,
    pub level: Cell<u32>,
    pub displ: Cell<u32>,
    pub from_with: Cell<bool>,
}

impl ExprVar {
    pub fn new(name: Symbol, pos: PosIdx) -> Self {
        ExprVar {
            name,
            pos,
            level: Cell::new(0),
            displ: Cell::new(0),
            from_with: Cell::new(false),
        }
    }
}

/// A static (named-at-parse-time) attribute definition.
///
/// Displacement order within a recursive scope is the index in the
/// containing `attrs` vector. For `inherit x` the value expression is a
/// variable resolved in the *enclosing* scope; for `inherit (e) x` it is a
/// select on `e`. Both carry `inherited = true` so recursive attribute sets
/// evaluate them in the enclosing environment.
#[derive(Debug)]
pub struct AttrDef {
    pub name: Symbol,
    pub value: ExprRef,
    pub pos: PosIdx,
    pub inherited: bool,
}

/// A dynamic attribute definition: `${nameExpr} = value;`.
#[derive(Debug)]
pub struct DynamicAttrDef {
    pub name_expr: ExprRef,
    pub value: ExprRef,
    pub pos: PosIdx,
}

/// The body of an attribute-set literal or a `let` binder.
#[derive(Debug)]
pub struct AttrsExpr {
    pub recursive: bool,
    /// Static attributes in source order; the index is the displacement.
    pub attrs: Vec<AttrDef>,
    pub dynamic: Vec<DynamicAttrDef>,
    pub pos: PosIdx,
}

impl AttrsExpr {
    pub fn find(&self, name: Symbol) -> Option<(usize, &AttrDef)> {
        self.attrs
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }
}

/// One formal parameter of an attribute-pattern lambda.
#[derive(Debug)]
pub struct Formal {
    pub name: Symbol,
    pub default: Option<ExprRef>,
    pub pos: PosIdx,
}

/// The formal-pattern part of a lambda: `{ a, b ? 1, ... }`.
#[derive(Debug)]
pub struct Formals {
    pub formals: Vec<Formal>,
    pub ellipsis: bool,
}

impl Formals {
    pub fn has(&self, name: Symbol) -> bool {
        self.formals.iter().any(|f| f.name == name)
    }
}

/// A lambda: `x: body`, `{ a, b }: body`, or `args@{ a, ... }: body`.
///
/// Slot layout of the activation record: the `@`-name (if any) occupies
/// displacement 0, followed by the formals in declaration order. A plain
/// positional lambda has a single slot for its argument.
#[derive(Debug)]
pub struct LambdaExpr {
    /// Display name, filled in when the lambda is bound to an attribute.
    pub name: Cell<Option<Symbol>>,
    pub arg: Option<Symbol>,
    pub formals: Option<Formals>,
    pub body: ExprRef,
    pub pos: PosIdx,
}

impl LambdaExpr {
    pub fn display_name(&self) -> String {
        match self.name.get() {
            Some(sym) => format!("'{sym}'"),
            None => "anonymous lambda".to_string(),
        }
    }

    /// Number of slots in the activation record.
    pub fn env_size(&self) -> usize {
        let arg = usize::from(self.arg.is_some());
        let formals = self.formals.as_ref().map_or(0, |f| f.formals.len());
        // A positional lambda has an arg and no formals: exactly one slot.
        arg + formals
    }
}

/// Binary operators. String/path/number addition is its own node kind
/// (`Expr::ConcatStrings`) because its typing rule differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Impl,
    Update,
    ListConcat,
    Sub,
    Mul,
    Div,
}

/// An expression node. One evaluation rule exists per variant.
#[derive(Debug)]
pub enum Expr {
    Int {
        n: i64,
        pos: PosIdx,
    },
    Float {
        f: f64,
        pos: PosIdx,
    },
    /// A string literal, possibly with interpolated parts.
    Str {
        parts: Vec<StrPart>,
        pos: PosIdx,
    },
    /// A path literal; `base` carries the parse-time anchor text and any
    /// interpolated parts follow. Canonicalisation happens lazily at eval.
    Path {
        anchor: PathAnchor,
        base: PathBuf,
        parts: Vec<StrPart>,
        pos: PosIdx,
    },
    Var(ExprVar),
    Select {
        subject: ExprRef,
        path: Vec<AttrName>,
        or_default: Option<ExprRef>,
        pos: PosIdx,
    },
    HasAttr {
        subject: ExprRef,
        path: Vec<AttrName>,
        pos: PosIdx,
    },
    Attrs(AttrsExpr),
    List {
        items: Vec<ExprRef>,
        pos: PosIdx,
    },
    Lambda(Rc<LambdaExpr>),
    Call {
        func: ExprRef,
        args: Vec<ExprRef>,
        pos: PosIdx,
    },
    Let {
        bindings: AttrsExpr,
        body: ExprRef,
        pos: PosIdx,
    },
    With {
        namespace: ExprRef,
        body: ExprRef,
        pos: PosIdx,
    },
    If {
        cond: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
        pos: PosIdx,
    },
    Assert {
        cond: ExprRef,
        body: ExprRef,
        pos: PosIdx,
    },
    Not {
        expr: ExprRef,
        pos: PosIdx,
    },
    Negate {
        expr: ExprRef,
        pos: PosIdx,
    },
    BinOp {
        op: BinOp,
        lhs: ExprRef,
        rhs: ExprRef,
        pos: PosIdx,
    },
    /// `+`-chains and interpolation: the first operand's type decides the
    /// result (int, float, string with context, or path).
    ConcatStrings {
        /// True for string interpolation (`"…${e}…"`), which always yields
        /// a string; false for `a + b + c` chains.
        force_string: bool,
        parts: Vec<(PosIdx, ExprRef)>,
        pos: PosIdx,
    },
    /// `__curPos`: `{ file, line, column }` or null.
    CurPos {
        pos: PosIdx,
    },
}

impl Expr {
    /// The position most representative of this node.
    pub fn pos(&self) -> PosIdx {
        match self {
            Expr::Int { pos, .. }
            | Expr::Float { pos, .. }
            | Expr::Str { pos, .. }
            | Expr::Path { pos, .. }
            | Expr::Select { pos, .. }
            | Expr::HasAttr { pos, .. }
            | Expr::List { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Let { pos, .. }
            | Expr::With { pos, .. }
            | Expr::If { pos, .. }
            | Expr::Assert { pos, .. }
            | Expr::Not { pos, .. }
            | Expr::Negate { pos, .. }
            | Expr::BinOp { pos, .. }
            | Expr::ConcatStrings { pos, .. }
            | Expr::CurPos { pos } => *pos,
            Expr::Var(var) => var.pos,
            Expr::Attrs(attrs) => attrs.pos,
            Expr::Lambda(lambda) => lambda.pos,
        }
    }

    /// Compact textual rendering for diagnostics (assertion messages,
    /// traces). Not a pretty-printer: nested structure is elided.
    pub fn show(&self) -> String {
        match self {
            Expr::Int { n, .. } => n.to_string(),
            Expr::Float { f, .. } => format!("{f}"),
            Expr::Str { parts, .. } => match parts.as_slice() {
                [StrPart::Lit(text)] => format!("{text:?}"),
                _ => "\"…\"".to_string(),
            },
            Expr::Path { base, .. } => base.display().to_string(),
            Expr::Var(var) => var.name.resolve(),
            Expr::Select { subject, path, .. } => {
                format!("{}.{}", subject.show(), Expr::show_attr_path(path))
            }
            Expr::HasAttr { subject, path, .. } => {
                format!("{} ? {}", subject.show(), Expr::show_attr_path(path))
            }
            Expr::Attrs(_) => "{ … }".to_string(),
            Expr::List { .. } => "[ … ]".to_string(),
            Expr::Lambda(lambda) => format!("<{}>", lambda.display_name()),
            Expr::Call { func, args, .. } => {
                let mut out = func.show();
                for arg in args {
                    out.push(' ');
                    out.push_str(&arg.show());
                }
                out
            }
            Expr::Let { .. } => "let … in …".to_string(),
            Expr::With { .. } => "with …; …".to_string(),
            Expr::If { .. } => "if … then … else …".to_string(),
            Expr::Assert { .. } => "assert …; …".to_string(),
            Expr::Not { expr, .. } => format!("!{}", expr.show()),
            Expr::Negate { expr, .. } => format!("-{}", expr.show()),
            Expr::BinOp { op, lhs, rhs, .. } => {
                let sym = match op {
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                    BinOp::Impl => "->",
                    BinOp::Update => "//",
                    BinOp::ListConcat => "++",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                };
                format!("{} {} {}", lhs.show(), sym, rhs.show())
            }
            Expr::ConcatStrings { parts, .. } => parts
                .iter()
                .map(|(_, part)| part.show())
                .collect::<Vec<_>>()
                .join(" + "),
            Expr::CurPos { .. } => "__curPos".to_string(),
        }
    }

    /// Render an attribute path for diagnostics: `a.b."c d"`.
    pub fn show_attr_path(path: &[AttrName]) -> String {
        let mut out = String::new();
        for (i, name) in path.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match name {
                AttrName::Static(sym) => sym.with_str(|s| out.push_str(s)),
                AttrName::Dynamic(_) => out.push_str("${…}"),
            }
        }
        out
    }
}
