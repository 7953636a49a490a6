use std::rc::Rc;

use spore_core::ast::{AttrName, AttrsExpr, Expr, ExprRef, ExprVar};
use spore_core::error::{best_matches, SporeError};
use spore_core::symbol::Symbol;

// ── Static variable resolution ────────────────────────────────────
//
// Compile-time mirror of the runtime environment chain. Every scope here
// corresponds to exactly one frame at runtime, so a (level, displacement)
// pair computed against this chain indexes the right slot later. `with`
// scopes introduce no names; a variable that falls through to one is
// marked `from_with` and resolved dynamically.

pub struct StaticScope {
    up: Option<Rc<StaticScope>>,
    is_with: bool,
    vars: hashbrown::HashMap<Symbol, u32>,
}

impl StaticScope {
    /// The root scope over the sealed root environment.
    pub fn root(names: &[Symbol]) -> Rc<StaticScope> {
        Rc::new(StaticScope {
            up: None,
            is_with: false,
            vars: names
                .iter()
                .enumerate()
                .map(|(i, sym)| (*sym, i as u32))
                .collect(),
        })
    }

    fn binder(up: &Rc<StaticScope>, names: impl Iterator<Item = Symbol>) -> Rc<StaticScope> {
        Rc::new(StaticScope {
            up: Some(Rc::clone(up)),
            is_with: false,
            vars: names.enumerate().map(|(i, sym)| (sym, i as u32)).collect(),
        })
    }

    fn with(up: &Rc<StaticScope>) -> Rc<StaticScope> {
        Rc::new(StaticScope {
            up: Some(Rc::clone(up)),
            is_with: true,
            vars: hashbrown::HashMap::new(),
        })
    }

    /// All names visible from this scope, for error suggestions.
    fn visible_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut scope = Some(self);
        while let Some(s) = scope {
            out.extend(s.vars.keys().map(|sym| sym.resolve()));
            scope = s.up.as_deref();
        }
        out
    }
}

/// Resolve every variable reference in `expr` against `scope`, writing
/// (level, displacement) or the `from_with` mark into the AST. A name
/// found in no scope with no enclosing `with` is an error here, before
/// evaluation starts.
pub fn bind_vars(expr: &ExprRef, scope: &Rc<StaticScope>) -> Result<(), SporeError> {
    match &**expr {
        Expr::Int { .. } | Expr::Float { .. } | Expr::CurPos { .. } => Ok(()),

        Expr::Str { parts, .. } => bind_parts(parts, scope),
        Expr::Path { parts, .. } => bind_parts(parts, scope),

        Expr::Var(var) => resolve_var(var, scope),

        Expr::Select {
            subject,
            path,
            or_default,
            ..
        } => {
            bind_vars(subject, scope)?;
            bind_attr_names(path, scope)?;
            if let Some(default) = or_default {
                bind_vars(default, scope)?;
            }
            Ok(())
        }

        Expr::HasAttr { subject, path, .. } => {
            bind_vars(subject, scope)?;
            bind_attr_names(path, scope)
        }

        Expr::Attrs(attrs) => bind_attrs(attrs, scope).map(|_| ()),

        Expr::List { items, .. } => {
            for item in items {
                bind_vars(item, scope)?;
            }
            Ok(())
        }

        Expr::Lambda(lambda) => {
            let names = lambda
                .arg
                .into_iter()
                .chain(lambda.formals.iter().flat_map(|f| {
                    f.formals.iter().map(|formal| formal.name)
                }));
            let inner = StaticScope::binder(scope, names);
            if let Some(formals) = &lambda.formals {
                // Defaults may reference the argument and other formals.
                for formal in &formals.formals {
                    if let Some(default) = &formal.default {
                        bind_vars(default, &inner)?;
                    }
                }
            }
            bind_vars(&lambda.body, &inner)
        }

        Expr::Call { func, args, .. } => {
            bind_vars(func, scope)?;
            for arg in args {
                bind_vars(arg, scope)?;
            }
            Ok(())
        }

        Expr::Let { bindings, body, .. } => {
            let inner = bind_recursive_attrs(bindings, scope)?;
            bind_vars(body, &inner)
        }

        Expr::With {
            namespace, body, ..
        } => {
            bind_vars(namespace, scope)?;
            let inner = StaticScope::with(scope);
            bind_vars(body, &inner)
        }

        Expr::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            bind_vars(cond, scope)?;
            bind_vars(then, scope)?;
            bind_vars(otherwise, scope)
        }

        Expr::Assert { cond, body, .. } => {
            bind_vars(cond, scope)?;
            bind_vars(body, scope)
        }

        Expr::Not { expr, .. } | Expr::Negate { expr, .. } => bind_vars(expr, scope),

        Expr::BinOp { lhs, rhs, .. } => {
            bind_vars(lhs, scope)?;
            bind_vars(rhs, scope)
        }

        Expr::ConcatStrings { parts, .. } => {
            for (_, part) in parts {
                bind_vars(part, scope)?;
            }
            Ok(())
        }
    }
}

fn bind_parts(parts: &[spore_core::ast::StrPart], scope: &Rc<StaticScope>) -> Result<(), SporeError> {
    for part in parts {
        if let spore_core::ast::StrPart::Interp(expr) = part {
            bind_vars(expr, scope)?;
        }
    }
    Ok(())
}

fn bind_attr_names(path: &[AttrName], scope: &Rc<StaticScope>) -> Result<(), SporeError> {
    for name in path {
        if let AttrName::Dynamic(expr) = name {
            bind_vars(expr, scope)?;
        }
    }
    Ok(())
}

fn bind_attrs(attrs: &AttrsExpr, scope: &Rc<StaticScope>) -> Result<(), SporeError> {
    if attrs.recursive {
        bind_recursive_attrs(attrs, scope)?;
        Ok(())
    } else {
        for attr in &attrs.attrs {
            bind_vars(&attr.value, scope)?;
        }
        for dynamic in &attrs.dynamic {
            bind_vars(&dynamic.name_expr, scope)?;
            bind_vars(&dynamic.value, scope)?;
        }
        Ok(())
    }
}

/// Bind a recursive binder (`rec { … }` or `let`): static attribute names
/// get slots in a child scope; inherited values stay in the enclosing
/// scope (they would otherwise capture themselves); dynamic attributes
/// resolve in the child scope.
fn bind_recursive_attrs(
    attrs: &AttrsExpr,
    scope: &Rc<StaticScope>,
) -> Result<Rc<StaticScope>, SporeError> {
    let inner = StaticScope::binder(scope, attrs.attrs.iter().map(|a| a.name));
    for attr in &attrs.attrs {
        if attr.inherited {
            bind_vars(&attr.value, scope)?;
        } else {
            bind_vars(&attr.value, &inner)?;
        }
    }
    for dynamic in &attrs.dynamic {
        bind_vars(&dynamic.name_expr, &inner)?;
        bind_vars(&dynamic.value, &inner)?;
    }
    Ok(inner)
}

fn resolve_var(var: &ExprVar, scope: &Rc<StaticScope>) -> Result<(), SporeError> {
    let mut level = 0u32;
    let mut current = Some(scope.as_ref());
    let mut crossed_with = false;
    while let Some(s) = current {
        if let Some(displ) = s.vars.get(&var.name) {
            var.level.set(level);
            var.displ.set(*displ);
            var.from_with.set(false);
            return Ok(());
        }
        crossed_with |= s.is_with;
        level += 1;
        current = s.up.as_deref();
    }
    if crossed_with {
        var.from_with.set(true);
        return Ok(());
    }
    let name = var.name.resolve();
    Err(SporeError::UndefinedVariable {
        suggestions: best_matches(scope.visible_names(), &name),
        name,
        pos: var.pos,
    })
}
