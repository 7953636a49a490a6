use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;

use lasso::{Key, Rodeo, Spur};

// ── Symbol interning ──────────────────────────────────────────────

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// An interned attribute or variable name.
///
/// Equality and ordering are constant-time integer comparisons on the
/// interner key; equal symbols always have byte-equal text. The backing
/// strings live in a thread-local interner and outlive every value that
/// references them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    /// Intern a string. Idempotent: the same text always yields the same key.
    pub fn intern(s: &str) -> Symbol {
        INTERNER.with(|r| Symbol(r.borrow_mut().get_or_intern(s)))
    }

    /// Resolve back to an owned String.
    pub fn resolve(self) -> String {
        INTERNER.with(|r| r.borrow().resolve(&self.0).to_string())
    }

    /// Resolve and call `f` with the `&str`, avoiding allocation.
    pub fn with_str<F, R>(self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        INTERNER.with(|r| {
            let interner = r.borrow();
            f(interner.resolve(&self.0))
        })
    }

    /// The dense integer key, used for attribute ordering in `Bindings`.
    #[inline]
    pub fn index(self) -> usize {
        self.0.into_usize()
    }

    /// Compare two symbols by their resolved text (lexicographic). Used by
    /// diagnostics and `attrNames`; `Ord` on `Symbol` itself is key order.
    pub fn cmp_lexical(a: Symbol, b: Symbol) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        INTERNER.with(|r| {
            let interner = r.borrow();
            interner.resolve(&a.0).cmp(interner.resolve(&b.0))
        })
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| f.write_str(s))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| write!(f, "Symbol({s})"))
    }
}

/// Number of distinct symbols interned so far (diagnostics).
pub fn symbol_count() -> usize {
    INTERNER.with(|r| r.borrow().len())
}

/// Iterate all interned symbols into a Vec (diagnostics only).
pub fn all_symbols() -> Vec<Symbol> {
    INTERNER.with(|r| r.borrow().iter().map(|(k, _)| Symbol(k)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_idempotent() {
        let a = Symbol::intern("foo");
        let b = Symbol::intern("foo");
        assert_eq!(a, b);
        assert_eq!(a.resolve(), "foo");
    }

    #[test]
    fn test_distinct_strings_distinct_symbols() {
        assert_ne!(Symbol::intern("foo"), Symbol::intern("bar"));
    }

    #[test]
    fn test_ord_is_total_and_stable() {
        let a = Symbol::intern("zzz-test-ord-a");
        let b = Symbol::intern("zzz-test-ord-b");
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), a.cmp(&b));
    }

    #[test]
    fn test_cmp_lexical() {
        // Interning order differs from lexical order here.
        let b = Symbol::intern("lex-b");
        let a = Symbol::intern("lex-a");
        assert_eq!(Symbol::cmp_lexical(a, b), Ordering::Less);
        assert_eq!(Symbol::cmp_lexical(b, a), Ordering::Greater);
        assert_eq!(Symbol::cmp_lexical(a, a), Ordering::Equal);
    }

    #[test]
    fn test_with_str_no_alloc_path() {
        let s = Symbol::intern("hello");
        assert_eq!(s.with_str(str::len), 5);
    }
}
