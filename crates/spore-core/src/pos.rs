use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

// ── Position table ────────────────────────────────────────────────

/// Where a piece of source text came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A source file on disk.
    File(Rc<PathBuf>),
    /// An in-memory string (REPL input, `--eval` argument, `fromJSON` …).
    Text,
    /// Standard input.
    Stdin,
}

impl Origin {
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Origin::File(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(p) => write!(f, "{}", p.display()),
            Origin::Text => f.write_str("«string»"),
            Origin::Stdin => f.write_str("«stdin»"),
        }
    }
}

/// A compact reference into the position table. Zero is the sentinel
/// "no position". The table is append-only and never shrinks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PosIdx(u32);

/// The "no position" sentinel.
pub const NO_POS: PosIdx = PosIdx(0);

impl PosIdx {
    #[inline]
    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// Fall back to `other` when this index is the sentinel.
    #[inline]
    pub fn or(self, other: PosIdx) -> PosIdx {
        if self.is_set() {
            self
        } else {
            other
        }
    }
}

impl fmt::Debug for PosIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PosIdx({})", self.0)
    }
}

/// A resolved position: origin plus 1-based line and column.
#[derive(Clone)]
pub struct Pos {
    pub origin: Origin,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.line, self.column)
    }
}

/// A handle to a registered origin; cheap to copy into the lexer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OriginId(u32);

struct PosRecord {
    origin: u32,
    line: u32,
    column: u32,
}

struct PosTable {
    origins: Vec<Origin>,
    records: Vec<PosRecord>,
}

thread_local! {
    static TABLE: RefCell<PosTable> = RefCell::new(PosTable {
        origins: Vec::new(),
        records: Vec::new(),
    });
}

/// Register a source origin; positions added later refer to it by id.
pub fn register_origin(origin: Origin) -> OriginId {
    TABLE.with(|t| {
        let mut table = t.borrow_mut();
        table.origins.push(origin);
        OriginId((table.origins.len() - 1) as u32)
    })
}

/// Append a position record and return its index. Index 0 is reserved for
/// the sentinel, so the first real record gets index 1.
pub fn add_pos(origin: OriginId, line: u32, column: u32) -> PosIdx {
    TABLE.with(|t| {
        let mut table = t.borrow_mut();
        table.records.push(PosRecord {
            origin: origin.0,
            line,
            column,
        });
        PosIdx(table.records.len() as u32)
    })
}

/// Resolve an index back to (origin, line, column). `None` for the sentinel.
pub fn resolve_pos(idx: PosIdx) -> Option<Pos> {
    if !idx.is_set() {
        return None;
    }
    TABLE.with(|t| {
        let table = t.borrow();
        let rec = table.records.get((idx.0 - 1) as usize)?;
        let origin = table.origins.get(rec.origin as usize)?.clone();
        Some(Pos {
            origin,
            line: rec.line,
            column: rec.column,
        })
    })
}

/// Render a position for diagnostics, or a placeholder for the sentinel.
pub fn show_pos(idx: PosIdx) -> String {
    match resolve_pos(idx) {
        Some(pos) => pos.to_string(),
        None => "«none»".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_unset() {
        assert!(!NO_POS.is_set());
        assert!(resolve_pos(NO_POS).is_none());
    }

    #[test]
    fn test_add_and_resolve() {
        let origin = register_origin(Origin::Text);
        let idx = add_pos(origin, 3, 14);
        assert!(idx.is_set());
        let pos = resolve_pos(idx).unwrap();
        assert_eq!(pos.line, 3);
        assert_eq!(pos.column, 14);
        assert_eq!(pos.origin, Origin::Text);
    }

    #[test]
    fn test_file_origin_display() {
        let origin = register_origin(Origin::File(Rc::new(PathBuf::from("/tmp/x.spore"))));
        let idx = add_pos(origin, 1, 1);
        assert_eq!(show_pos(idx), "/tmp/x.spore:1:1");
    }

    #[test]
    fn test_or_fallback() {
        let origin = register_origin(Origin::Stdin);
        let idx = add_pos(origin, 2, 2);
        assert_eq!(NO_POS.or(idx), idx);
        assert_eq!(idx.or(NO_POS), idx);
    }
}
