use std::fmt;

use crate::pos::{show_pos, PosIdx, NO_POS};

// ── Errors ────────────────────────────────────────────────────────

/// One frame of an evaluation trace, innermost last.
#[derive(Debug, Clone)]
pub struct TraceItem {
    pub pos: PosIdx,
    pub message: String,
}

/// Coarse classification of an error, used by `tryEval` and by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Type,
    Eval,
    UndefinedVariable,
    AttributeMissing,
    MissingArgument,
    UnexpectedArgument,
    DuplicateAttribute,
    AssertionFailed,
    Thrown,
    Abort,
    InfiniteRecursion,
    StackOverflow,
    RestrictedPath,
    RestrictedUri,
    InvalidPath,
    Io,
    Interrupted,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SporeError {
    #[error("syntax error: {message}")]
    Parse { message: String, pos: PosIdx },

    #[error("expected {expected}, but found {found}")]
    Type {
        expected: String,
        found: String,
        pos: PosIdx,
    },

    #[error("{message}")]
    Eval { message: String, pos: PosIdx },

    #[error("undefined variable '{name}'")]
    UndefinedVariable {
        name: String,
        suggestions: Vec<String>,
        pos: PosIdx,
    },

    #[error("attribute '{name}' missing")]
    AttributeMissing {
        name: String,
        suggestions: Vec<String>,
        pos: PosIdx,
    },

    #[error("function {func} called without required argument '{name}'")]
    MissingArgument {
        func: String,
        name: String,
        pos: PosIdx,
    },

    #[error("function {func} called with unexpected argument '{name}'")]
    UnexpectedArgument {
        func: String,
        name: String,
        suggestions: Vec<String>,
        pos: PosIdx,
    },

    #[error("dynamic attribute '{name}' already defined")]
    DuplicateAttribute { name: String, pos: PosIdx },

    #[error("assertion '{condition}' failed")]
    AssertionFailed { condition: String, pos: PosIdx },

    #[error("{message}")]
    Thrown { message: String, pos: PosIdx },

    #[error("evaluation aborted with the following error message: '{message}'")]
    Abort { message: String, pos: PosIdx },

    #[error("infinite recursion encountered")]
    InfiniteRecursion { pos: PosIdx },

    #[error("stack overflow; max-call-depth exceeded")]
    StackOverflow { pos: PosIdx },

    #[error("access to path '{path}' is forbidden in restricted mode")]
    RestrictedPath { path: String, pos: PosIdx },

    #[error("access to URI '{uri}' is forbidden in pure evaluation mode")]
    RestrictedUri { uri: String, pos: PosIdx },

    #[error("path '{path}' is not in the store")]
    InvalidPath { path: String, pos: PosIdx },

    #[error("I/O error: {message}")]
    Io { message: String, pos: PosIdx },

    #[error("evaluation interrupted")]
    Interrupted,

    #[error("{inner}")]
    WithTrace {
        inner: Box<SporeError>,
        trace: Vec<TraceItem>,
    },
}

pub type EvalResult<T = crate::value::Value> = Result<T, SporeError>;

impl SporeError {
    // -- constructors --

    pub fn parse(message: impl Into<String>, pos: PosIdx) -> Self {
        SporeError::Parse {
            message: message.into(),
            pos,
        }
    }

    pub fn ty(expected: impl Into<String>, found: impl Into<String>, pos: PosIdx) -> Self {
        SporeError::Type {
            expected: expected.into(),
            found: found.into(),
            pos,
        }
    }

    pub fn eval(message: impl Into<String>, pos: PosIdx) -> Self {
        SporeError::Eval {
            message: message.into(),
            pos,
        }
    }

    pub fn io(message: impl Into<String>, pos: PosIdx) -> Self {
        SporeError::Io {
            message: message.into(),
            pos,
        }
    }

    // -- inspection --

    pub fn kind(&self) -> ErrorKind {
        match self {
            SporeError::Parse { .. } => ErrorKind::Parse,
            SporeError::Type { .. } => ErrorKind::Type,
            SporeError::Eval { .. } => ErrorKind::Eval,
            SporeError::UndefinedVariable { .. } => ErrorKind::UndefinedVariable,
            SporeError::AttributeMissing { .. } => ErrorKind::AttributeMissing,
            SporeError::MissingArgument { .. } => ErrorKind::MissingArgument,
            SporeError::UnexpectedArgument { .. } => ErrorKind::UnexpectedArgument,
            SporeError::DuplicateAttribute { .. } => ErrorKind::DuplicateAttribute,
            SporeError::AssertionFailed { .. } => ErrorKind::AssertionFailed,
            SporeError::Thrown { .. } => ErrorKind::Thrown,
            SporeError::Abort { .. } => ErrorKind::Abort,
            SporeError::InfiniteRecursion { .. } => ErrorKind::InfiniteRecursion,
            SporeError::StackOverflow { .. } => ErrorKind::StackOverflow,
            SporeError::RestrictedPath { .. } => ErrorKind::RestrictedPath,
            SporeError::RestrictedUri { .. } => ErrorKind::RestrictedUri,
            SporeError::InvalidPath { .. } => ErrorKind::InvalidPath,
            SporeError::Io { .. } => ErrorKind::Io,
            SporeError::Interrupted => ErrorKind::Interrupted,
            SporeError::WithTrace { inner, .. } => inner.kind(),
        }
    }

    /// Errors that `tryEval` converts to `{ success = false; value = null; }`:
    /// explicit `throw` and failed `assert`, nothing else.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Thrown | ErrorKind::AssertionFailed
        )
    }

    /// The primary position of the innermost error.
    pub fn pos(&self) -> PosIdx {
        match self {
            SporeError::Parse { pos, .. }
            | SporeError::Type { pos, .. }
            | SporeError::Eval { pos, .. }
            | SporeError::UndefinedVariable { pos, .. }
            | SporeError::AttributeMissing { pos, .. }
            | SporeError::MissingArgument { pos, .. }
            | SporeError::UnexpectedArgument { pos, .. }
            | SporeError::DuplicateAttribute { pos, .. }
            | SporeError::AssertionFailed { pos, .. }
            | SporeError::Thrown { pos, .. }
            | SporeError::Abort { pos, .. }
            | SporeError::InfiniteRecursion { pos }
            | SporeError::StackOverflow { pos }
            | SporeError::RestrictedPath { pos, .. }
            | SporeError::RestrictedUri { pos, .. }
            | SporeError::InvalidPath { pos, .. }
            | SporeError::Io { pos, .. } => *pos,
            SporeError::Interrupted => NO_POS,
            SporeError::WithTrace { inner, .. } => inner.pos(),
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match self {
            SporeError::UndefinedVariable { suggestions, .. }
            | SporeError::AttributeMissing { suggestions, .. }
            | SporeError::UnexpectedArgument { suggestions, .. } => suggestions,
            SporeError::WithTrace { inner, .. } => inner.suggestions(),
            _ => &[],
        }
    }

    pub fn trace(&self) -> &[TraceItem] {
        match self {
            SporeError::WithTrace { trace, .. } => trace,
            _ => &[],
        }
    }

    pub fn inner(&self) -> &SporeError {
        match self {
            SporeError::WithTrace { inner, .. } => inner.inner(),
            other => other,
        }
    }

    // -- trace building --

    /// Append a trace frame, wrapping the error on first use.
    pub fn add_trace(self, pos: PosIdx, message: impl Into<String>) -> Self {
        let item = TraceItem {
            pos,
            message: message.into(),
        };
        match self {
            SporeError::WithTrace { inner, mut trace } => {
                trace.push(item);
                SporeError::WithTrace { inner, trace }
            }
            other => SporeError::WithTrace {
                inner: Box::new(other),
                trace: vec![item],
            },
        }
    }

    /// Multi-line rendering for the CLI: message, position, suggestions,
    /// then the trace outermost-last.
    pub fn display_full(&self) -> String {
        let mut out = format!("error: {self}");
        let pos = self.pos();
        if pos.is_set() {
            out.push_str(&format!("\n       at {}", show_pos(pos)));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str(&format!("\n       did you mean {}?", suggestions.join(" or ")));
        }
        for item in self.trace() {
            out.push_str(&format!("\n       … {}", item.message));
            if item.pos.is_set() {
                out.push_str(&format!(" at {}", show_pos(item.pos)));
            }
        }
        out
    }
}

// ── Best-match suggestions ────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Pick the closest candidates to `target` by edit distance. A candidate
/// qualifies when its distance is at most `max(2, target.len() / 3)`;
/// at most three are returned, closest first.
pub fn best_matches<I, S>(candidates: I, target: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let threshold = std::cmp::max(2, target.chars().count() / 3);
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .filter_map(|c| {
            let c = c.as_ref();
            let d = levenshtein(c, target);
            (d <= threshold).then(|| (d, c.to_string()))
        })
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(3).map(|(_, s)| s).collect()
}

impl fmt::Display for TraceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, show_pos(self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_best_matches_orders_by_distance() {
        let out = best_matches(["foo", "fop", "bar"], "foo");
        assert_eq!(out[0], "foo");
        assert!(out.contains(&"fop".to_string()));
        assert!(!out.contains(&"bar".to_string()));
    }

    #[test]
    fn test_best_matches_threshold() {
        let out = best_matches(["completely-different"], "x");
        assert!(out.is_empty());
    }

    #[test]
    fn test_trace_wrapping_preserves_kind_and_pos() {
        let err = SporeError::ty("a set", "an integer", NO_POS)
            .add_trace(NO_POS, "while evaluating an attribute")
            .add_trace(NO_POS, "while calling a function");
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.trace().len(), 2);
        assert_eq!(err.trace()[0].message, "while evaluating an attribute");
    }

    #[test]
    fn test_catchable() {
        let thrown = SporeError::Thrown {
            message: "nope".into(),
            pos: NO_POS,
        };
        assert!(thrown.is_catchable());
        assert!(thrown.add_trace(NO_POS, "ctx").is_catchable());
        let abort = SporeError::Abort {
            message: "stop".into(),
            pos: NO_POS,
        };
        assert!(!abort.is_catchable());
        assert!(!SporeError::InfiniteRecursion { pos: NO_POS }.is_catchable());
    }
}
