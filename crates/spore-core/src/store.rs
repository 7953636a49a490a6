use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::SporeError;
use crate::pos::NO_POS;

// ── Store interface ───────────────────────────────────────────────
//
// The content-addressed store is an external collaborator: the evaluator
// only ingests source paths, renders store paths into strings, and reads
// back metadata. `SimpleStore` is the deterministic in-process
// implementation used by tests and the CLI.

/// A path inside the store directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath(PathBuf);

impl StorePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// How a source path is ingested into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMethod {
    /// The file's contents alone.
    Flat,
    /// The full file tree, serialised recursively.
    Recursive,
}

/// Minimal derivation metadata as the evaluator sees it.
#[derive(Debug, Clone)]
pub struct Derivation {
    pub name: String,
    pub outputs: BTreeMap<String, StorePath>,
}

pub trait Store {
    fn store_dir(&self) -> &Path;

    /// Ingest a source path, returning its store path.
    fn ingest_path(
        &self,
        path: &Path,
        name: &str,
        method: IngestMethod,
    ) -> Result<StorePath, SporeError>;

    fn is_in_store(&self, path: &Path) -> bool {
        path.starts_with(self.store_dir())
    }

    /// Map a store path to the real filesystem location.
    fn to_real_path(&self, path: &StorePath) -> PathBuf {
        path.0.clone()
    }

    fn print_store_path(&self, path: &StorePath) -> String {
        path.to_string()
    }

    fn parse_store_path(&self, s: &str) -> Result<StorePath, SporeError> {
        let p = PathBuf::from(s);
        if !p.starts_with(self.store_dir()) {
            return Err(SporeError::InvalidPath {
                path: s.to_string(),
                pos: NO_POS,
            });
        }
        Ok(StorePath(p))
    }

    /// The transitive set of store paths referenced by `path`.
    fn compute_closure(&self, path: &StorePath) -> Result<BTreeSet<StorePath>, SporeError>;

    fn read_derivation(&self, path: &StorePath) -> Result<Derivation, SporeError>;

    /// The store path a fixed-output content address will land at.
    fn make_fixed_output_path(&self, name: &str, ca: &str) -> Result<StorePath, SporeError>;
}

// ── SimpleStore ───────────────────────────────────────────────────

/// A store that derives paths from content digests without copying
/// anything. Deterministic, filesystem-free, single-process.
pub struct SimpleStore {
    dir: PathBuf,
}

impl SimpleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SimpleStore { dir: dir.into() }
    }

    /// The conventional store location.
    pub fn default_dir() -> PathBuf {
        PathBuf::from("/spore/store")
    }

    fn make_path(&self, digest_input: &str, name: &str) -> StorePath {
        let mut hasher = Sha256::new();
        hasher.update(digest_input.as_bytes());
        let digest = hasher.finalize();
        // 32 base-32-ish characters is plenty for uniqueness here.
        let short: String = digest
            .iter()
            .take(20)
            .map(|b| char::from_digit((b % 32) as u32, 32).unwrap_or('0'))
            .collect();
        StorePath(self.dir.join(format!("{short}-{name}")))
    }
}

impl Default for SimpleStore {
    fn default() -> Self {
        SimpleStore::new(Self::default_dir())
    }
}

impl Store for SimpleStore {
    fn store_dir(&self) -> &Path {
        &self.dir
    }

    fn ingest_path(
        &self,
        path: &Path,
        name: &str,
        method: IngestMethod,
    ) -> Result<StorePath, SporeError> {
        let tag = match method {
            IngestMethod::Flat => "flat",
            IngestMethod::Recursive => "recursive",
        };
        Ok(self.make_path(&format!("ingest:{tag}:{}", path.display()), name))
    }

    fn compute_closure(&self, path: &StorePath) -> Result<BTreeSet<StorePath>, SporeError> {
        // No reference scanning: the closure of a path is itself.
        let mut set = BTreeSet::new();
        set.insert(path.clone());
        Ok(set)
    }

    fn read_derivation(&self, path: &StorePath) -> Result<Derivation, SporeError> {
        Err(SporeError::eval(
            format!("store path '{path}' cannot be read as a derivation by this store"),
            NO_POS,
        ))
    }

    fn make_fixed_output_path(&self, name: &str, ca: &str) -> Result<StorePath, SporeError> {
        Ok(self.make_path(&format!("fixed:{ca}"), name))
    }
}

// ── Fetcher interface ─────────────────────────────────────────────

/// Network fetching, used only by the search-path resolver. Failures are
/// warnings there, never evaluation errors.
pub trait Fetcher {
    fn download_tarball(&self, url: &str) -> Result<PathBuf, SporeError>;
    fn resolve_flake_ref(&self, reference: &str) -> Result<PathBuf, SporeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_is_deterministic() {
        let store = SimpleStore::default();
        let a = store
            .ingest_path(Path::new("/src/x"), "x", IngestMethod::Recursive)
            .unwrap();
        let b = store
            .ingest_path(Path::new("/src/x"), "x", IngestMethod::Recursive)
            .unwrap();
        assert_eq!(a, b);
        assert!(a.as_path().starts_with("/spore/store"));
        let flat = store
            .ingest_path(Path::new("/src/x"), "x", IngestMethod::Flat)
            .unwrap();
        assert_ne!(a, flat);
    }

    #[test]
    fn test_parse_store_path() {
        let store = SimpleStore::default();
        assert!(store.parse_store_path("/spore/store/abc-x").is_ok());
        let err = store.parse_store_path("/elsewhere/abc-x").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidPath);
    }

    #[test]
    fn test_is_in_store() {
        let store = SimpleStore::default();
        assert!(store.is_in_store(Path::new("/spore/store/abc-x")));
        assert!(!store.is_in_store(Path::new("/tmp/abc-x")));
    }

    #[test]
    fn test_closure_contains_self() {
        let store = SimpleStore::default();
        let sp = store.parse_store_path("/spore/store/abc-x").unwrap();
        let closure = store.compute_closure(&sp).unwrap();
        assert!(closure.contains(&sp));
    }
}
