use std::path::{Component, Path, PathBuf};

use crate::error::SporeError;
use crate::pos::PosIdx;

// ── Path sandbox ──────────────────────────────────────────────────

/// Restricts filesystem reads to an allow-list when restricted or pure
/// evaluation is active, and URIs to an allowed-prefix list in pure mode.
///
/// Paths are checked both before and after symlink resolution so a
/// symlink inside an allowed directory cannot escape it.
#[derive(Debug, Clone, Default)]
pub struct PathSandbox {
    allowed_paths: Option<Vec<PathBuf>>,
    allowed_uris: Vec<String>,
    pure_mode: bool,
}

/// Remove `.` and resolve `..` lexically, without touching the filesystem.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result
}

impl PathSandbox {
    /// No restrictions at all.
    pub fn unrestricted() -> Self {
        PathSandbox::default()
    }

    pub fn restricted(allowed_paths: Vec<PathBuf>, allowed_uris: Vec<String>, pure_mode: bool) -> Self {
        PathSandbox {
            allowed_paths: Some(
                allowed_paths
                    .into_iter()
                    .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
                    .collect(),
            ),
            allowed_uris,
            pure_mode,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed_paths.is_none()
    }

    pub fn allow_path(&mut self, path: PathBuf) {
        if let Some(allowed) = &mut self.allowed_paths {
            allowed.push(std::fs::canonicalize(&path).unwrap_or(path));
        }
    }

    fn is_allowed(&self, candidate: &Path) -> bool {
        match &self.allowed_paths {
            None => true,
            Some(allowed) => allowed.iter().any(|a| candidate.starts_with(a)),
        }
    }

    /// Verify that `path` may be read, returning the fully resolved path.
    ///
    /// The lexically normalised path is checked first, then the
    /// symlink-resolved one, so neither `..` tricks nor symlinks escape
    /// the allow-list.
    pub fn check_source_path(&self, path: &Path, pos: PosIdx) -> Result<PathBuf, SporeError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/"))
                .join(path)
        };
        let lexical = normalize_lexical(&absolute);
        if !self.is_allowed(&lexical) {
            return Err(SporeError::RestrictedPath {
                path: lexical.display().to_string(),
                pos,
            });
        }
        let resolved = std::fs::canonicalize(&lexical).unwrap_or_else(|_| lexical.clone());
        if !self.is_allowed(&resolved) {
            return Err(SporeError::RestrictedPath {
                path: resolved.display().to_string(),
                pos,
            });
        }
        Ok(resolved)
    }

    /// Verify that a network URI may be fetched in the current mode.
    pub fn check_uri(&self, uri: &str, pos: PosIdx) -> Result<(), SporeError> {
        if !self.pure_mode {
            return Ok(());
        }
        if self.allowed_uris.iter().any(|prefix| uri.starts_with(prefix)) {
            return Ok(());
        }
        Err(SporeError::RestrictedUri {
            uri: uri.to_string(),
            pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::NO_POS;

    #[test]
    fn test_unrestricted_allows_everything() {
        let sb = PathSandbox::unrestricted();
        assert!(sb.check_source_path(Path::new("/etc/hosts"), NO_POS).is_ok());
        assert!(sb.check_uri("http://example.com", NO_POS).is_ok());
    }

    #[test]
    fn test_normalize_lexical() {
        assert_eq!(
            normalize_lexical(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexical(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn test_allowed_dir_contains() {
        let tmp = tempfile::tempdir().unwrap();
        let inside = tmp.path().join("file.spore");
        std::fs::write(&inside, "1").unwrap();
        let sb = PathSandbox::restricted(vec![tmp.path().to_path_buf()], vec![], false);
        assert!(sb.check_source_path(&inside, NO_POS).is_ok());
    }

    #[test]
    fn test_outside_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let sb = PathSandbox::restricted(vec![tmp.path().to_path_buf()], vec![], false);
        let err = sb
            .check_source_path(Path::new("/etc/hosts"), NO_POS)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RestrictedPath);
    }

    #[test]
    fn test_traversal_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let sb = PathSandbox::restricted(vec![tmp.path().to_path_buf()], vec![], false);
        let evil = tmp.path().join("sub/../../../../etc/passwd");
        assert!(sb.check_source_path(&evil, NO_POS).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("secret");
        std::fs::write(&target, "x").unwrap();
        let link = allowed.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let sb = PathSandbox::restricted(vec![allowed.path().to_path_buf()], vec![], false);
        let err = sb.check_source_path(&link, NO_POS).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RestrictedPath);
    }

    #[test]
    fn test_pure_mode_uris() {
        let sb = PathSandbox::restricted(vec![], vec!["https://good.example/".to_string()], true);
        assert!(sb.check_uri("https://good.example/pkg.tar.gz", NO_POS).is_ok());
        let err = sb.check_uri("https://evil.example/x", NO_POS).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RestrictedUri);
    }
}
