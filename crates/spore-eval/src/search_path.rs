use std::path::PathBuf;

use spore_core::context::EvalContext;
use spore_core::error::SporeError;
use spore_core::pos::PosIdx;
use spore_core::CORE_MODULES_PREFIX;

// ── Search-path resolution ────────────────────────────────────────
//
// `<prefix/rest>` queries match against the configured (prefix, value)
// entries; the longest matching prefix wins. Entry values resolve once
// (cached): local paths verbatim, `file://` URLs stripped, fetchable
// URLs through the fetcher. Entries that fail to resolve are warned
// about and skipped, never turned into evaluation errors.

/// Resolve a `<…>` query to a concrete file or directory.
pub fn find_file(ctx: &EvalContext, query: &str, pos: PosIdx) -> Result<PathBuf, SporeError> {
    // Candidate entries, longest prefix first; ties keep config order.
    let mut matching: Vec<(usize, &str, String)> = Vec::new();
    for entry in &ctx.config.search_path {
        if let Some(suffix) = match_prefix(&entry.prefix, query) {
            matching.push((entry.prefix.len(), suffix, entry.value.clone()));
        }
    }
    matching.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, suffix, value) in matching {
        ctx.check_interrupt()?;
        let Some(root) = resolve_entry(ctx, &value, pos) else {
            continue;
        };
        let candidate = if suffix.is_empty() {
            root
        } else {
            root.join(suffix)
        };
        if !candidate.exists() {
            continue;
        }
        match ctx.sandbox.check_source_path(&candidate, pos) {
            Ok(resolved) => return Ok(resolved),
            Err(_) => {
                tracing::warn!(
                    target: "spore::search_path",
                    "ignoring search path candidate '{}': access restricted",
                    candidate.display()
                );
                continue;
            }
        }
    }

    // The reserved core-modules prefix resolves against the bundled
    // module directory.
    if let Some(rest) = query.strip_prefix(&format!("{CORE_MODULES_PREFIX}/")) {
        if let Some(dir) = &ctx.config.core_modules_dir {
            let candidate = dir.join(rest);
            if candidate.exists() {
                return ctx.sandbox.check_source_path(&candidate, pos);
            }
        }
    }

    // Catchable, so expressions can probe for optional modules.
    Err(SporeError::Thrown {
        message: format!("file '{query}' was not found in the search path"),
        pos,
    })
}

fn match_prefix<'q>(prefix: &str, query: &'q str) -> Option<&'q str> {
    if prefix.is_empty() {
        return Some(query);
    }
    if query == prefix {
        return Some("");
    }
    query
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Resolve a search-path entry value to a local directory, caching the
/// outcome (including failure) per evaluator.
fn resolve_entry(ctx: &EvalContext, value: &str, pos: PosIdx) -> Option<PathBuf> {
    if let Some(cached) = ctx.search_path_cache.borrow().get(value) {
        return cached.clone();
    }
    let resolved = resolve_entry_uncached(ctx, value, pos);
    ctx.search_path_cache
        .borrow_mut()
        .insert(value.to_string(), resolved.clone());
    resolved
}

fn resolve_entry_uncached(ctx: &EvalContext, value: &str, pos: PosIdx) -> Option<PathBuf> {
    if let Some(path) = value.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        if let Err(e) = ctx.sandbox.check_uri(value, pos) {
            tracing::warn!(
                target: "spore::search_path",
                "ignoring search path entry '{value}': {e}"
            );
            return None;
        }
        return match &ctx.fetcher {
            Some(fetcher) => match fetcher.download_tarball(value) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(
                        target: "spore::search_path",
                        "ignoring search path entry '{value}': {e}"
                    );
                    None
                }
            },
            None => {
                tracing::warn!(
                    target: "spore::search_path",
                    "ignoring search path entry '{value}': no fetcher available"
                );
                None
            }
        };
    }
    if let Some(reference) = value.strip_prefix("flake:") {
        return match &ctx.fetcher {
            Some(fetcher) => match fetcher.resolve_flake_ref(reference) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(
                        target: "spore::search_path",
                        "ignoring search path entry '{value}': {e}"
                    );
                    None
                }
            },
            None => {
                tracing::warn!(
                    target: "spore::search_path",
                    "ignoring search path entry '{value}': no fetcher available"
                );
                None
            }
        };
    }
    Some(PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_prefix() {
        assert_eq!(match_prefix("", "anything/x"), Some("anything/x"));
        assert_eq!(match_prefix("lib", "lib"), Some(""));
        assert_eq!(match_prefix("lib", "lib/mod.spore"), Some("mod.spore"));
        assert_eq!(match_prefix("lib", "liberty/x"), None);
        assert_eq!(match_prefix("a/b", "a/b/c"), Some("c"));
    }
}
