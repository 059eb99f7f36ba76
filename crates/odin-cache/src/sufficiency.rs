// SPDX-License-Identifier: MIT
use std::path::Path;

use tracing::debug;

use odin_planner::{CacheKind, SufficiencyRequest, SufficiencyValidator, SufficiencyVerdict};

use crate::cache::FileCache;

/// Judge whether the cached content for `path` carries enough context to
/// apply the proposed `old_string` → `new_string` replacement.
///
/// A file that is not cached (or cached without content) is rejected
/// locally without consulting the validator.  Otherwise the gathered
/// content — the full body, or every cached segment prefixed with its line
/// range — is sent to the cheap validator model, whose verdict is returned
/// unchanged.  The verdict is advisory only; the cache never rewrites
/// files itself.
pub async fn check_sufficiency(
    cache: &FileCache,
    validator: &dyn SufficiencyValidator,
    path: &Path,
    old_string: &str,
    new_string: &str,
) -> anyhow::Result<SufficiencyVerdict> {
    let snapshot = match cache.get(path) {
        Some(s) => s,
        None => {
            return Ok(SufficiencyVerdict::insufficient(
                "must read file first: file is not in the cache",
            ))
        }
    };

    if snapshot.is_truncated || !snapshot.has_content() {
        return Ok(SufficiencyVerdict::insufficient(
            "must read file first: cached entry carries no content",
        ));
    }

    let is_full = snapshot.full_content.is_some();
    let (cache_kind, content) = match &snapshot.full_content {
        Some(full) => (CacheKind::Full, full.clone()),
        None => {
            let keys: Vec<String> = snapshot.segments.iter().map(|s| s.key()).collect();
            let mut gathered = String::new();
            for seg in &snapshot.segments {
                gathered.push_str(&format!("[lines {}-{}]\n", seg.start_line, seg.end_line));
                gathered.push_str(&seg.content);
                if !seg.content.ends_with('\n') {
                    gathered.push('\n');
                }
            }
            (CacheKind::Partial(keys), gathered)
        }
    };

    debug!(path = %path.display(), full = is_full, "sufficiency check");

    let request = SufficiencyRequest {
        file_path: path.display().to_string(),
        cache_kind,
        old_string: old_string.to_string(),
        new_string: new_string.to_string(),
        content,
    };
    validator.validate(&request).await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
