// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use chrono::Utc;
use tracing::debug;

use odin_config::{CacheSettings, EvictionPolicy};
use odin_planner::CachedFileInfo;

use crate::entry::{segment_key, sha256_hex, CachedFile, CachedFileSnapshot, CachedSegment};

/// File metadata relevant to the cache: content size and mtime.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub mtime: Option<SystemTime>,
}

impl FileStat {
    pub fn of(path: &Path) -> Option<Self> {
        std::fs::metadata(path).ok().map(|m| Self {
            size: m.len(),
            mtime: m.modified().ok(),
        })
    }
}

struct Inner {
    map: HashMap<PathBuf, CachedFile>,
    /// Total content bytes held (truncated metadata entries excluded).
    bytes: u64,
}

/// Thread-safe content/segment store keyed by absolute path.
///
/// Lookups take the shared lock (hit metadata is atomic); every mutation
/// takes the exclusive lock.  Filesystem stats for freshness checks happen
/// before the lock is taken — the lock is never held across IO.
pub struct FileCache {
    config: CacheSettings,
    inner: RwLock<Inner>,
}

impl FileCache {
    pub fn new(config: CacheSettings) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                bytes: 0,
            }),
        }
    }

    pub fn config(&self) -> &CacheSettings {
        &self.config
    }

    /// Look up a file.  Records the hit, enforces TTL, and (when auto
    /// refresh is enabled) drops entries whose on-disk mtime drifted.
    pub fn get(&self, path: &Path) -> Option<CachedFileSnapshot> {
        let fresh_stat = if self.config.enable_auto_refresh {
            FileStat::of(path)
        } else {
            None
        };

        let stale = {
            let inner = self.inner.read().expect("file cache lock poisoned");
            let entry = inner.map.get(path)?;
            self.is_stale(entry, fresh_stat.as_ref())
        };

        if stale {
            debug!(path = %path.display(), "cache entry stale; dropping");
            self.invalidate(path);
            return None;
        }

        let inner = self.inner.read().expect("file cache lock poisoned");
        let entry = inner.map.get(path)?;
        entry.touch();
        Some(entry.snapshot(&path.to_path_buf()))
    }

    fn is_stale(&self, entry: &CachedFile, fresh_stat: Option<&FileStat>) -> bool {
        if self.config.ttl_secs > 0 {
            let age = Utc::now().signed_duration_since(entry.cached_at);
            if age.num_seconds() >= self.config.ttl_secs as i64 {
                return true;
            }
        }
        if self.config.enable_auto_refresh {
            match (entry.mod_time, fresh_stat) {
                (Some(cached), Some(stat)) => {
                    if stat.mtime.map(|m| m != cached).unwrap_or(false) {
                        return true;
                    }
                }
                // File vanished from disk — the entry no longer describes
                // anything real.
                (Some(_), None) => return true,
                _ => {}
            }
        }
        false
    }

    /// Exact range-key lookup; a query for a subrange of an existing
    /// segment is a miss.
    pub fn get_segment(&self, path: &Path, start_line: u32, end_line: u32) -> Option<CachedSegment> {
        let inner = self.inner.read().expect("file cache lock poisoned");
        inner
            .map
            .get(path)?
            .partial_cache
            .get(&segment_key(start_line, end_line))
            .cloned()
    }

    /// Cheap presence check (no hit recording), used by ls/glob annotations.
    pub fn contains(&self, path: &Path) -> bool {
        let inner = self.inner.read().expect("file cache lock poisoned");
        inner.map.contains_key(path)
    }

    /// Install or replace a full entry.  Files above `max_file_size` are
    /// recorded as metadata-only truncated entries.
    pub fn put_full(&self, path: &Path, content: &str, stat: FileStat) {
        let mut inner = self.inner.write().expect("file cache lock poisoned");
        if content.len() as u64 > self.config.max_file_size {
            debug!(path = %path.display(), size = content.len(), "file exceeds max_file_size; caching metadata only");
            Self::remove_entry(&mut inner, path);
            inner
                .map
                .insert(path.to_path_buf(), CachedFile::new_truncated(stat.size, stat.mtime));
            return;
        }

        let incoming = content.len() as u64;
        let prior = Self::remove_entry(&mut inner, path);
        self.evict_for(&mut inner, incoming, path);

        let mut entry = CachedFile::new_full(content.to_string(), stat.mtime);
        // Replacing an existing entry keeps its first-read hash so external
        // tampering stays detectable across re-reads.
        if let Some(prior) = prior {
            if let Some(orig) = prior.original_hash {
                entry.original_hash = Some(orig);
            }
            entry.is_modified = prior.is_modified;
        }
        inner.bytes += entry.size;
        inner.map.insert(path.to_path_buf(), entry);
    }

    /// Add a segment, creating a partial entry when none exists.  A full
    /// entry already covering the file supersedes segments and is left
    /// untouched.  Beyond `max_segments` the oldest segment is dropped.
    pub fn put_segment(&self, path: &Path, segment: CachedSegment) {
        // Stat before taking the lock; the lock is never held across IO.
        let mtime = FileStat::of(path).and_then(|s| s.mtime);
        let seg_bytes = segment.content.len() as u64;

        let mut guard = self.inner.write().expect("file cache lock poisoned");
        let inner = &mut *guard;

        enum Existing {
            Superseded,
            Partial,
            Absent,
        }
        let existing = match inner.map.get(path) {
            Some(entry) if entry.full_content.is_some() || entry.is_truncated => {
                Existing::Superseded
            }
            Some(_) => Existing::Partial,
            None => Existing::Absent,
        };
        match existing {
            Existing::Superseded => return,
            Existing::Absent => {
                self.evict_for(inner, seg_bytes, path);
                let entry = CachedFile::new_partial(segment, mtime);
                inner.bytes += entry.size;
                inner.map.insert(path.to_path_buf(), entry);
                return;
            }
            Existing::Partial => {}
        }

        let Inner { map, bytes } = inner;
        let entry = map.get_mut(path).expect("entry checked above");

        if let Some(old) = entry.partial_cache.insert(segment.key(), segment) {
            let old_bytes = old.content.len() as u64;
            entry.size = entry.size.saturating_sub(old_bytes);
            *bytes = bytes.saturating_sub(old_bytes);
        }
        entry.size += seg_bytes;
        *bytes += seg_bytes;

        if entry.partial_cache.len() > self.config.max_segments {
            let oldest = entry
                .partial_cache
                .iter()
                .min_by_key(|(_, s)| s.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                if let Some(dropped) = entry.partial_cache.remove(&key) {
                    let dropped_bytes = dropped.content.len() as u64;
                    entry.size = entry.size.saturating_sub(dropped_bytes);
                    *bytes = bytes.saturating_sub(dropped_bytes);
                }
            }
        }
    }

    /// Record a write performed by a tool in this session: replaces the
    /// content, recomputes the hash, promotes partial entries to full, and
    /// flags the entry as modified.
    pub fn mark_modified(&self, path: &Path, new_content: &str) {
        let stat = FileStat::of(path);
        let mut inner = self.inner.write().expect("file cache lock poisoned");
        let incoming = new_content.len() as u64;
        let prior = Self::remove_entry(&mut inner, path);

        if incoming > self.config.max_file_size {
            let size_on_disk = stat.map(|s| s.size).unwrap_or(incoming);
            let mut entry = CachedFile::new_truncated(size_on_disk, stat.and_then(|s| s.mtime));
            entry.is_modified = true;
            inner.map.insert(path.to_path_buf(), entry);
            return;
        }

        self.evict_for(&mut inner, incoming, path);
        let mut entry = CachedFile::new_full(new_content.to_string(), stat.and_then(|s| s.mtime));
        entry.is_modified = true;
        // Preserve the first-read hash when the file was cached before the
        // write; a freshly written file keeps its own hash as the origin.
        if let Some(prior) = prior {
            if let Some(orig) = prior.original_hash {
                entry.original_hash = Some(orig);
            }
        }
        entry.content_hash = Some(sha256_hex(new_content));
        inner.bytes += entry.size;
        inner.map.insert(path.to_path_buf(), entry);
    }

    pub fn invalidate(&self, path: &Path) {
        let mut inner = self.inner.write().expect("file cache lock poisoned");
        Self::remove_entry(&mut inner, path);
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().expect("file cache lock poisoned").map.len()
    }

    pub fn current_size(&self) -> u64 {
        self.inner.read().expect("file cache lock poisoned").bytes
    }

    /// Read-time snapshot of cache composition for the planner input,
    /// sorted by path for stable output.
    pub fn snapshot_infos(&self) -> Vec<CachedFileInfo> {
        let inner = self.inner.read().expect("file cache lock poisoned");
        let mut infos: Vec<CachedFileInfo> = inner
            .map
            .iter()
            .map(|(path, e)| CachedFileInfo {
                path: path.display().to_string(),
                size: e.size,
                is_modified: e.is_modified,
                cached_at: e.cached_at,
                is_truncated: e.is_truncated,
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    fn remove_entry(inner: &mut Inner, path: &Path) -> Option<CachedFile> {
        let removed = inner.map.remove(path);
        if let Some(e) = &removed {
            if !e.is_truncated {
                inner.bytes = inner.bytes.saturating_sub(e.size);
            }
        }
        removed
    }

    /// Evict until both the entry-count and byte bounds admit an incoming
    /// entry of `incoming` bytes.  `incoming_path` is exempt from
    /// victimization (its prior entry was already removed by the caller).
    fn evict_for(&self, inner: &mut Inner, incoming: u64, incoming_path: &Path) {
        loop {
            let over_entries = inner.map.len() >= self.config.max_entries;
            let over_bytes = inner.bytes + incoming > self.config.max_cache_size;
            if !over_entries && !over_bytes {
                return;
            }
            let victim = match self.pick_victim(inner, incoming_path) {
                Some(v) => v,
                None => return,
            };
            debug!(victim = %victim.display(), policy = %self.config.eviction_policy, "evicting cache entry");
            Self::remove_entry(inner, &victim);
        }
    }

    fn pick_victim(&self, inner: &Inner, exempt: &Path) -> Option<PathBuf> {
        let candidates = || inner.map.iter().filter(|(p, _)| p.as_path() != exempt);
        match self.config.eviction_policy {
            EvictionPolicy::Lru => candidates()
                .min_by_key(|(_, e)| e.last_accessed_ms())
                .map(|(p, _)| p.clone()),
            EvictionPolicy::Lfu => candidates()
                .min_by_key(|(_, e)| (e.access_count(), e.last_accessed_ms()))
                .map(|(p, _)| p.clone()),
            EvictionPolicy::Hybrid => {
                let unmodified = candidates()
                    .filter(|(_, e)| !e.is_modified)
                    .min_by_key(|(_, e)| e.last_accessed_ms())
                    .map(|(p, _)| p.clone());
                unmodified.or_else(|| {
                    candidates()
                        .min_by_key(|(_, e)| e.last_accessed_ms())
                        .map(|(p, _)| p.clone())
                })
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(max_entries: usize, max_bytes: u64, policy: EvictionPolicy) -> FileCache {
        FileCache::new(CacheSettings {
            max_cache_size: max_bytes,
            max_entries,
            eviction_policy: policy,
            enable_auto_refresh: false,
            ..CacheSettings::default()
        })
    }

    fn stat() -> FileStat {
        FileStat {
            size: 0,
            mtime: None,
        }
    }

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/ws/{name}"))
    }

    // ── put_full / get ────────────────────────────────────────────────────────

    #[test]
    fn put_full_then_get_round_trips_content_and_hash() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("main.go"), "package main\n", stat());
        let snap = cache.get(&p("main.go")).unwrap();
        assert_eq!(snap.full_content.as_deref(), Some("package main\n"));
        assert_eq!(snap.content_hash.as_deref(), Some(sha256_hex("package main\n").as_str()));
        assert!(!snap.is_modified);
    }

    #[test]
    fn get_records_access() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("a"), "x", stat());
        cache.get(&p("a"));
        cache.get(&p("a"));
        let snap = cache.get(&p("a")).unwrap();
        assert!(snap.access_count >= 2);
    }

    #[test]
    fn get_missing_is_none() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        assert!(cache.get(&p("nope")).is_none());
    }

    #[test]
    fn put_full_replaces_and_clears_partial_state() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_segment(&p("a"), CachedSegment::new(1, 5, "head"));
        cache.put_full(&p("a"), "whole file", stat());
        let snap = cache.get(&p("a")).unwrap();
        assert!(!snap.is_partial);
        assert!(snap.segments.is_empty());
        assert_eq!(snap.full_content.as_deref(), Some("whole file"));
    }

    // ── Segments ──────────────────────────────────────────────────────────────

    #[test]
    fn segment_lookup_requires_exact_key() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_segment(&p("a"), CachedSegment::new(10, 30, "range"));
        assert!(cache.get_segment(&p("a"), 10, 30).is_some());
        // Subrange of an existing segment is a miss.
        assert!(cache.get_segment(&p("a"), 12, 20).is_none());
    }

    #[test]
    fn overlapping_segments_coexist() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_segment(&p("a"), CachedSegment::new(1, 20, "one"));
        cache.put_segment(&p("a"), CachedSegment::new(10, 30, "two"));
        assert!(cache.get_segment(&p("a"), 1, 20).is_some());
        assert!(cache.get_segment(&p("a"), 10, 30).is_some());
    }

    #[test]
    fn segment_cap_drops_oldest() {
        let cache = FileCache::new(CacheSettings {
            max_segments: 2,
            enable_auto_refresh: false,
            ..CacheSettings::default()
        });
        let mut first = CachedSegment::new(1, 2, "first");
        first.cached_at = Utc::now() - chrono::Duration::seconds(60);
        cache.put_segment(&p("a"), first);
        cache.put_segment(&p("a"), CachedSegment::new(3, 4, "second"));
        cache.put_segment(&p("a"), CachedSegment::new(5, 6, "third"));
        assert!(cache.get_segment(&p("a"), 1, 2).is_none(), "oldest dropped");
        assert!(cache.get_segment(&p("a"), 3, 4).is_some());
        assert!(cache.get_segment(&p("a"), 5, 6).is_some());
    }

    #[test]
    fn segment_does_not_demote_full_entry() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("a"), "full body", stat());
        cache.put_segment(&p("a"), CachedSegment::new(1, 1, "frag"));
        let snap = cache.get(&p("a")).unwrap();
        assert!(snap.full_content.is_some());
        assert!(!snap.is_partial);
    }

    #[test]
    fn replacing_same_segment_key_does_not_leak_bytes() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_segment(&p("a"), CachedSegment::new(1, 5, "aaaaaaaaaa"));
        let before = cache.current_size();
        cache.put_segment(&p("a"), CachedSegment::new(1, 5, "bbbbbbbbbb"));
        assert_eq!(cache.current_size(), before);
    }

    // ── mark_modified ─────────────────────────────────────────────────────────

    #[test]
    fn mark_modified_promotes_partial_to_full() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_segment(&p("a"), CachedSegment::new(1, 5, "frag"));
        cache.mark_modified(&p("a"), "new content");
        let snap = cache.get(&p("a")).unwrap();
        assert!(snap.is_modified);
        assert!(!snap.is_partial);
        assert!(snap.segments.is_empty());
        assert_eq!(snap.full_content.as_deref(), Some("new content"));
        assert_eq!(snap.content_hash.as_deref(), Some(sha256_hex("new content").as_str()));
    }

    #[test]
    fn mark_modified_preserves_original_hash() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("a"), "v1", stat());
        let orig = cache.get(&p("a")).unwrap().original_hash;
        cache.mark_modified(&p("a"), "v2");
        let snap = cache.get(&p("a")).unwrap();
        assert_eq!(snap.original_hash, orig);
        assert_ne!(snap.content_hash, snap.original_hash);
        // Session writes are not "dirty" — the divergence is intentional.
        assert!(snap.is_modified);
    }

    // ── Bounds & eviction ─────────────────────────────────────────────────────

    #[test]
    fn entry_bound_is_enforced_after_insert() {
        let cache = small_cache(3, 1 << 20, EvictionPolicy::Lru);
        for i in 0..10 {
            cache.put_full(&p(&format!("f{i}")), "content", stat());
        }
        assert!(cache.entry_count() <= 3);
    }

    #[test]
    fn byte_bound_is_enforced_after_insert() {
        let cache = small_cache(100, 30, EvictionPolicy::Lru);
        cache.put_full(&p("a"), "0123456789", stat()); // 10 bytes
        cache.put_full(&p("b"), "0123456789", stat());
        cache.put_full(&p("c"), "0123456789", stat());
        cache.put_full(&p("d"), "0123456789", stat());
        assert!(cache.current_size() <= 30);
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let cache = small_cache(2, 1 << 20, EvictionPolicy::Lru);
        cache.put_full(&p("old"), "x", stat());
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.put_full(&p("new"), "y", stat());
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.get(&p("old")); // refresh old
        cache.put_full(&p("third"), "z", stat());
        assert!(cache.get(&p("old")).is_some(), "recently touched survives");
        assert!(cache.get(&p("new")).is_none(), "lru victim evicted");
    }

    #[test]
    fn lfu_evicts_least_frequently_accessed() {
        let cache = small_cache(2, 1 << 20, EvictionPolicy::Lfu);
        cache.put_full(&p("hot"), "x", stat());
        cache.put_full(&p("cold"), "y", stat());
        cache.get(&p("hot"));
        cache.get(&p("hot"));
        cache.put_full(&p("third"), "z", stat());
        assert!(cache.get(&p("hot")).is_some());
        assert!(cache.get(&p("cold")).is_none());
    }

    #[test]
    fn hybrid_prefers_unmodified_victims() {
        let cache = small_cache(2, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("edited"), "x", stat());
        cache.mark_modified(&p("edited"), "x2");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.put_full(&p("read_only"), "y", stat());
        cache.get(&p("read_only")); // more recent AND more accessed than "edited"
        cache.put_full(&p("third"), "z", stat());
        assert!(
            cache.get(&p("edited")).is_some(),
            "modified entry must be preserved while an unmodified candidate exists"
        );
        assert!(cache.get(&p("read_only")).is_none());
    }

    #[test]
    fn hybrid_falls_back_to_modified_when_no_other_candidate() {
        let cache = small_cache(1, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("a"), "x", stat());
        cache.mark_modified(&p("a"), "x2");
        cache.put_full(&p("b"), "y", stat());
        assert!(cache.get(&p("a")).is_none());
        assert!(cache.get(&p("b")).is_some());
    }

    // ── Oversized files ───────────────────────────────────────────────────────

    #[test]
    fn oversized_file_kept_as_truncated_metadata() {
        let cache = FileCache::new(CacheSettings {
            max_file_size: 8,
            enable_auto_refresh: false,
            ..CacheSettings::default()
        });
        cache.put_full(
            &p("big"),
            "way more than eight bytes",
            FileStat {
                size: 25,
                mtime: None,
            },
        );
        let snap = cache.get(&p("big")).unwrap();
        assert!(snap.is_truncated);
        assert!(snap.full_content.is_none());
        assert_eq!(cache.current_size(), 0, "truncated entries cost no budget");
        let infos = cache.snapshot_infos();
        assert!(infos[0].is_truncated);
    }

    // ── Freshness ─────────────────────────────────────────────────────────────

    #[test]
    fn mtime_drift_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("w.txt");
        std::fs::write(&file, "v1").unwrap();
        let cache = FileCache::new(CacheSettings {
            enable_auto_refresh: true,
            ..CacheSettings::default()
        });
        let stat = FileStat::of(&file).unwrap();
        cache.put_full(&file, "v1", stat);
        assert!(cache.get(&file).is_some());

        // Rewrite with a clearly newer mtime.
        std::fs::write(&file, "v2 external").unwrap();
        let newer = SystemTime::now() + std::time::Duration::from_secs(5);
        set_mtime(&file, newer);

        assert!(cache.get(&file).is_none(), "drifted entry dropped");
        assert_eq!(cache.entry_count(), 0);
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        let f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        f.set_modified(t).unwrap();
    }

    #[test]
    fn deleted_file_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.txt");
        std::fs::write(&file, "v1").unwrap();
        let cache = FileCache::new(CacheSettings {
            enable_auto_refresh: true,
            ..CacheSettings::default()
        });
        cache.put_full(&file, "v1", FileStat::of(&file).unwrap());
        std::fs::remove_file(&file).unwrap();
        assert!(cache.get(&file).is_none());
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = FileCache::new(CacheSettings {
            ttl_secs: 1,
            enable_auto_refresh: false,
            ..CacheSettings::default()
        });
        cache.put_full(&p("a"), "x", stat());
        // Backdate the entry instead of sleeping.
        {
            let mut inner = cache.inner.write().unwrap();
            inner.map.get_mut(&p("a")).unwrap().cached_at =
                Utc::now() - chrono::Duration::seconds(5);
        }
        assert!(cache.get(&p("a")).is_none());
    }

    // ── Snapshot infos ────────────────────────────────────────────────────────

    #[test]
    fn snapshot_infos_sorted_and_complete() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("zeta"), "z", stat());
        cache.put_full(&p("alpha"), "a", stat());
        cache.mark_modified(&p("alpha"), "a2");
        let infos = cache.snapshot_infos();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].path.ends_with("alpha"));
        assert!(infos[0].is_modified);
        assert!(!infos[1].is_modified);
    }

    #[test]
    fn invalidate_removes_entry_and_bytes() {
        let cache = small_cache(10, 1 << 20, EvictionPolicy::Hybrid);
        cache.put_full(&p("a"), "0123456789", stat());
        assert_eq!(cache.current_size(), 10);
        cache.invalidate(&p("a"));
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.entry_count(), 0);
    }
}
