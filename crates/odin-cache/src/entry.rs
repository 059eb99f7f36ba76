// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// SHA-256 of `content` as a lowercase hex string.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One cached line range of a file.  Segments within a file may overlap;
/// the segment key is the exact `"start-end"` string.
#[derive(Debug, Clone)]
pub struct CachedSegment {
    /// 1-based inclusive line range
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub hash: String,
    pub cached_at: DateTime<Utc>,
}

impl CachedSegment {
    pub fn new(start_line: u32, end_line: u32, content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = sha256_hex(&content);
        Self {
            start_line,
            end_line,
            content,
            hash,
            cached_at: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        segment_key(self.start_line, self.end_line)
    }
}

pub fn segment_key(start_line: u32, end_line: u32) -> String {
    format!("{start_line}-{end_line}")
}

/// Internal cache entry.  Exactly one of `full_content` / partial state is
/// populated at any instant.  `last_accessed` and `access_count` are
/// atomics so a lookup under the shared lock can still record the hit.
#[derive(Debug)]
pub(crate) struct CachedFile {
    pub full_content: Option<String>,
    pub is_partial: bool,
    pub partial_cache: HashMap<String, CachedSegment>,
    /// SHA-256 of the full content when known
    pub content_hash: Option<String>,
    /// Hash at first read; diverging `content_hash` marks external tampering
    pub original_hash: Option<String>,
    /// Content bytes accounted against the cache size budget
    pub size: u64,
    pub total_lines: usize,
    pub cached_at: DateTime<Utc>,
    pub mod_time: Option<SystemTime>,
    /// Mutated in this session by a writing tool
    pub is_modified: bool,
    /// File exceeded the per-file size limit; metadata only, no content
    pub is_truncated: bool,
    last_accessed: AtomicU64,
    access_count: AtomicU64,
}

impl CachedFile {
    pub fn new_full(content: String, mod_time: Option<SystemTime>) -> Self {
        let hash = sha256_hex(&content);
        let size = content.len() as u64;
        let total_lines = content.lines().count();
        Self {
            full_content: Some(content),
            is_partial: false,
            partial_cache: HashMap::new(),
            content_hash: Some(hash.clone()),
            original_hash: Some(hash),
            size,
            total_lines,
            cached_at: Utc::now(),
            mod_time,
            is_modified: false,
            is_truncated: false,
            last_accessed: AtomicU64::new(now_millis()),
            access_count: AtomicU64::new(0),
        }
    }

    pub fn new_partial(segment: CachedSegment, mod_time: Option<SystemTime>) -> Self {
        let size = segment.content.len() as u64;
        let mut partial_cache = HashMap::new();
        partial_cache.insert(segment.key(), segment);
        Self {
            full_content: None,
            is_partial: true,
            partial_cache,
            content_hash: None,
            original_hash: None,
            size,
            total_lines: 0,
            cached_at: Utc::now(),
            mod_time,
            is_modified: false,
            is_truncated: false,
            last_accessed: AtomicU64::new(now_millis()),
            access_count: AtomicU64::new(0),
        }
    }

    /// Metadata-only entry for a file too large to cache.  `size` records
    /// the on-disk size for the planner snapshot; such entries contribute
    /// nothing to the cache byte budget.
    pub fn new_truncated(size_on_disk: u64, mod_time: Option<SystemTime>) -> Self {
        Self {
            full_content: None,
            is_partial: false,
            partial_cache: HashMap::new(),
            content_hash: None,
            original_hash: None,
            size: size_on_disk,
            total_lines: 0,
            cached_at: Utc::now(),
            mod_time,
            is_modified: false,
            is_truncated: true,
            last_accessed: AtomicU64::new(now_millis()),
            access_count: AtomicU64::new(0),
        }
    }

    /// Record a hit.  Callable under the shared lock.
    pub fn touch(&self) {
        self.last_accessed.store(now_millis(), Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_accessed_ms(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Content hash diverged from the hash at first read: the file was
    /// changed by something other than this session's writing tools.
    pub fn is_dirty(&self) -> bool {
        match (&self.original_hash, &self.content_hash) {
            (Some(orig), Some(current)) => !self.is_modified && orig != current,
            _ => false,
        }
    }

    pub fn snapshot(&self, path: &PathBuf) -> CachedFileSnapshot {
        let mut segments: Vec<CachedSegment> = self.partial_cache.values().cloned().collect();
        segments.sort_by_key(|s| (s.start_line, s.end_line));
        CachedFileSnapshot {
            path: path.clone(),
            full_content: self.full_content.clone(),
            is_partial: self.is_partial,
            segments,
            content_hash: self.content_hash.clone(),
            original_hash: self.original_hash.clone(),
            size: self.size,
            total_lines: self.total_lines,
            cached_at: self.cached_at,
            mod_time: self.mod_time,
            is_modified: self.is_modified,
            is_truncated: self.is_truncated,
            access_count: self.access_count(),
        }
    }
}

/// Owned view of a cache entry returned by lookups, safe to hold across
/// await points.
#[derive(Debug, Clone)]
pub struct CachedFileSnapshot {
    pub path: PathBuf,
    pub full_content: Option<String>,
    pub is_partial: bool,
    /// Segments sorted by start line
    pub segments: Vec<CachedSegment>,
    pub content_hash: Option<String>,
    pub original_hash: Option<String>,
    pub size: u64,
    pub total_lines: usize,
    pub cached_at: DateTime<Utc>,
    pub mod_time: Option<SystemTime>,
    pub is_modified: bool,
    pub is_truncated: bool,
    pub access_count: u64,
}

impl CachedFileSnapshot {
    /// True when there is any content to work with.
    pub fn has_content(&self) -> bool {
        self.full_content.is_some() || !self.segments.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
