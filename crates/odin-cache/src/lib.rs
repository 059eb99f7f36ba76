// SPDX-License-Identifier: MIT
pub mod cache;
pub mod entry;
pub mod sufficiency;

pub use cache::{FileCache, FileStat};
pub use entry::{sha256_hex, CachedFileSnapshot, CachedSegment};
pub use sufficiency::check_sufficiency;
