//! Persistent local cache for the catalog.
//!
//! This module provides the SQLite-backed store the repositories read from
//! and write back into:
//! - Character, episode and character/episode link tables
//! - Upsert-only writes (rows are never deleted)
//! - A live `watch` view of the character table
//! - A single settings row holding the pagination cursor

mod storage;
mod traits;

pub use storage::SqliteStorage;
pub use traits::{CacheStorage, StoreError};
