//! Storage contract for the local catalog cache.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

use crate::models::{Character, CharacterEpisodeLink, Episode};
use crate::repository::PageCursor;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Failed to (de)serialize column: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Failed to create cache directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("Lock poisoned: {0}")]
  LockPoisoned(String),

  #[error("Invalid stored value: {0}")]
  InvalidValue(String),
}

/// Row counts and cursor state, for status output.
#[derive(Debug, Clone)]
pub struct CacheStats {
  pub characters: usize,
  pub episodes: usize,
  pub links: usize,
  pub cursor: PageCursor,
  /// When the cursor was last written
  pub cursor_updated_at: Option<DateTime<Utc>>,
}

/// Trait for cache storage backends.
///
/// All writes are upserts; nothing is ever deleted. Operations are
/// synchronous and short, so callers may invoke them from async code.
pub trait CacheStorage: Send + Sync {
  /// Insert or update characters, keeping the position of existing rows.
  fn upsert_characters(&self, characters: &[Character]) -> Result<(), StoreError>;

  /// All cached characters in first-insertion order.
  #[cfg(test)]
  fn get_characters(&self) -> Result<Vec<Character>, StoreError>;

  /// A single cached character, without episodes.
  fn get_character(&self, id: i64) -> Result<Option<Character>, StoreError>;

  /// Live view of the character table. Emits after every character write.
  fn watch_characters(&self) -> watch::Receiver<Vec<Character>>;

  /// Insert or update episodes.
  fn upsert_episodes(&self, episodes: &[Episode]) -> Result<(), StoreError>;

  /// Insert character/episode links. Existing pairs are left as they are.
  fn create_links(&self, links: &[CharacterEpisodeLink]) -> Result<(), StoreError>;

  /// Episodes linked to a character, in link order.
  fn get_episodes_for_character(&self, character_id: i64) -> Result<Vec<Episode>, StoreError>;

  /// Read the durable pagination cursor.
  fn get_next_page(&self) -> Result<PageCursor, StoreError>;

  /// Persist the pagination cursor.
  fn set_next_page(&self, cursor: PageCursor) -> Result<(), StoreError>;

  fn stats(&self) -> Result<CacheStats, StoreError>;
}
