//! SQLite implementation of the catalog cache.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

use super::traits::{CacheStats, CacheStorage, StoreError};
use crate::models::{Character, CharacterEpisodeLink, Episode};
use crate::repository::PageCursor;

/// Settings key holding the character listing cursor.
const NEXT_PAGE_KEY: &str = "next_characters_page_to_load";

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  characters_tx: watch::Sender<Vec<Character>>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "Opened cache database");
    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("rmcache").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    let characters = query_characters(&conn)?;
    let (characters_tx, _) = watch::channel(characters);

    Ok(Self {
      conn: Mutex::new(conn),
      characters_tx,
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::LockPoisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Characters in the order they were first cached
CREATE TABLE IF NOT EXISTS characters (
    id INTEGER PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    species TEXT NOT NULL,
    origin TEXT NOT NULL,
    image_url TEXT NOT NULL,
    episode_refs TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_characters_position ON characters(position);

CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    air_date TEXT NOT NULL,
    episode_code TEXT NOT NULL,
    url TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Character to episode mapping (rowid preserves link order)
CREATE TABLE IF NOT EXISTS character_episodes (
    character_id INTEGER NOT NULL REFERENCES characters(id),
    episode_id INTEGER NOT NULL REFERENCES episodes(id),
    PRIMARY KEY (character_id, episode_id)
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const SELECT_CHARACTER: &str =
  "SELECT id, name, status, species, origin, image_url, episode_refs FROM characters";

fn character_from_row(row: &Row<'_>) -> rusqlite::Result<Character> {
  let refs: String = row.get(6)?;
  let episode_refs: Vec<String> = serde_json::from_str(&refs).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
  })?;

  Ok(Character {
    id: row.get(0)?,
    name: row.get(1)?,
    status: row.get(2)?,
    species: row.get(3)?,
    origin: row.get(4)?,
    image_url: row.get(5)?,
    episode_refs,
    episodes: Vec::new(),
  })
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
  Ok(Episode {
    id: row.get(0)?,
    name: row.get(1)?,
    air_date: row.get(2)?,
    episode_code: row.get(3)?,
    url: row.get(4)?,
  })
}

fn query_characters(conn: &Connection) -> Result<Vec<Character>, StoreError> {
  let mut stmt = conn.prepare(&format!("{} ORDER BY position", SELECT_CHARACTER))?;
  let characters = stmt
    .query_map([], character_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(characters)
}

fn count(conn: &Connection, table: &str) -> Result<usize, StoreError> {
  let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
    row.get(0)
  })?;
  usize::try_from(n).map_err(|_| StoreError::InvalidValue(format!("negative count in {}", table)))
}

impl CacheStorage for SqliteStorage {
  fn upsert_characters(&self, characters: &[Character]) -> Result<(), StoreError> {
    if characters.is_empty() {
      return Ok(());
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(
        "INSERT INTO characters (id, position, name, status, species, origin, image_url, episode_refs, cached_at)
         VALUES (?1, (SELECT COALESCE(MAX(position), 0) + 1 FROM characters), ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           status = excluded.status,
           species = excluded.species,
           origin = excluded.origin,
           image_url = excluded.image_url,
           episode_refs = excluded.episode_refs,
           cached_at = excluded.cached_at",
      )?;

      for character in characters {
        let refs = serde_json::to_string(&character.episode_refs)?;
        stmt.execute(params![
          character.id,
          character.name,
          character.status,
          character.species,
          character.origin,
          character.image_url,
          refs,
        ])?;
      }
    }
    tx.commit()?;

    // Publish while still holding the lock so emissions follow write order
    let all = query_characters(&conn)?;
    debug!(written = characters.len(), total = all.len(), "Upserted characters");
    self.characters_tx.send_replace(all);

    Ok(())
  }

  #[cfg(test)]
  fn get_characters(&self) -> Result<Vec<Character>, StoreError> {
    let conn = self.lock()?;
    query_characters(&conn)
  }

  fn get_character(&self, id: i64) -> Result<Option<Character>, StoreError> {
    let conn = self.lock()?;
    let character = conn
      .query_row(
        &format!("{} WHERE id = ?1", SELECT_CHARACTER),
        params![id],
        character_from_row,
      )
      .optional()?;
    Ok(character)
  }

  fn watch_characters(&self) -> watch::Receiver<Vec<Character>> {
    self.characters_tx.subscribe()
  }

  fn upsert_episodes(&self, episodes: &[Episode]) -> Result<(), StoreError> {
    if episodes.is_empty() {
      return Ok(());
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(
        "INSERT INTO episodes (id, name, air_date, episode_code, url, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           air_date = excluded.air_date,
           episode_code = excluded.episode_code,
           url = excluded.url,
           cached_at = excluded.cached_at",
      )?;

      for episode in episodes {
        stmt.execute(params![
          episode.id,
          episode.name,
          episode.air_date,
          episode.episode_code,
          episode.url,
        ])?;
      }
    }
    tx.commit()?;

    Ok(())
  }

  fn create_links(&self, links: &[CharacterEpisodeLink]) -> Result<(), StoreError> {
    if links.is_empty() {
      return Ok(());
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(
        "INSERT INTO character_episodes (character_id, episode_id) VALUES (?1, ?2)
         ON CONFLICT(character_id, episode_id) DO NOTHING",
      )?;

      for link in links {
        stmt.execute(params![link.character_id, link.episode_id])?;
      }
    }
    tx.commit()?;

    Ok(())
  }

  fn get_episodes_for_character(&self, character_id: i64) -> Result<Vec<Episode>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT e.id, e.name, e.air_date, e.episode_code, e.url
       FROM character_episodes l
       INNER JOIN episodes e ON e.id = l.episode_id
       WHERE l.character_id = ?1
       ORDER BY l.rowid",
    )?;

    let episodes = stmt
      .query_map(params![character_id], episode_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(episodes)
  }

  fn get_next_page(&self) -> Result<PageCursor, StoreError> {
    let conn = self.lock()?;
    let value: Option<i64> = conn
      .query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![NEXT_PAGE_KEY],
        |row| row.get(0),
      )
      .optional()?;
    Ok(PageCursor::from_stored(value))
  }

  fn set_next_page(&self, cursor: PageCursor) -> Result<(), StoreError> {
    let conn = self.lock()?;
    match cursor.to_stored() {
      Some(value) => {
        conn.execute(
          "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
           ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          params![NEXT_PAGE_KEY, value],
        )?;
      }
      None => {
        conn.execute("DELETE FROM settings WHERE key = ?1", params![NEXT_PAGE_KEY])?;
      }
    }
    Ok(())
  }

  fn stats(&self) -> Result<CacheStats, StoreError> {
    let conn = self.lock()?;
    let cursor_row: Option<(i64, String)> = conn
      .query_row(
        "SELECT value, updated_at FROM settings WHERE key = ?1",
        params![NEXT_PAGE_KEY],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    let (cursor, cursor_updated_at) = match cursor_row {
      Some((value, updated_at)) => (
        PageCursor::from_stored(Some(value)),
        Some(parse_datetime(&updated_at)?),
      ),
      None => (PageCursor::Start, None),
    };

    Ok(CacheStats {
      characters: count(&conn, "characters")?,
      episodes: count(&conn, "episodes")?,
      links: count(&conn, "character_episodes")?,
      cursor,
      cursor_updated_at,
    })
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::InvalidValue(format!("datetime '{}': {}", s, e)))
}
