//! Episode lookups with lazily materialized character links.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::RemoteSource;
use crate::cache::CacheStorage;
use crate::models::{Character, CharacterEpisodeLink, Episode};

use super::RepoError;

/// Resolves the episodes a character appears in.
///
/// The first lookup for a character derives its episode ids from the remote
/// character record, fetches those episodes in one batch and records the
/// links. After that the links are authoritative and no remote call is made.
pub struct EpisodeRepository<S, R> {
  storage: Arc<S>,
  remote: Arc<R>,
}

impl<S: CacheStorage, R: RemoteSource> EpisodeRepository<S, R> {
  pub fn new(storage: Arc<S>, remote: Arc<R>) -> Self {
    Self { storage, remote }
  }

  pub async fn get_episodes(&self, character_id: i64) -> Result<Vec<Episode>, RepoError> {
    let cached = self.storage.get_episodes_for_character(character_id)?;
    if !cached.is_empty() {
      debug!(character_id, count = cached.len(), "Episodes served from cache");
      return Ok(cached);
    }

    let remote_character = self
      .remote
      .get_character(character_id)
      .await?
      .ok_or(RepoError::NotFound(character_id))?;

    // Ids in first-seen order, each requested once
    let mut seen = HashSet::new();
    let ids: Vec<i64> = remote_character
      .episode
      .iter()
      .filter_map(|reference| {
        let id = episode_id_from_ref(reference);
        if id.is_none() {
          warn!(
            character_id,
            reference = reference.as_str(),
            "Dropping malformed episode reference"
          );
        }
        id
      })
      .filter(|id| seen.insert(*id))
      .collect();

    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let episodes: Vec<Episode> = self
      .remote
      .get_episodes(&ids)
      .await?
      .into_iter()
      .map(Episode::from)
      .collect();

    // Links reference both tables, so the character row has to exist first
    if self.storage.get_character(character_id)?.is_none() {
      self
        .storage
        .upsert_characters(&[Character::from(remote_character)])?;
    }
    self.storage.upsert_episodes(&episodes)?;

    let links: Vec<CharacterEpisodeLink> = episodes
      .iter()
      .map(|episode| CharacterEpisodeLink {
        character_id,
        episode_id: episode.id,
      })
      .collect();
    self.storage.create_links(&links)?;

    debug!(character_id, count = episodes.len(), "Episodes fetched and linked");
    Ok(episodes)
  }
}

impl<S, R> Clone for EpisodeRepository<S, R> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      remote: Arc::clone(&self.remote),
    }
  }
}

/// The numeric id at the end of an episode URL, e.g. `.../episode/28` -> 28.
fn episode_id_from_ref(reference: &str) -> Option<i64> {
  reference.rsplit('/').next()?.parse().ok()
}
