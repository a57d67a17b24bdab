//! In-memory remote source for repository tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::api_types::{ApiLocation, ApiPageInfo};
use crate::api::{ApiCharacter, ApiCharacterPage, ApiEpisode, ApiError, RemoteSource};

const BASE: &str = "https://rickandmortyapi.com/api";

pub fn api_character(id: i64, episode_ids: &[i64]) -> ApiCharacter {
  ApiCharacter {
    id,
    name: format!("Character {id}"),
    status: "Alive".to_string(),
    species: "Human".to_string(),
    origin: ApiLocation {
      name: "Earth (C-137)".to_string(),
    },
    image: format!("{BASE}/character/avatar/{id}.jpeg"),
    episode: episode_ids
      .iter()
      .map(|e| format!("{BASE}/episode/{e}"))
      .collect(),
  }
}

pub fn api_episode(id: i64) -> ApiEpisode {
  ApiEpisode {
    id,
    name: format!("Episode {id}"),
    air_date: "December 2, 2013".to_string(),
    episode: format!("S01E{id:02}"),
    url: format!("{BASE}/episode/{id}"),
  }
}

/// A listing page holding `ids`, pointing at `next` (a raw `info.next` value).
pub fn api_page(ids: &[i64], next: Option<&str>) -> ApiCharacterPage {
  ApiCharacterPage {
    info: ApiPageInfo {
      count: ids.len() as u64,
      pages: 0,
      next: next.map(String::from),
    },
    results: ids.iter().map(|&id| api_character(id, &[])).collect(),
  }
}

pub fn next_url(page: u32) -> String {
  format!("{BASE}/character?page={page}")
}

/// Serves canned responses and records every call.
#[derive(Default)]
pub struct FakeRemote {
  pages: HashMap<Option<u32>, ApiCharacterPage>,
  characters: HashMap<i64, ApiCharacter>,
  episodes: HashMap<i64, ApiEpisode>,
  fail_pages: bool,
  fail_episodes: bool,
  page_requests: Mutex<Vec<Option<u32>>>,
  character_calls: AtomicUsize,
  episode_batches: Mutex<Vec<Vec<i64>>>,
}

impl FakeRemote {
  pub fn with_page(mut self, page: Option<u32>, response: ApiCharacterPage) -> Self {
    self.pages.insert(page, response);
    self
  }

  pub fn with_character(mut self, character: ApiCharacter) -> Self {
    self.characters.insert(character.id, character);
    self
  }

  pub fn with_episode(mut self, episode: ApiEpisode) -> Self {
    self.episodes.insert(episode.id, episode);
    self
  }

  pub fn failing_pages(mut self) -> Self {
    self.fail_pages = true;
    self
  }

  pub fn failing_episodes(mut self) -> Self {
    self.fail_episodes = true;
    self
  }

  pub fn page_requests(&self) -> Vec<Option<u32>> {
    self.page_requests.lock().unwrap().clone()
  }

  pub fn character_calls(&self) -> usize {
    self.character_calls.load(Ordering::SeqCst)
  }

  pub fn episode_batches(&self) -> Vec<Vec<i64>> {
    self.episode_batches.lock().unwrap().clone()
  }

  pub fn total_calls(&self) -> usize {
    self.page_requests().len() + self.character_calls() + self.episode_batches().len()
  }
}

#[async_trait]
impl RemoteSource for FakeRemote {
  async fn get_characters(&self, page: Option<u32>) -> Result<ApiCharacterPage, ApiError> {
    self.page_requests.lock().unwrap().push(page);
    if self.fail_pages {
      return Err(ApiError::Server("Status 503: unavailable".to_string()));
    }
    self
      .pages
      .get(&page)
      .cloned()
      .ok_or_else(|| ApiError::NotFound(format!("page {:?}", page)))
  }

  async fn get_character(&self, id: i64) -> Result<Option<ApiCharacter>, ApiError> {
    self.character_calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.characters.get(&id).cloned())
  }

  async fn get_episodes(&self, ids: &[i64]) -> Result<Vec<ApiEpisode>, ApiError> {
    self.episode_batches.lock().unwrap().push(ids.to_vec());
    if self.fail_episodes {
      return Err(ApiError::RateLimited);
    }
    Ok(
      ids
        .iter()
        .filter_map(|id| self.episodes.get(id).cloned())
        .collect(),
    )
  }
}
