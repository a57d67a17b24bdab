//! Serde-deserializable types matching Rick and Morty API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. Only the fields
//! the cache consumes are modelled; everything else is ignored.

use serde::Deserialize;

use crate::models::{Character, Episode};

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiLocation {
  #[serde(default)]
  pub name: String,
}

/// Either a single object or a list of them.
///
/// The multi-id episode endpoint returns a bare object when asked for
/// exactly one id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  Many(Vec<T>),
  One(T),
}

impl<T> OneOrMany<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      OneOrMany::Many(items) => items,
      OneOrMany::One(item) => vec![item],
    }
  }
}

// ============================================================================
// Character endpoints
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCharacter {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub species: String,
  #[serde(default)]
  pub origin: ApiLocation,
  #[serde(default)]
  pub image: String,
  #[serde(default)]
  pub episode: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPageInfo {
  #[serde(default)]
  pub count: u64,
  #[serde(default)]
  pub pages: u64,
  pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCharacterPage {
  #[serde(default)]
  pub info: ApiPageInfo,
  #[serde(default)]
  pub results: Vec<ApiCharacter>,
}

// ============================================================================
// Episode endpoint
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEpisode {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub air_date: String,
  #[serde(default)]
  pub episode: String,
  #[serde(default)]
  pub url: String,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiCharacter> for Character {
  fn from(c: ApiCharacter) -> Self {
    Character {
      id: c.id,
      name: c.name,
      status: c.status,
      species: c.species,
      origin: c.origin.name,
      image_url: c.image,
      episode_refs: c.episode,
      episodes: Vec::new(),
    }
  }
}

impl From<ApiEpisode> for Episode {
  fn from(e: ApiEpisode) -> Self {
    Episode {
      id: e.id,
      name: e.name,
      air_date: e.air_date,
      episode_code: e.episode,
      url: e.url,
    }
  }
}
