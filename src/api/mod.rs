//! Remote source for the Rick and Morty REST API.

pub mod api_types;
mod client;
mod error;

use async_trait::async_trait;

pub use api_types::{ApiCharacter, ApiCharacterPage, ApiEpisode};
pub use client::RickMortyClient;
pub use error::ApiError;

/// The remote endpoints the cache coordinators consume.
#[async_trait]
pub trait RemoteSource: Send + Sync {
  /// Fetch one page of the character listing. `None` asks for the first page.
  async fn get_characters(&self, page: Option<u32>) -> Result<ApiCharacterPage, ApiError>;

  /// Fetch a single character. Returns `Ok(None)` when the API has no such id.
  async fn get_character(&self, id: i64) -> Result<Option<ApiCharacter>, ApiError>;

  /// Fetch a batch of episodes in one request.
  async fn get_episodes(&self, ids: &[i64]) -> Result<Vec<ApiEpisode>, ApiError>;
}
