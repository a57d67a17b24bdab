use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;

use super::api_types::{ApiCharacter, ApiCharacterPage, ApiEpisode, OneOrMany};
use super::{ApiError, RemoteSource};

/// Rick and Morty REST API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RickMortyClient {
  client: Client,
  base_url: Url,
}

impl RickMortyClient {
  pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
    // Url::join drops the last segment unless the base ends with a slash
    let mut base = config.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url = Url::parse(&base)?;

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self { client, base_url })
  }

  /// GET a path relative to the base URL and decode the JSON body
  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
    let mut url = self.base_url.join(path)?;
    if !query.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }

    debug!(%url, "GET");
    let response = self.client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ApiError::from_status(status, &body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
      .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
  }
}

#[async_trait]
impl RemoteSource for RickMortyClient {
  async fn get_characters(&self, page: Option<u32>) -> Result<ApiCharacterPage, ApiError> {
    let query: Vec<(&str, String)> = page.map(|p| ("page", p.to_string())).into_iter().collect();
    self.get("character", &query).await
  }

  async fn get_character(&self, id: i64) -> Result<Option<ApiCharacter>, ApiError> {
    match self.get(&format!("character/{}", id), &[]).await {
      Ok(character) => Ok(Some(character)),
      Err(ApiError::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn get_episodes(&self, ids: &[i64]) -> Result<Vec<ApiEpisode>, ApiError> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let joined = ids
      .iter()
      .map(|id| id.to_string())
      .collect::<Vec<_>>()
      .join(",");

    let episodes: OneOrMany<ApiEpisode> = self.get(&format!("episode/{}", joined), &[]).await?;
    Ok(episodes.into_vec())
  }
}
