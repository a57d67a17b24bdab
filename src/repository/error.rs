use thiserror::Error;

use crate::api::ApiError;
use crate::cache::StoreError;

#[derive(Error, Debug)]
pub enum RepoError {
  #[error("Character {0} not found")]
  NotFound(i64),

  #[error("Remote fetch failed: {0}")]
  Remote(#[from] ApiError),

  #[error("Local cache failed: {0}")]
  Store(#[from] StoreError),
}

impl RepoError {
  /// Whether re-invoking the same operation later may succeed.
  pub fn is_transient(&self) -> bool {
    !matches!(self, RepoError::NotFound(_))
  }
}
