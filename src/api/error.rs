use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  Server(String),

  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Invalid URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl ApiError {
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status.as_u16() {
      404 => ApiError::NotFound(truncated),
      429 => ApiError::RateLimited,
      500..=599 => ApiError::Server(format!("Status {}: {}", status, truncated)),
      _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }
}
