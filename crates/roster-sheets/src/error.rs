//! Error type for `roster-sheets`.

use roster_core::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("failed to sign token assertion: {0}")]
  Jwt(#[from] jsonwebtoken::errors::Error),

  #[error("failed to read credentials: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid credentials: {0}")]
  Credentials(String),

  #[error("request rejected with status {status}: {body}")]
  Unauthorized { status: u16, body: String },

  #[error("unexpected status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("invalid url: {0}")]
  InvalidUrl(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for SourceError {
  fn from(e: Error) -> Self {
    let message = e.to_string();
    match e {
      Error::Jwt(_)
      | Error::Io(_)
      | Error::Credentials(_)
      | Error::Unauthorized { .. } => SourceError::Auth(message),
      Error::Json(_) => SourceError::Malformed(message),
      Error::Http(_) | Error::Status { .. } | Error::InvalidUrl(_) => {
        SourceError::Transport(message)
      }
    }
  }
}
