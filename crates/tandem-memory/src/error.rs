//! Error type for `tandem-memory`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tandem_core::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Credential refresh was configured to fail.
  #[error("reauthentication failed")]
  ReauthFailed,

  /// The endpoint was configured to reject the next request.
  #[error("request rejected: {0}")]
  Rejected(String),

  #[error("no live document for entity {0}")]
  NotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
