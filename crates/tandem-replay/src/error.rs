//! Error type for `tandem-replay`.

use tandem_doc::{DocError, ResourceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Document(#[from] DocError),

  #[error(transparent)]
  Resource(#[from] ResourceError),

  #[error("memory backend error: {0}")]
  Memory(#[from] tandem_memory::Error),

  #[error("no live document")]
  NoLiveDocument,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
