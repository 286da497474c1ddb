//! Error types for `tandem-core`.

use thiserror::Error;

use crate::path::Path;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot descend into a scalar value at {0}")]
  PathTypeMismatch(Path),

  #[error("index {index} is out of bounds at {path}")]
  IndexOutOfBounds { path: Path, index: usize },

  #[error("expected a list at {0}")]
  NotAList(Path),

  #[error("the document root cannot be removed")]
  RemoveRoot,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
