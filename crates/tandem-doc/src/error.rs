//! Error and diagnostic types for `tandem-doc`.

use tandem_core::{Path, status::ResourceState};
use thiserror::Error;

use crate::resource_state::ResourceAction;

/// An error surfaced by a document session, either returned from a call or
/// published on the document's error feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
  /// The document could not be opened: permission denied.
  #[error("not allowed to open the document")]
  OpenForbidden,

  /// A write was denied and refreshing credentials did not help.
  #[error("not allowed to write {0}")]
  SetValueForbidden(Path),

  /// A write was denied, credentials were refreshed, and the write must be
  /// retried by the caller.
  #[error("write to {0} was denied before credentials were refreshed; retry")]
  RetryAfterReauth(Path),

  #[error("internal server error")]
  InternalServerError,

  #[error("write rejected: {code}")]
  Rejected { code: String },

  /// There is no live document to read from or write to.
  #[error("disconnected")]
  Disconnected,

  #[error("document session was destroyed")]
  Destroyed,
}

/// Why the most recent write failed; one input of status derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Forbidden,
  InternalServerError,
  Other,
}

/// Protocol-level anomalies. Logged and published for telemetry; never
/// alter any observable document state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
  #[error("inconsistent version: expected at least {expected}, received {received}")]
  VersionInconsistency { expected: u64, received: u64 },
}

/// An error from a publish-lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
  #[error("cannot {action} an entity in state {state}")]
  InvalidTransition {
    action: ResourceAction,
    state:  ResourceState,
  },

  #[error("another lifecycle action is in progress")]
  Busy,

  #[error("endpoint error: {0}")]
  Endpoint(String),

  /// The endpoint answered with metadata older than what is already known.
  #[error("endpoint returned version {received}, already at {current}")]
  StaleMetadata { current: u64, received: u64 },

  #[error("document session was destroyed")]
  Destroyed,
}

pub type Result<T, E = DocError> = std::result::Result<T, E>;
