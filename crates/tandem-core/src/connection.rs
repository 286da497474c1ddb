//! The remote OT connection, as seen by the sync core.
//!
//! Implemented by transport backends (e.g. `tandem-memory`). The sync core
//! depends on this abstraction only; wire protocol, reconnection and backoff
//! live behind it.

use std::{fmt, future::Future, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::{
  Path,
  reactive::{Property, Stream},
  sys::Entity,
  tree,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// An error reported by the remote document, either while opening it or in
/// response to a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtError {
  #[error("forbidden")]
  Forbidden,

  #[error("internal server error")]
  InternalServerError,

  #[error("disconnected")]
  Disconnected,

  #[error("{0}")]
  Other(String),
}

impl OtError {
  pub fn is_forbidden(&self) -> bool { matches!(self, Self::Forbidden) }
}

// ─── Raw events ──────────────────────────────────────────────────────────────

/// An event emitted by a live OT document.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
  /// An operation was applied to the snapshot. `op_paths` lists the path of
  /// every op component; `local` is set for operations this client submitted.
  Change { op_paths: Vec<Path>, local: bool },
  /// The server acknowledged this client's pending operations.
  Acknowledge,
  /// A broadcast message from another client (presence).
  Shout(Value),
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// A single write against a document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Set { path: Path, value: Value },
  Remove { path: Path },
  Insert { path: Path, index: usize, value: Value },
  Push { path: Path, value: Value },
}

impl Mutation {
  pub fn path(&self) -> &Path {
    match self {
      Self::Set { path, .. }
      | Self::Remove { path }
      | Self::Insert { path, .. }
      | Self::Push { path, .. } => path,
    }
  }

  /// Apply to `snapshot` in place.
  pub fn apply(&self, snapshot: &mut Value) -> crate::Result<()> {
    match self {
      Self::Set { path, value } => tree::set_at(snapshot, path, value.clone()),
      Self::Remove { path } => tree::remove_at(snapshot, path).map(drop),
      Self::Insert { path, index, value } => {
        tree::insert_at(snapshot, path, *index, value.clone())
      }
      Self::Push { path, value } => tree::push_at(snapshot, path, value.clone()),
    }
  }
}

// ─── Live document ───────────────────────────────────────────────────────────

/// A live handle to a remote OT document.
pub trait OtDocument: Send + Sync + 'static {
  /// The current snapshot, `{sys, fields}`, including optimistic local ops.
  fn snapshot(&self) -> Value;

  /// The server version of the snapshot.
  fn version(&self) -> u64;

  /// Number of operations folded away by server-side compression; added to
  /// [`version`](Self::version) to obtain the entity version.
  fn compressed(&self) -> u64 { 0 }

  /// Whether submitted operations are still awaiting acknowledgment.
  fn has_pending_ops(&self) -> bool;

  /// Raw events, in the order the document applies them.
  fn events(&self) -> Stream<RawEvent>;

  /// Submit a mutation. It is applied to the local snapshot before this
  /// method returns; the future resolves once the server acknowledged or
  /// rejected it. Dropping the future does not cancel the operation.
  fn submit(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<(), OtError>> + Send + 'static;

  /// Broadcast a message to the other clients of this document.
  fn shout(&self, message: Value);

  /// The sync core stopped using this handle.
  fn detach(&self) {}
}

// ─── Loader ──────────────────────────────────────────────────────────────────

/// Where opening a document currently stands.
pub enum DocLoadState<D> {
  /// Nothing requested, or the handle went away.
  None,
  Pending,
  Doc(Arc<D>),
  Error(OtError),
}

impl<D> DocLoadState<D> {
  pub fn doc(&self) -> Option<&Arc<D>> {
    match self {
      Self::Doc(doc) => Some(doc),
      _ => None,
    }
  }
}

impl<D> Clone for DocLoadState<D> {
  fn clone(&self) -> Self {
    match self {
      Self::None => Self::None,
      Self::Pending => Self::Pending,
      Self::Doc(doc) => Self::Doc(doc.clone()),
      Self::Error(err) => Self::Error(err.clone()),
    }
  }
}

/// Handles compare by identity.
impl<D> PartialEq for DocLoadState<D> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::None, Self::None) | (Self::Pending, Self::Pending) => true,
      (Self::Doc(a), Self::Doc(b)) => Arc::ptr_eq(a, b),
      (Self::Error(a), Self::Error(b)) => a == b,
      _ => false,
    }
  }
}

impl<D> fmt::Debug for DocLoadState<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::None => f.write_str("None"),
      Self::Pending => f.write_str("Pending"),
      Self::Doc(_) => f.write_str("Doc(..)"),
      Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
    }
  }
}

/// The per-entity handle returned by [`Connection::get_doc_loader`].
pub trait Loader: Send + Sync + 'static {
  type Doc: OtDocument;

  fn state(&self) -> Property<DocLoadState<Self::Doc>>;

  /// Release the document; the state settles on [`DocLoadState::None`].
  fn close(&self);
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// A shared connection to the OT server.
pub trait Connection: Send + Sync + 'static {
  type Doc: OtDocument;
  type Loader: Loader<Doc = Self::Doc>;
  type Error: std::error::Error + Send + Sync + 'static;

  /// Start loading the document for `entity`. `is_editable` tells the
  /// connection whether write access should be requested; it may change
  /// over the session.
  fn get_doc_loader(
    &self,
    entity: &Entity,
    is_editable: Property<bool>,
  ) -> Self::Loader;

  /// Refresh the credentials used by the connection.
  fn refresh_auth(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
