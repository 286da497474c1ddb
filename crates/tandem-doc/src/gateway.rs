//! The mutation gateway: the only way local code writes into a document.
//!
//! Writes are optimistic: the live document applies them immediately and the
//! returned future resolves on acknowledgment. Nothing is queued or coalesced
//! here; if the connection only accepts one operation in flight, that is the
//! connection's business.

use std::sync::Arc;

use serde_json::Value;
use tandem_core::{
  Path,
  connection::{Connection, Mutation, OtDocument, OtError},
  reactive::{EventBus, Property, Signal},
  sys::Entity,
  tree,
};
use tracing::{debug, warn};

use crate::{
  error::{DocError, FailureKind, Result},
  events::LocalFieldChange,
  session::{SharedSession, live_doc},
};

pub struct MutationGateway<C: Connection> {
  connection:    Arc<C>,
  session:       SharedSession<C::Doc>,
  data:          Property<Entity>,
  errors:        EventBus<DocError>,
  local_changes: EventBus<LocalFieldChange>,
  last_failure:  Signal<Option<FailureKind>>,
}

impl<C: Connection> Clone for MutationGateway<C> {
  fn clone(&self) -> Self {
    Self {
      connection:    self.connection.clone(),
      session:       self.session.clone(),
      data:          self.data.clone(),
      errors:        self.errors.clone(),
      local_changes: self.local_changes.clone(),
      last_failure:  self.last_failure.clone(),
    }
  }
}

impl<C: Connection> MutationGateway<C> {
  pub(crate) fn new(
    connection: Arc<C>,
    session: SharedSession<C::Doc>,
    data: Property<Entity>,
    errors: EventBus<DocError>,
    local_changes: EventBus<LocalFieldChange>,
    last_failure: Signal<Option<FailureKind>>,
  ) -> Self {
    Self { connection, session, data, errors, local_changes, last_failure }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// An independent copy of the value at `path`. Falls back to the last
  /// known entity data while there is no live document.
  pub fn get_value_at(&self, path: &Path) -> Option<Value> {
    match live_doc(&self.session) {
      Ok(doc) => tree::get_at(&doc.snapshot(), path).cloned(),
      Err(_) => {
        let snapshot = self.data.get().to_snapshot().ok()?;
        tree::get_at(&snapshot, path).cloned()
      }
    }
  }

  /// The entity version as currently known.
  pub fn version(&self) -> u64 {
    match live_doc(&self.session) {
      Ok(doc) => doc.version() + doc.compressed(),
      Err(_) => self.data.get().sys.version,
    }
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Set `path` to `value`, creating intermediate objects. Resolves with the
  /// version after acknowledgment; writing an equal value is a no-op.
  pub async fn set_value_at(&self, path: Path, value: Value) -> Result<u64> {
    let doc = live_doc(&self.session)?;
    if tree::get_at(&doc.snapshot(), &path) == Some(&value) {
      return Ok(self.version());
    }
    self.write(doc, Mutation::Set { path, value }).await
  }

  /// Remove the value at `path`; absent paths are a no-op.
  pub async fn remove_value_at(&self, path: Path) -> Result<u64> {
    let doc = live_doc(&self.session)?;
    if tree::get_at(&doc.snapshot(), &path).is_none() {
      return Ok(self.version());
    }
    self.write(doc, Mutation::Remove { path }).await
  }

  /// Insert `value` at `index` of the list at `path`.
  pub async fn insert_value_at(
    &self,
    path: Path,
    index: usize,
    value: Value,
  ) -> Result<u64> {
    let doc = live_doc(&self.session)?;
    self.write(doc, Mutation::Insert { path, index, value }).await
  }

  /// Append `value` to the list at `path`.
  pub async fn push_value_at(&self, path: Path, value: Value) -> Result<u64> {
    let doc = live_doc(&self.session)?;
    self.write(doc, Mutation::Push { path, value }).await
  }

  /// Apply `mutation` without notifications or error reporting. Used by
  /// normalization, which must not look like a user edit.
  pub(crate) fn apply_silently(&self, mutation: Mutation) -> bool {
    let Ok(doc) = live_doc(&self.session) else {
      return false;
    };
    // Applied locally on submit; the acknowledgment is of no interest.
    drop(doc.submit(mutation));
    true
  }

  async fn write(&self, doc: Arc<C::Doc>, mutation: Mutation) -> Result<u64> {
    let path = mutation.path().clone();
    debug!(%path, "submitting mutation");

    let (kind, error) = match doc.submit(mutation).await {
      Ok(()) => {
        self.last_failure.set(None);
        self.local_changes.emit(LocalFieldChange { path });
        return Ok(doc.version() + doc.compressed());
      }
      Err(OtError::Forbidden) => return self.reauthenticate(path).await,
      Err(OtError::InternalServerError) => {
        (FailureKind::InternalServerError, DocError::InternalServerError)
      }
      Err(OtError::Disconnected) => (FailureKind::Other, DocError::Disconnected),
      Err(OtError::Other(code)) => (FailureKind::Other, DocError::Rejected { code }),
    };
    Err(self.fail(kind, error))
  }

  /// A write was forbidden: refresh credentials once. The write itself is
  /// not retried.
  async fn reauthenticate(&self, path: Path) -> Result<u64> {
    match self.connection.refresh_auth().await {
      Ok(()) => {
        debug!(%path, "credentials refreshed after a forbidden write");
        Err(DocError::RetryAfterReauth(path))
      }
      Err(err) => {
        warn!(%path, error = %err, "reauthentication failed");
        Err(self.fail(FailureKind::Forbidden, DocError::SetValueForbidden(path)))
      }
    }
  }

  fn fail(&self, kind: FailureKind, error: DocError) -> DocError {
    warn!(%error, "write failed");
    self.last_failure.set(Some(kind));
    self.errors.emit(error.clone());
    error
  }
}
