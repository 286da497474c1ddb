//! [`MemoryEndpoint`]: publish-lifecycle requests against a
//! [`MemoryConnection`].
//!
//! Every request except delete bumps the entity version and pushes the new
//! `sys` into the live document as a remote operation, the way the server
//! announces lifecycle changes to connected clients.

use std::{
  future::Future,
  sync::{Arc, Mutex},
};

use chrono::Utc;
use tandem_core::{
  connection::OtDocument,
  endpoint::SpaceEndpoint,
  sys::{Entity, Link, Sys},
};
use tracing::info;

use crate::{
  connection::MemoryConnection,
  doc::lock,
  error::{Error, Result},
};

pub struct MemoryEndpoint {
  connection: Arc<MemoryConnection>,
  user_id:    String,
  failures:   Mutex<Vec<String>>,
  calls:      Mutex<Vec<String>>,
}

impl MemoryEndpoint {
  pub fn new(connection: Arc<MemoryConnection>, user_id: impl Into<String>) -> Self {
    Self {
      connection,
      user_id: user_id.into(),
      failures: Mutex::default(),
      calls: Mutex::default(),
    }
  }

  /// Reject the next request with `message`.
  pub fn fail_next(&self, message: impl Into<String>) {
    lock(&self.failures).push(message.into());
  }

  /// Names of the requests made so far, e.g. `["publish", "archive"]`.
  pub fn calls(&self) -> Vec<String> { lock(&self.calls).clone() }

  fn begin(&self, request: &str) -> Result<()> {
    lock(&self.calls).push(request.to_owned());
    match lock(&self.failures).pop() {
      Some(message) => Err(Error::Rejected(message)),
      None => Ok(()),
    }
  }

  /// The entity's current `sys` as the live document knows it.
  fn current(&self, id: &str) -> Result<Sys> {
    let doc = self
      .connection
      .doc(id)
      .ok_or_else(|| Error::NotFound(id.to_owned()))?;
    let sys = doc.snapshot().get("sys").cloned().unwrap_or_default();
    Ok(serde_json::from_value(sys)?)
  }

  /// Bump the version and announce `sys` to the live document.
  fn commit(&self, request: &str, mut sys: Sys, version: u64) -> Result<Sys> {
    sys.version = version + 1;
    sys.updated_at = Some(Utc::now());
    sys.updated_by = Some(Link::user(&self.user_id));
    if let Some(doc) = self.connection.doc(&sys.id) {
      doc.remote_sys(serde_json::to_value(&sys)?)?;
    }
    info!(request, id = %sys.id, version = sys.version, "lifecycle request applied");
    Ok(sys)
  }

  fn apply(
    &self,
    request: &str,
    id: &str,
    version: u64,
    change: impl FnOnce(&mut Sys),
  ) -> Result<Sys> {
    self.begin(request)?;
    let mut sys = self.current(id)?;
    change(&mut sys);
    self.commit(request, sys, version)
  }
}

impl SpaceEndpoint for MemoryEndpoint {
  type Error = Error;

  fn publish(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Sys>> + Send + '_ {
    async move {
      self.begin("publish")?;
      let mut sys = entity.sys;
      let version = sys.version;
      sys.published_version = Some(version);
      sys.published_counter = Some(sys.published_counter.unwrap_or(0) + 1);
      sys.published_at = Some(Utc::now());
      sys.published_by = Some(Link::user(&self.user_id));
      self.commit("publish", sys, version)
    }
  }

  fn unpublish(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys>> + Send + '_ {
    async move {
      self.apply("unpublish", &id, version, |sys| {
        sys.published_version = None;
        sys.published_at = None;
        sys.published_by = None;
      })
    }
  }

  fn archive(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys>> + Send + '_ {
    async move {
      let archived_by = Link::user(&self.user_id);
      self.apply("archive", &id, version, |sys| {
        sys.archived_version = Some(version);
        sys.archived_by = Some(archived_by);
      })
    }
  }

  fn unarchive(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys>> + Send + '_ {
    async move {
      self.apply("unarchive", &id, version, |sys| {
        sys.archived_version = None;
        sys.archived_by = None;
      })
    }
  }

  fn delete(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    async move {
      self.begin("delete")?;
      info!(%id, version, "entity deleted");
      Ok(())
    }
  }
}
