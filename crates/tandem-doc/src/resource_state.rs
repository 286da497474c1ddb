//! Publish-lifecycle state of the entity and the actions that move it.
//!
//! The state is derived from `sys`. Actions call the space endpoint and push
//! the returned metadata into the same `sys` signal the reconciler writes
//! to, so every derived flag updates the same way it would for a remote
//! change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tandem_core::{
  endpoint::SpaceEndpoint,
  reactive::{EventBus, Property, Signal, Stream, Subscription},
  status::ResourceState,
  sys::{Entity, Sys},
};
use tracing::{info, warn};

use crate::error::{Diagnostic, ResourceError};

/// A publish-lifecycle action.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceAction {
  Publish,
  Unpublish,
  Archive,
  Unarchive,
  Delete,
}

impl ResourceAction {
  /// Whether the action may be applied to an entity in `state`.
  pub fn is_allowed_from(self, state: ResourceState) -> bool {
    use ResourceState::*;
    match self {
      Self::Publish => matches!(state, Draft | Changes),
      Self::Unpublish => matches!(state, Published | Changes),
      Self::Archive => matches!(state, Draft),
      Self::Unarchive => matches!(state, Archived),
      Self::Delete => matches!(state, Draft | Archived),
    }
  }
}

/// Emitted after every successful action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
  pub action: ResourceAction,
  pub from:   ResourceState,
  pub to:     ResourceState,
}

pub struct ResourceStateManager<E: SpaceEndpoint> {
  endpoint:      Arc<E>,
  sys:           Signal<Sys>,
  data:          Property<Entity>,
  state:         Signal<ResourceState>,
  in_progress:   Signal<bool>,
  state_changes: EventBus<StateChange>,
  diagnostics:   EventBus<Diagnostic>,
  _sys_updates:  Subscription,
}

impl<E: SpaceEndpoint> ResourceStateManager<E> {
  /// `sys` is the document's metadata channel; `data` supplies the fields
  /// sent when publishing. Stale endpoint responses are reported on
  /// `diagnostics`.
  pub(crate) fn new(
    endpoint: Arc<E>,
    sys: Signal<Sys>,
    data: Property<Entity>,
    diagnostics: EventBus<Diagnostic>,
  ) -> Self {
    let state = Signal::new(ResourceState::of(&sys.get()));
    let derived = state.clone();
    let sys_updates = sys
      .property()
      .on_change(move |sys| {
        derived.set(ResourceState::of(sys));
      });

    Self {
      endpoint,
      sys,
      data,
      state,
      in_progress: Signal::new(false),
      state_changes: EventBus::new(),
      diagnostics,
      _sys_updates: sys_updates,
    }
  }

  pub fn state(&self) -> Property<ResourceState> { self.state.property() }

  pub fn in_progress(&self) -> Property<bool> { self.in_progress.property() }

  pub fn state_changes(&self) -> Stream<StateChange> {
    self.state_changes.stream()
  }

  /// Stop deriving and notifying. Called on document teardown.
  pub(crate) fn end(&self) {
    self.state.end();
    self.in_progress.end();
    self.state_changes.end();
  }

  /// Apply `action` through the endpoint and publish the resulting
  /// metadata. Resolves with the new state.
  pub async fn apply(
    &self,
    action: ResourceAction,
  ) -> Result<ResourceState, ResourceError> {
    if self.sys.is_ended() {
      return Err(ResourceError::Destroyed);
    }
    let from = self.state.get();
    if !action.is_allowed_from(from) {
      return Err(ResourceError::InvalidTransition { action, state: from });
    }
    if !self.in_progress.set(true) {
      return Err(ResourceError::Busy);
    }

    let result = self.request(action).await;
    self.in_progress.set(false);

    let sys = result.inspect_err(|err| {
      warn!(%action, error = %err, "resource action failed");
    })?;
    if self.sys.is_ended() {
      return Err(ResourceError::Destroyed);
    }
    let current = self.sys.get().version;
    if sys.version < current {
      let diagnostic = Diagnostic::VersionInconsistency {
        expected: current,
        received: sys.version,
      };
      warn!(%action, %diagnostic, "endpoint returned stale metadata");
      self.diagnostics.emit(diagnostic);
      return Err(ResourceError::StaleMetadata { current, received: sys.version });
    }
    self.sys.set(sys);

    let to = self.state.get();
    info!(%action, %from, %to, "resource state changed");
    self.state_changes.emit(StateChange { action, from, to });
    Ok(to)
  }

  async fn request(&self, action: ResourceAction) -> Result<Sys, ResourceError> {
    let current = self.sys.get();
    let id = current.id.clone();
    let version = current.version;
    let endpoint_error = |err: E::Error| ResourceError::Endpoint(err.to_string());

    match action {
      ResourceAction::Publish => {
        let fields = self.data.get().fields;
        self
          .endpoint
          .publish(Entity::new(current, fields))
          .await
          .map_err(endpoint_error)
      }
      ResourceAction::Unpublish => {
        self.endpoint.unpublish(id, version).await.map_err(endpoint_error)
      }
      ResourceAction::Archive => {
        self.endpoint.archive(id, version).await.map_err(endpoint_error)
      }
      ResourceAction::Unarchive => {
        self.endpoint.unarchive(id, version).await.map_err(endpoint_error)
      }
      ResourceAction::Delete => {
        self.endpoint.delete(id, version).await.map_err(endpoint_error)?;
        let mut deleted = current;
        deleted.deleted_version = Some(version);
        Ok(deleted)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    future::Future,
    sync::{Arc, Mutex},
  };

  use serde_json::json;

  use super::*;

  /// Answers every request with the same metadata.
  struct FixedEndpoint(Sys);

  impl SpaceEndpoint for FixedEndpoint {
    type Error = std::io::Error;

    fn publish(
      &self,
      _entity: Entity,
    ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_ {
      async move { Ok(self.0.clone()) }
    }

    fn unpublish(
      &self,
      _id: String,
      _version: u64,
    ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_ {
      async move { Ok(self.0.clone()) }
    }

    fn archive(
      &self,
      _id: String,
      _version: u64,
    ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_ {
      async move { Ok(self.0.clone()) }
    }

    fn unarchive(
      &self,
      _id: String,
      _version: u64,
    ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_ {
      async move { Ok(self.0.clone()) }
    }

    fn delete(
      &self,
      _id: String,
      _version: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
      async move { Ok(()) }
    }
  }

  fn sys(version: u64, published: Option<u64>) -> Sys {
    Sys { id: "e".into(), version, published_version: published, ..Sys::default() }
  }

  #[tokio::test]
  async fn stale_endpoint_metadata_is_rejected() {
    let current = Signal::new(sys(7, None));
    let data = Signal::new(Entity::new(sys(7, None), json!({})));
    let diagnostics = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = diagnostics
      .stream()
      .subscribe(move |d: &Diagnostic| sink.lock().unwrap().push(d.clone()));

    let manager = ResourceStateManager::new(
      Arc::new(FixedEndpoint(sys(5, Some(4)))),
      current.clone(),
      data.property(),
      diagnostics,
    );

    assert_eq!(
      manager.apply(ResourceAction::Publish).await,
      Err(ResourceError::StaleMetadata { current: 7, received: 5 })
    );
    assert_eq!(current.get().version, 7);
    assert_eq!(manager.state().get(), ResourceState::Draft);
    assert!(!manager.in_progress().get());
    assert_eq!(*seen.lock().unwrap(), vec![Diagnostic::VersionInconsistency {
      expected: 7,
      received: 5,
    }]);
  }

  #[test]
  fn transition_table() {
    use ResourceAction::*;
    use ResourceState::*;

    assert!(Publish.is_allowed_from(Draft));
    assert!(Publish.is_allowed_from(Changes));
    assert!(!Publish.is_allowed_from(Published));
    assert!(Unpublish.is_allowed_from(Changes));
    assert!(!Archive.is_allowed_from(Published));
    assert!(Unarchive.is_allowed_from(Archived));
    assert!(Delete.is_allowed_from(Archived));
    assert!(!Delete.is_allowed_from(Deleted));
  }
}
