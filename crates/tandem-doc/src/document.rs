//! [`Document`]: one editing session of an entry or asset.
//!
//! The document subscribes to the connection's loader, forwards the live
//! handle's raw events into its change event bus and derives everything the
//! UI observes from that single ordered stream. For every event the pipeline
//! runs, in order: normalization, sys reconciliation, flag derivation, value
//! properties, and finally the public `changes` stream.

use std::{
  collections::HashMap,
  fmt,
  sync::{Arc, Mutex},
};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;
use tandem_core::{
  Path,
  access::{AccessPolicy, Action, EntityIdentity, PermissionEvaluator},
  connection::{Connection, DocLoadState, Loader, Mutation, OtDocument, RawEvent},
  endpoint::SpaceEndpoint,
  path::{FIELDS_KEY, is_affecting},
  presence::{Presence, PresenceHub, ShoutFn},
  reactive::{EventBus, Property, Signal, Stream, Subscription},
  status::DocumentStatus,
  sys::{Entity, Sys},
  tree,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  config::DocumentConfig,
  error::{Diagnostic, DocError, FailureKind, Result},
  events::{DocEvent, LocalFieldChange, touches_fields_root},
  gateway::MutationGateway,
  normalize::{self, Schema},
  reconcile::SysReconciler,
  resource_state::ResourceStateManager,
  reverter::Reverter,
  session::{Session, SharedSession, live_doc, lock},
  status,
};

// ─── Public types ────────────────────────────────────────────────────────────

/// Where a document session is in its life. `Destroyed` is the last value
/// subscribers see; nothing is delivered after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
  Constructing,
  Loading,
  /// The connection delivered a live document or refused to.
  Ready,
  Destroyed,
}

/// The external collaborators a document session talks to.
pub struct Collaborators<C, E> {
  pub connection: Arc<C>,
  pub access:     Arc<dyn AccessPolicy>,
  pub presence:   Arc<dyn PresenceHub>,
  pub endpoint:   Arc<E>,
}

/// The derived connection and editing flags.
#[derive(Clone)]
pub struct DocumentState {
  /// Operations are awaiting acknowledgment.
  pub is_saving:    Property<bool>,
  pub is_connected: Property<bool>,
  /// Edited since the last publish (or never published).
  pub is_dirty:     Property<bool>,
  pub can_edit:     Property<bool>,
  /// The connection delivered a live document or refused to.
  pub loaded:       Property<bool>,
  pub error:        Stream<DocError>,
}

// ─── Inner ───────────────────────────────────────────────────────────────────

struct Inner<C: Connection> {
  session_id:       Uuid,
  session:          SharedSession<C::Doc>,
  schema:           Schema,
  can_update:       bool,
  reconciler:       SysReconciler,
  gateway:          MutationGateway<C>,

  events:           EventBus<DocEvent<C::Doc>>,
  raw_events:       EventBus<RawEvent>,
  changes:          EventBus<Path>,
  shouts:           EventBus<Value>,
  errors:           EventBus<DocError>,
  local_changes:    EventBus<LocalFieldChange>,
  diagnostics:      EventBus<Diagnostic>,

  sys:              Signal<Sys>,
  data:             Signal<Entity>,
  lifecycle:        Signal<Lifecycle>,
  loaded:           Signal<bool>,
  is_connected:     Signal<bool>,
  is_saving:        Signal<bool>,
  is_dirty:         Signal<bool>,
  is_editable:      Signal<bool>,
  can_edit:         Signal<bool>,
  status:           Signal<DocumentStatus>,
  last_failure:     Signal<Option<FailureKind>>,
  value_properties: Mutex<HashMap<String, (Path, Signal<Option<Value>>)>>,

  subscriptions:    Mutex<Vec<Subscription>>,
}

impl<C: Connection> Inner<C> {
  fn is_destroyed(&self) -> bool { lock(&self.session).destroyed }

  fn is_current(&self, doc: &Arc<C::Doc>) -> bool {
    lock(&self.session)
      .doc
      .as_ref()
      .is_some_and(|current| Arc::ptr_eq(current, doc))
  }

  // ── Loader ────────────────────────────────────────────────────────────────

  fn on_load_state(self: &Arc<Self>, state: &DocLoadState<C::Doc>) {
    if self.is_destroyed() {
      return;
    }

    let mut surfaced = None;
    match state {
      DocLoadState::Pending => {
        debug!(session = %self.session_id, "document loading");
        return;
      }
      DocLoadState::None => {
        debug!(session = %self.session_id, "live document released");
        lock(&self.session).detach();
      }
      DocLoadState::Doc(doc) => self.attach(doc.clone()),
      DocLoadState::Error(err) => {
        {
          let mut session = lock(&self.session);
          session.detach();
          session.load_error = Some(err.clone());
        }
        warn!(session = %self.session_id, error = %err, "document failed to load");
        surfaced = Some(if err.is_forbidden() {
          DocError::OpenForbidden
        } else {
          DocError::Disconnected
        });
      }
    }

    if matches!(state, DocLoadState::Doc(_) | DocLoadState::Error(_)) {
      self.loaded.set(true);
      self.lifecycle.set(Lifecycle::Ready);
    }
    self.refresh();
    if let Some(error) = surfaced {
      self.errors.emit(error);
    }
  }

  fn attach(self: &Arc<Self>, doc: Arc<C::Doc>) {
    let inner = Arc::downgrade(self);
    let handle = Arc::downgrade(&doc);
    let forward = doc.events().subscribe(move |event| {
      if let (Some(inner), Some(doc)) = (inner.upgrade(), handle.upgrade()) {
        inner.events.emit(DocEvent::new(doc, event.clone()));
      }
    });

    {
      let mut session = lock(&self.session);
      session.detach();
      session.doc = Some(doc.clone());
      session.doc_events = Some(forward);
      session.load_error = None;
    }
    debug!(session = %self.session_id, "live document attached");
    self.events.emit(DocEvent::opened(doc));
  }

  // ── Event pipeline ────────────────────────────────────────────────────────

  fn on_event(&self, event: &DocEvent<C::Doc>) {
    if self.is_destroyed() || !self.is_current(&event.doc) {
      return;
    }

    match &event.event {
      RawEvent::Change { .. } => {
        let path = event.change_path().unwrap_or_default();
        if touches_fields_root(&path) {
          self.normalize(&event.doc);
        }
        self.reconcile_sys(&event.doc);
        self.refresh();
        self.update_value_properties(&path);
        self.changes.emit(path);
      }
      RawEvent::Acknowledge => {
        self.reconcile_sys(&event.doc);
        self.refresh();
      }
      RawEvent::Shout(message) => self.shouts.emit(message.clone()),
    }
    self.raw_events.emit(event.event.clone());
  }

  fn normalize(&self, doc: &C::Doc) {
    let snapshot = doc.snapshot();
    let Some(fields) = tree::get_at(&snapshot, &Path::fields()) else {
      return;
    };
    for path in normalize::stray_paths(fields, &self.schema) {
      debug!(session = %self.session_id, %path, "dropping key unknown to the schema");
      self.gateway.apply_silently(Mutation::Remove { path });
    }
  }

  fn reconcile_sys(&self, doc: &C::Doc) {
    let snapshot = doc.snapshot();
    let Some(raw) = snapshot.get("sys") else {
      return;
    };
    let raw: Sys = match serde_json::from_value(raw.clone()) {
      Ok(sys) => sys,
      Err(err) => {
        warn!(session = %self.session_id, error = %err, "unreadable sys in snapshot");
        return;
      }
    };

    let outcome = self.reconciler.reconcile(
      &self.sys.get(),
      raw,
      doc.version(),
      doc.compressed(),
      Utc::now(),
    );
    for diagnostic in outcome.diagnostics {
      warn!(session = %self.session_id, %diagnostic, "sys reconciliation");
      self.diagnostics.emit(diagnostic);
    }
    if let Some(sys) = outcome.sys {
      self.sys.set(sys);
    }
  }

  /// Recompute every derived flag from the current inputs. Signals skip
  /// unchanged values, so this is safe to call after any input changed.
  fn refresh(&self) {
    let (doc, load_error) = {
      let session = lock(&self.session);
      if session.destroyed {
        return;
      }
      (session.doc.clone(), session.load_error.clone())
    };

    let sys = self.sys.get();
    let connected = doc.is_some();
    let fields = match &doc {
      Some(doc) => doc
        .snapshot()
        .get(FIELDS_KEY)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new())),
      None => self.data.get().fields,
    };

    self.data.set(Entity::new(sys.clone(), fields));
    self.is_connected.set(connected);
    self.is_saving.set(doc.as_ref().is_some_and(|doc| doc.has_pending_ops()));
    self.is_dirty.set(status::is_dirty(&sys));
    self.is_editable.set(status::is_editable(&sys, self.can_update));
    self.can_edit.set(status::can_edit(&sys, self.can_update, connected));
    self.status.set(status::derive_status(
      &sys,
      load_error.as_ref(),
      self.can_update,
      self.last_failure.get(),
    ));
  }

  fn update_value_properties(&self, changed: &Path) {
    let affected: Vec<(Path, Signal<Option<Value>>)> = lock(&self.value_properties)
      .values()
      .filter(|(path, _)| is_affecting(changed, path))
      .cloned()
      .collect();
    for (path, signal) in affected {
      signal.set(self.gateway.get_value_at(&path));
    }
  }

  // ── Teardown ──────────────────────────────────────────────────────────────

  /// Returns false if teardown already began.
  fn teardown(&self) -> bool {
    {
      let mut session = lock(&self.session);
      if session.destroyed {
        return false;
      }
      session.destroyed = true;
      session.detach();
    }

    // The last notification of the session.
    self.lifecycle.set(Lifecycle::Destroyed);

    self.events.end();
    self.raw_events.end();
    self.changes.end();
    self.shouts.end();
    self.errors.end();
    self.local_changes.end();
    self.diagnostics.end();

    drop(std::mem::take(&mut *lock(&self.subscriptions)));
    for signal in [
      &self.loaded,
      &self.is_connected,
      &self.is_saving,
      &self.is_dirty,
      &self.is_editable,
      &self.can_edit,
    ] {
      signal.end();
    }
    self.sys.end();
    self.data.end();
    self.status.end();
    self.last_failure.end();
    self.lifecycle.end();
    for (_, signal) in lock(&self.value_properties).values() {
      signal.end();
    }
    true
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// The facade the rest of the application edits an entity through.
///
/// Dropping the document destroys it.
pub struct Document<C: Connection, E: SpaceEndpoint> {
  inner:          Arc<Inner<C>>,
  state:          DocumentState,
  permissions:    Arc<dyn PermissionEvaluator>,
  loader:         C::Loader,
  reverter:       Reverter<C>,
  resource_state: ResourceStateManager<E>,
  presence:       Option<Box<dyn Presence>>,
}

impl<C: Connection, E: SpaceEndpoint> Document<C, E> {
  /// Open an editing session for `entity`. The entity's fields, minus keys
  /// `schema` does not know, become the revert baseline; its version the
  /// floor for version diagnostics.
  pub fn new(
    config: DocumentConfig,
    entity: Entity,
    schema: Schema,
    collaborators: Collaborators<C, E>,
  ) -> Self {
    let Collaborators { connection, access, presence, endpoint } = collaborators;
    let session_id = Uuid::new_v4();
    debug!(session = %session_id, entity = %entity.sys.id, "opening document");

    let permissions = access.permissions_for(&EntityIdentity::from_sys(&entity.sys));
    let can_update = permissions.can(Action::Update);

    let session = Arc::new(Mutex::new(Session::new()));
    let data = Signal::new(entity.clone());
    let errors = EventBus::new();
    let local_changes = EventBus::new();
    let last_failure = Signal::new(None);
    let gateway = MutationGateway::new(
      connection.clone(),
      session.clone(),
      data.property(),
      errors.clone(),
      local_changes.clone(),
      last_failure.clone(),
    );

    let baseline = normalize::normalized_fields(&entity.fields, &schema);
    let sys = &entity.sys;
    let inner = Arc::new(Inner {
      session_id,
      session: session.clone(),
      schema,
      can_update,
      reconciler: SysReconciler::new(sys.version),
      gateway: gateway.clone(),
      events: EventBus::new(),
      raw_events: EventBus::new(),
      changes: EventBus::new(),
      shouts: EventBus::new(),
      errors,
      local_changes,
      diagnostics: EventBus::new(),
      sys: Signal::new(sys.clone()),
      data,
      lifecycle: Signal::new(Lifecycle::Constructing),
      loaded: Signal::new(false),
      is_connected: Signal::new(false),
      is_saving: Signal::new(false),
      is_dirty: Signal::new(status::is_dirty(sys)),
      is_editable: Signal::new(status::is_editable(sys, can_update)),
      can_edit: Signal::new(false),
      status: Signal::new(status::derive_status(sys, None, can_update, None)),
      last_failure,
      value_properties: Mutex::default(),
      subscriptions: Mutex::default(),
    });

    // The pipeline is the first subscriber of the event bus, so it sees (and
    // normalizes) every event before anyone else.
    let weak = Arc::downgrade(&inner);
    let pipeline = inner.events.stream().subscribe(move |event| {
      if let Some(inner) = weak.upgrade() {
        inner.on_event(event);
      }
    });
    let weak = Arc::downgrade(&inner);
    let sys_updates = inner.sys.property().on_change(move |_| {
      if let Some(inner) = weak.upgrade() {
        inner.refresh();
      }
    });
    let weak = Arc::downgrade(&inner);
    let failures = inner.last_failure.property().on_change(move |_| {
      if let Some(inner) = weak.upgrade() {
        inner.refresh();
      }
    });
    lock(&inner.subscriptions).extend([pipeline, sys_updates, failures]);

    let reverter = Reverter::new(baseline, gateway);
    let resource_state = ResourceStateManager::new(
      endpoint,
      inner.sys.clone(),
      inner.data.property(),
      inner.diagnostics.clone(),
    );

    let presence = config.track_presence.then(|| {
      let shout_session = Arc::downgrade(&session);
      let shout: ShoutFn = Arc::new(move |message: Value| {
        if let Some(doc) = shout_session.upgrade().and_then(|s| live_doc(&s).ok()) {
          doc.shout(message);
        }
      });
      presence.create(&config.user_id, inner.shouts.stream(), shout)
    });

    inner.lifecycle.set(Lifecycle::Loading);
    let loader = connection.get_doc_loader(&entity, inner.is_editable.property());
    let weak = Arc::downgrade(&inner);
    let loads = loader.state().subscribe(move |state| {
      if let Some(inner) = weak.upgrade() {
        inner.on_load_state(state);
      }
    });
    lock(&inner.subscriptions).push(loads);

    let state = DocumentState {
      is_saving:    inner.is_saving.property(),
      is_connected: inner.is_connected.property(),
      is_dirty:     inner.is_dirty.property(),
      can_edit:     inner.can_edit.property(),
      loaded:       inner.loaded.property(),
      error:        inner.errors.stream(),
    };

    Self { inner, state, permissions, loader, reverter, resource_state, presence }
  }

  /// Identifies this session in logs.
  pub fn session_id(&self) -> Uuid { self.inner.session_id }

  // ── Values ────────────────────────────────────────────────────────────────

  /// An independent copy of the value at `path`.
  pub fn get_value_at(&self, path: &Path) -> Option<Value> {
    self.inner.gateway.get_value_at(path)
  }

  /// The value at `path` as a property, updated on every change affecting
  /// it. Memoized per path.
  pub fn value_property_at(&self, path: &Path) -> Property<Option<Value>> {
    let mut properties = lock(&self.inner.value_properties);
    properties
      .entry(path.memo_key())
      .or_insert_with(|| {
        (path.clone(), Signal::new(self.inner.gateway.get_value_at(path)))
      })
      .1
      .property()
  }

  pub async fn set_value_at(&self, path: Path, value: Value) -> Result<u64> {
    self.inner.gateway.set_value_at(path, value).await
  }

  pub async fn remove_value_at(&self, path: Path) -> Result<u64> {
    self.inner.gateway.remove_value_at(path).await
  }

  pub async fn insert_value_at(
    &self,
    path: Path,
    index: usize,
    value: Value,
  ) -> Result<u64> {
    self.inner.gateway.insert_value_at(path, index, value).await
  }

  pub async fn push_value_at(&self, path: Path, value: Value) -> Result<u64> {
    self.inner.gateway.push_value_at(path, value).await
  }

  pub fn gateway(&self) -> &MutationGateway<C> { &self.inner.gateway }

  // ── Streams ───────────────────────────────────────────────────────────────

  /// Raw events of the live document, after the internal pipeline ran.
  pub fn events(&self) -> Stream<RawEvent> { self.inner.raw_events.stream() }

  /// Paths of every change, local or remote. `[]` means the whole document.
  pub fn changes(&self) -> Stream<Path> { self.inner.changes.stream() }

  pub fn local_field_changes(&self) -> Stream<LocalFieldChange> {
    self.inner.local_changes.stream()
  }

  pub fn diagnostics(&self) -> Stream<Diagnostic> {
    self.inner.diagnostics.stream()
  }

  // ── Properties ────────────────────────────────────────────────────────────

  pub fn state(&self) -> &DocumentState { &self.state }

  pub fn status(&self) -> Property<DocumentStatus> { self.inner.status.property() }

  /// `{sys, fields}`; every read is an independent copy.
  pub fn data(&self) -> Property<Entity> { self.inner.data.property() }

  pub fn sys(&self) -> Property<Sys> { self.inner.sys.property() }

  pub fn lifecycle(&self) -> Property<Lifecycle> {
    self.inner.lifecycle.property()
  }

  // ── Components ────────────────────────────────────────────────────────────

  pub fn reverter(&self) -> &Reverter<C> { &self.reverter }

  pub fn permissions(&self) -> &Arc<dyn PermissionEvaluator> { &self.permissions }

  pub fn presence(&self) -> Option<&dyn Presence> { self.presence.as_deref() }

  pub fn resource_state(&self) -> &ResourceStateManager<E> {
    &self.resource_state
  }

  // ── Teardown ──────────────────────────────────────────────────────────────

  /// End the session: detach the live document, stop the event bus, release
  /// every derived property, leave presence and close the loader. Nothing
  /// is delivered to any subscriber once this starts. Idempotent.
  pub fn destroy(&self) {
    if !self.inner.teardown() {
      return;
    }
    self.resource_state.end();
    if let Some(presence) = &self.presence {
      presence.destroy();
    }
    self.loader.close();
    debug!(session = %self.inner.session_id, "document destroyed");
  }
}

impl<C: Connection, E: SpaceEndpoint> Drop for Document<C, E> {
  fn drop(&mut self) { self.destroy(); }
}

impl<C: Connection, E: SpaceEndpoint> fmt::Debug for Document<C, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Document")
      .field("session_id", &self.inner.session_id)
      .field("lifecycle", &self.inner.lifecycle.get())
      .field("status", &self.inner.status.get())
      .finish_non_exhaustive()
  }
}
