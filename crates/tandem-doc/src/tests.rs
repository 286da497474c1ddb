//! Integration tests for `Document` against the in-memory backends.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tandem_core::{
  Path,
  access::Action,
  connection::{Mutation, OtError, RawEvent},
  presence::Presence,
  reactive::{Property, Stream, Subscription},
  status::{DocumentStatus, ResourceState},
  sys::{Entity, Sys},
};
use tandem_memory::{
  MemoryAccessPolicy, MemoryConnection, MemoryDoc, MemoryEndpoint,
  MemoryPresenceHub, PresenceMessage,
};

use crate::{
  Collaborators, Diagnostic, DocError, Document, DocumentConfig, Lifecycle,
  LocalFieldChange, ResourceAction, ResourceError, Schema, StateChange,
};

const ID: &str = "entry-1";

fn schema() -> Schema { Schema::new(["title", "body", "tags"], ["en-US", "de"]) }

fn sys(version: u64, published: Option<u64>) -> Sys {
  Sys {
    id: ID.into(),
    kind: Some("Entry".into()),
    version,
    published_version: published,
    ..Sys::default()
  }
}

fn entity(version: u64, published: Option<u64>) -> Entity {
  Entity::new(
    sys(version, published),
    json!({
      "title": { "en-US": "Hello", "de": "Hallo" },
      "tags": { "en-US": ["a"] }
    }),
  )
}

fn title() -> Path { Path::field_locale("title", "en-US") }

struct Harness {
  connection: Arc<MemoryConnection>,
  endpoint:   Arc<MemoryEndpoint>,
  document:   Document<MemoryConnection, MemoryEndpoint>,
}

impl Harness {
  fn live(&self) -> Arc<MemoryDoc> { self.connection.doc(ID).expect("live document") }
}

fn open(entity: Entity) -> Harness {
  open_with(entity, MemoryConnection::new(), MemoryAccessPolicy::allow_all())
}

fn open_with(
  entity: Entity,
  connection: MemoryConnection,
  access: MemoryAccessPolicy,
) -> Harness {
  let connection = Arc::new(connection);
  let endpoint = Arc::new(MemoryEndpoint::new(connection.clone(), "alice"));
  let document = Document::new(
    DocumentConfig::for_user("alice"),
    entity,
    schema(),
    Collaborators {
      connection: connection.clone(),
      access:     Arc::new(access),
      presence:   Arc::new(MemoryPresenceHub),
      endpoint:   endpoint.clone(),
    },
  );
  Harness { connection, endpoint, document }
}

fn collect<T: Clone + Send + 'static>(
  stream: Stream<T>,
) -> (Arc<Mutex<Vec<T>>>, Subscription) {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let sub = stream.subscribe(move |value: &T| sink.lock().unwrap().push(value.clone()));
  (seen, sub)
}

fn watch<T: Clone + PartialEq + Send + 'static>(
  property: &Property<T>,
) -> (Arc<Mutex<Vec<T>>>, Subscription) {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let sub = property.on_change(move |value: &T| sink.lock().unwrap().push(value.clone()));
  (seen, sub)
}

fn len<T>(seen: &Arc<Mutex<Vec<T>>>) -> usize { seen.lock().unwrap().len() }

// ─── Loading ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn published_entity_without_edits_is_clean() {
  let h = open(entity(3, Some(2)));
  let state = h.document.state();

  assert!(state.loaded.get());
  assert!(state.is_connected.get());
  assert!(!state.is_dirty.get());
  assert!(state.can_edit.get());
  assert!(!state.is_saving.get());
  assert_eq!(h.document.status().get(), DocumentStatus::Ok);
  assert_eq!(h.document.lifecycle().get(), Lifecycle::Ready);
  assert_eq!(h.document.get_value_at(&title()), Some(json!("Hello")));
}

#[tokio::test]
async fn edits_after_publishing_make_the_entity_dirty() {
  assert!(open(entity(4, Some(2))).document.state().is_dirty.get());
  assert!(open(entity(1, None)).document.state().is_dirty.get());

  let h = open(entity(3, Some(2)));
  h.document.set_value_at(title(), json!("Changed")).await.unwrap();
  assert_eq!(h.document.sys().get().version, 4);
  assert!(h.document.state().is_dirty.get());
}

#[tokio::test]
async fn pending_load_is_not_ready() {
  let h = open_with(entity(3, None), MemoryConnection::manual(), MemoryAccessPolicy::allow_all());
  assert_eq!(h.document.lifecycle().get(), Lifecycle::Loading);
  assert!(!h.document.state().loaded.get());
  assert!(!h.document.state().can_edit.get());
  assert_eq!(h.document.get_value_at(&title()), Some(json!("Hello")));

  assert!(h.connection.open(ID));
  assert_eq!(h.document.lifecycle().get(), Lifecycle::Ready);
  assert!(h.document.state().can_edit.get());
}

#[tokio::test]
async fn forbidden_open_is_reported() {
  let h = open_with(entity(3, None), MemoryConnection::manual(), MemoryAccessPolicy::allow_all());
  let (errors, _sub) = collect(h.document.state().error.clone());

  h.connection.reject(ID, OtError::Forbidden);
  assert_eq!(*errors.lock().unwrap(), vec![DocError::OpenForbidden]);
  assert!(h.document.state().loaded.get());
  assert!(!h.document.state().is_connected.get());
  assert!(!h.document.state().can_edit.get());
}

#[tokio::test]
async fn failed_open_is_a_connection_error() {
  let h = open_with(entity(3, None), MemoryConnection::manual(), MemoryAccessPolicy::allow_all());
  let (errors, _sub) = collect(h.document.state().error.clone());

  h.connection.reject(ID, OtError::Other("unavailable".into()));
  assert_eq!(*errors.lock().unwrap(), vec![DocError::Disconnected]);
  assert_eq!(h.document.status().get(), DocumentStatus::OtConnectionError);
}

// ─── Sys reconciliation ──────────────────────────────────────────────────────

#[tokio::test]
async fn older_server_version_is_flagged_and_ignored() {
  let connection = MemoryConnection::manual();
  let stale = entity(1, None).to_snapshot().unwrap();
  connection.preload(ID, Arc::new(MemoryDoc::new(stale, 1)));
  let h = open_with(entity(4, None), connection, MemoryAccessPolicy::allow_all());
  let (diagnostics, _sub) = collect(h.document.diagnostics());

  h.connection.open(ID);
  assert_eq!(
    *diagnostics.lock().unwrap(),
    vec![Diagnostic::VersionInconsistency { expected: 4, received: 1 }]
  );
  assert_eq!(h.document.sys().get().version, 4);
  assert_eq!(h.document.status().get(), DocumentStatus::Ok);
}

#[tokio::test]
async fn remote_changes_bump_version_and_updated_at() {
  let h = open(entity(3, None));
  assert_eq!(h.document.sys().get().updated_at, None);

  h.live()
    .remote_apply(Mutation::Set { path: Path::field_locale("body", "de"), value: json!("Text") })
    .unwrap();
  let sys = h.document.sys().get();
  assert_eq!(sys.version, 4);
  assert!(sys.updated_at.is_some());
  assert_eq!(h.document.data().get().fields["body"]["de"], json!("Text"));
}

#[tokio::test]
async fn compressed_operations_count_toward_the_version() {
  let h = open(entity(3, None));
  h.live().set_compressed(2);
  h.live()
    .remote_apply(Mutation::Set { path: title(), value: json!("Hey") })
    .unwrap();
  assert_eq!(h.document.sys().get().version, 6);
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn local_writes_report_field_and_locale() {
  let h = open(entity(3, None));
  let (local, _local_sub) = collect(h.document.local_field_changes());
  let (changes, _changes_sub) = collect(h.document.changes());

  let version = h.document.set_value_at(title(), json!("Hi")).await.unwrap();
  assert_eq!(version, 4);
  h.live()
    .remote_apply(Mutation::Set { path: Path::field_locale("body", "de"), value: json!("x") })
    .unwrap();

  let local = local.lock().unwrap();
  assert_eq!(*local, vec![LocalFieldChange { path: title() }]);
  assert_eq!(local[0].field_id(), Some("title"));
  assert_eq!(local[0].locale_code(), Some("en-US"));
  assert_eq!(
    *changes.lock().unwrap(),
    vec![title(), Path::field_locale("body", "de")]
  );
}

#[tokio::test]
async fn events_carry_raw_events_without_the_handle() {
  let h = open(entity(3, None));
  let (events, _sub) = collect(h.document.events());

  h.document.set_value_at(title(), json!("Hi")).await.unwrap();
  assert_eq!(
    *events.lock().unwrap(),
    vec![
      RawEvent::Change { op_paths: vec![title()], local: true },
      RawEvent::Acknowledge,
    ]
  );
}

#[tokio::test]
async fn writing_an_equal_value_is_a_no_op() {
  let h = open(entity(3, None));
  let (local, _sub) = collect(h.document.local_field_changes());

  assert_eq!(h.document.set_value_at(title(), json!("Hello")).await, Ok(3));
  assert_eq!(h.document.remove_value_at(Path::field_locale("body", "de")).await, Ok(3));
  assert_eq!(len(&local), 0);
}

#[tokio::test]
async fn list_writes() {
  let h = open(entity(3, None));
  let tags = Path::field_locale("tags", "en-US");

  h.document.push_value_at(tags.clone(), json!("c")).await.unwrap();
  h.document.insert_value_at(tags.clone(), 1, json!("b")).await.unwrap();
  assert_eq!(h.document.get_value_at(&tags), Some(json!(["a", "b", "c"])));

  let removed = h.document.remove_value_at(tags.clone()).await.unwrap();
  assert_eq!(removed, 6);
  assert_eq!(h.document.get_value_at(&tags), None);
}

#[tokio::test]
async fn forbidden_write_with_failed_reauth_surfaces_once() {
  let h = open(entity(3, None));
  let (errors, _sub) = collect(h.document.state().error.clone());
  h.live().fail_next(OtError::Forbidden);
  h.connection.fail_reauth(true);

  let result = h.document.set_value_at(title(), json!("Nope")).await;
  assert_eq!(result, Err(DocError::SetValueForbidden(title())));
  assert_eq!(*errors.lock().unwrap(), vec![DocError::SetValueForbidden(title())]);
  assert_eq!(h.connection.refresh_count(), 1);
  assert_eq!(h.document.status().get(), DocumentStatus::EditingNotAllowed);
}

#[tokio::test]
async fn forbidden_write_with_successful_reauth_asks_for_a_retry() {
  let h = open(entity(3, None));
  let (errors, _sub) = collect(h.document.state().error.clone());
  h.live().fail_next(OtError::Forbidden);

  let result = h.document.set_value_at(title(), json!("Retry")).await;
  assert_eq!(result, Err(DocError::RetryAfterReauth(title())));
  assert_eq!(len(&errors), 0);
  assert_eq!(h.document.status().get(), DocumentStatus::Ok);

  h.document.set_value_at(title(), json!("Retry")).await.unwrap();
  assert_eq!(h.document.get_value_at(&title()), Some(json!("Retry")));
}

#[tokio::test]
async fn internal_server_errors_clear_on_the_next_success() {
  let h = open(entity(3, None));
  h.live().fail_next(OtError::InternalServerError);

  let result = h.document.set_value_at(title(), json!("a")).await;
  assert_eq!(result, Err(DocError::InternalServerError));
  assert_eq!(h.document.status().get(), DocumentStatus::InternalServerError);

  h.document.set_value_at(title(), json!("b")).await.unwrap();
  assert_eq!(h.document.status().get(), DocumentStatus::Ok);
}

#[tokio::test]
async fn held_acknowledgments_show_as_saving() {
  let h = open(entity(3, None));
  let live = h.live();
  live.hold_acks(true);

  let (result, saving) = tokio::join!(
    h.document.set_value_at(title(), json!("Slow")),
    async {
      let saving = h.document.state().is_saving.get();
      live.flush();
      saving
    }
  );
  assert!(saving);
  assert_eq!(result, Ok(4));
  assert!(!h.document.state().is_saving.get());
}

// ─── Connection ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cannot_edit_while_disconnected() {
  let h = open(entity(3, None));
  h.connection.disconnect(ID);

  assert!(!h.document.state().is_connected.get());
  assert!(!h.document.state().can_edit.get());
  assert_eq!(h.document.get_value_at(&title()), Some(json!("Hello")));
  assert_eq!(
    h.document.set_value_at(title(), json!("x")).await,
    Err(DocError::Disconnected)
  );

  h.connection.open(ID);
  assert!(h.document.state().can_edit.get());
  h.document.set_value_at(title(), json!("x")).await.unwrap();
}

#[tokio::test]
async fn missing_update_permission_disables_editing() {
  let h = open_with(
    entity(3, None),
    MemoryConnection::new(),
    MemoryAccessPolicy::allow_all().deny(Action::Update),
  );
  assert!(h.document.state().is_connected.get());
  assert!(!h.document.state().can_edit.get());
  assert_eq!(h.document.status().get(), DocumentStatus::EditingNotAllowed);
  assert!(!h.document.permissions().can(Action::Update));
}

// ─── Normalization ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stray_keys_are_dropped_on_load() {
  let mut stale = entity(3, None);
  stale.fields["legacy"] = json!({ "en-US": 1 });
  stale.fields["title"]["fr"] = json!("Bonjour");
  let h = open_with(stale, MemoryConnection::manual(), MemoryAccessPolicy::allow_all());
  let (local, _sub) = collect(h.document.local_field_changes());

  h.connection.open(ID);
  assert_eq!(
    h.document.get_value_at(&Path::fields()),
    Some(json!({
      "title": { "en-US": "Hello", "de": "Hallo" },
      "tags": { "en-US": ["a"] }
    }))
  );
  assert_eq!(len(&local), 0);
}

#[tokio::test]
async fn stray_keys_in_remote_field_replacements_are_dropped() {
  let h = open(entity(3, None));
  h.live()
    .remote_apply(Mutation::Set {
      path:  Path::fields(),
      value: json!({ "title": { "en-US": "New", "xx": "?" }, "ghost": {} }),
    })
    .unwrap();
  assert_eq!(
    h.document.get_value_at(&Path::fields()),
    Some(json!({ "title": { "en-US": "New" } }))
  );
}

// ─── Values ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn value_properties_follow_affecting_changes() {
  let h = open(entity(3, None));
  let property = h.document.value_property_at(&title());
  let again = h.document.value_property_at(&title());
  let (seen, _sub) = watch(&property);

  h.live()
    .remote_apply(Mutation::Set { path: title(), value: json!("Remote") })
    .unwrap();
  h.live()
    .remote_apply(Mutation::Set { path: Path::field_locale("body", "de"), value: json!("x") })
    .unwrap();
  h.live()
    .remote_apply(Mutation::Set {
      path:  Path::from(["fields", "title"]),
      value: json!({ "en-US": "Parent" }),
    })
    .unwrap();

  assert_eq!(
    *seen.lock().unwrap(),
    vec![Some(json!("Remote")), Some(json!("Parent"))]
  );
  assert_eq!(again.get(), Some(json!("Parent")));
}

#[tokio::test]
async fn data_reads_are_independent_copies() {
  let h = open(entity(3, None));
  let mut copy = h.document.data().get();
  copy.fields["title"]["en-US"] = json!("Mutated");
  assert_eq!(h.document.data().get().fields["title"]["en-US"], json!("Hello"));
}

// ─── Revert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revert_restores_the_baseline_once() {
  let h = open(entity(3, None));
  let reverter = h.document.reverter();
  assert!(!reverter.has_changes());

  h.document.set_value_at(title(), json!("Changed")).await.unwrap();
  assert!(reverter.has_changes());

  let reverted = reverter.revert().await.unwrap();
  assert!(!reverter.has_changes());
  assert_eq!(h.document.get_value_at(&Path::fields()).as_ref(), Some(reverter.baseline()));

  assert_eq!(reverter.revert().await.unwrap(), reverted);
}

#[tokio::test]
async fn revert_baseline_leaves_out_keys_the_schema_drops() {
  let mut stray = entity(3, None);
  stray.fields["title"]["fr"] = json!("Bonjour");
  let h = open(stray);
  let reverter = h.document.reverter();
  assert!(!reverter.has_changes());
  assert!(reverter.baseline()["title"].get("fr").is_none());

  h.document.set_value_at(title(), json!("Changed")).await.unwrap();
  let once = reverter.revert().await.unwrap();
  let twice = reverter.revert().await.unwrap();
  assert_eq!(once, twice);
  assert_eq!(h.document.sys().get().version, once);
  assert!(!reverter.has_changes());
}

// ─── Publish lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn resource_actions_follow_the_lifecycle() {
  let h = open(entity(3, None));
  let resource = h.document.resource_state();
  let (transitions, _sub) = collect(resource.state_changes());
  assert_eq!(resource.state().get(), ResourceState::Draft);

  assert_eq!(resource.apply(ResourceAction::Publish).await, Ok(ResourceState::Published));
  let sys = h.document.sys().get();
  assert_eq!(sys.published_version, Some(3));
  assert_eq!(sys.version, 4);
  assert!(!h.document.state().is_dirty.get());

  h.document.set_value_at(title(), json!("Edited")).await.unwrap();
  assert_eq!(resource.state().get(), ResourceState::Changes);
  assert!(h.document.state().is_dirty.get());

  assert_eq!(resource.apply(ResourceAction::Unpublish).await, Ok(ResourceState::Draft));
  assert_eq!(resource.apply(ResourceAction::Archive).await, Ok(ResourceState::Archived));
  assert_eq!(h.document.status().get(), DocumentStatus::Archived);
  assert!(!h.document.state().can_edit.get());

  assert_eq!(
    resource.apply(ResourceAction::Publish).await,
    Err(ResourceError::InvalidTransition {
      action: ResourceAction::Publish,
      state:  ResourceState::Archived,
    })
  );

  assert_eq!(resource.apply(ResourceAction::Unarchive).await, Ok(ResourceState::Draft));
  assert_eq!(resource.apply(ResourceAction::Delete).await, Ok(ResourceState::Deleted));
  assert!(!h.document.state().can_edit.get());

  assert_eq!(
    transitions.lock().unwrap()[0],
    StateChange {
      action: ResourceAction::Publish,
      from:   ResourceState::Draft,
      to:     ResourceState::Published,
    }
  );
  assert_eq!(len(&transitions), 5);
  assert_eq!(
    h.endpoint.calls(),
    vec!["publish", "unpublish", "archive", "unarchive", "delete"]
  );
}

#[tokio::test]
async fn failed_resource_actions_leave_the_state_alone() {
  let h = open(entity(3, None));
  let resource = h.document.resource_state();
  h.endpoint.fail_next("conflict");

  let result = resource.apply(ResourceAction::Publish).await;
  assert!(matches!(result, Err(ResourceError::Endpoint(_))));
  assert_eq!(resource.state().get(), ResourceState::Draft);
  assert!(!resource.in_progress().get());
}

#[tokio::test]
async fn deletion_survives_remote_changes() {
  let h = open(entity(3, None));
  let resource = h.document.resource_state();
  assert_eq!(resource.apply(ResourceAction::Delete).await, Ok(ResourceState::Deleted));

  h.live()
    .remote_apply(Mutation::Set { path: Path::field_locale("body", "de"), value: json!("x") })
    .unwrap();
  assert_eq!(h.document.sys().get().version, 4);
  assert_eq!(resource.state().get(), ResourceState::Deleted);
  assert!(!h.document.state().can_edit.get());
}

// ─── Presence ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn presence_rides_on_document_shouts() {
  let h = open(entity(3, None));
  let presence = h.document.presence().expect("presence tracked");

  h.live().receive_shout(
    serde_json::to_value(PresenceMessage::Focus { user: "bob".into(), path: title() })
      .unwrap(),
  );
  assert_eq!(presence.collaborators().get(), vec!["bob".to_owned()]);
  assert_eq!(presence.collaborators_for(&title()), vec!["bob".to_owned()]);

  presence.focus(&title());
  assert_eq!(
    h.live().take_shouts(),
    vec![
      serde_json::to_value(PresenceMessage::Focus { user: "alice".into(), path: title() })
        .unwrap()
    ]
  );
}

#[tokio::test]
async fn presence_can_be_turned_off() {
  let connection = Arc::new(MemoryConnection::new());
  let document = Document::new(
    DocumentConfig { track_presence: false, ..DocumentConfig::for_user("alice") },
    entity(3, None),
    schema(),
    Collaborators {
      connection: connection.clone(),
      access:     Arc::new(MemoryAccessPolicy::allow_all()),
      presence:   Arc::new(MemoryPresenceHub),
      endpoint:   Arc::new(MemoryEndpoint::new(connection, "alice")),
    },
  );
  assert!(document.presence().is_none());
}

// ─── Teardown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn destroy_with_a_write_in_flight_delivers_nothing() {
  let h = open(entity(3, None));
  let live = h.live();
  live.hold_acks(true);

  let (changes, _changes_sub) = collect(h.document.changes());
  let (local, _local_sub) = collect(h.document.local_field_changes());
  let (errors, _errors_sub) = collect(h.document.state().error.clone());
  let (statuses, _status_sub) = watch(&h.document.status());
  let (saving, _saving_sub) = watch(&h.document.state().is_saving);

  let (result, before) = tokio::join!(
    h.document.set_value_at(title(), json!("Late")),
    async {
      let before = (len(&changes), len(&local), len(&errors), len(&statuses), len(&saving));
      h.document.destroy();
      live.flush();
      live
        .remote_apply(Mutation::Set { path: title(), value: json!("Remote") })
        .unwrap();
      before
    }
  );

  assert!(result.is_ok());
  assert_eq!(
    before,
    (len(&changes), len(&local), len(&errors), len(&statuses), len(&saving))
  );
  assert_eq!(len(&local), 0);
  assert_eq!(h.document.lifecycle().get(), Lifecycle::Destroyed);
  assert_eq!(
    h.document.set_value_at(title(), json!("After")).await,
    Err(DocError::Destroyed)
  );
}

#[tokio::test]
async fn destroyed_is_the_last_lifecycle_notification() {
  let h = open(entity(3, None));
  let (seen, _sub) = watch(&h.document.lifecycle());
  h.document.destroy();
  h.document.destroy();
  assert_eq!(*seen.lock().unwrap(), vec![Lifecycle::Destroyed]);
}

#[tokio::test]
async fn destroy_is_idempotent() {
  let h = open(entity(3, None));
  h.document.destroy();
  h.document.destroy();
  assert_eq!(h.live().detach_count(), 1);

  let (changes, _sub) = collect(h.document.changes());
  h.live()
    .remote_apply(Mutation::Set { path: title(), value: json!("x") })
    .unwrap();
  assert_eq!(len(&changes), 0);
  assert_eq!(
    h.document.resource_state().apply(ResourceAction::Publish).await,
    Err(ResourceError::Destroyed)
  );
}
