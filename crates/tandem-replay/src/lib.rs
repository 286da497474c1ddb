//! Scenario replay for the Tandem sync core.
//!
//! A scenario is a JSON file describing an entity, its schema, the editing
//! user's permissions and a list of steps: local writes, remote activity,
//! lifecycle actions and injected faults. [`run`] replays the steps against a
//! [`Document`] backed by the in-memory collaborators and reports the
//! document's state after every step.

pub mod error;

pub use error::{Error, Result};

use std::{
  path::Path as FsPath,
  sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{IntoEnumIterator, IntoStaticStr};
use tandem_core::{
  Path,
  access::Action,
  connection::{Mutation, OtError},
  reactive::Subscription,
  status::{DocumentStatus, ResourceState},
  sys::Entity,
};
use tandem_doc::{
  Collaborators, Document, DocumentConfig, ResourceAction, Schema,
};
use tandem_memory::{
  MemoryAccessPolicy, MemoryConnection, MemoryDoc, MemoryEndpoint,
  MemoryPresenceHub,
};
use tracing::{info, warn};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Settings of the replay binary, read from TOML and `TANDEM_` variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayConfig {
  #[serde(default)]
  pub document: DocumentConfig,
  /// Pretty-print the reports.
  #[serde(default)]
  pub pretty:   bool,
}

// ─── Scenario ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
  pub entity:      Entity,
  pub field_ids:   Vec<String>,
  pub locales:     Vec<String>,
  /// Actions the user may perform; everything when absent.
  #[serde(default)]
  pub permissions: Option<Vec<Action>>,
  pub steps:       Vec<Step>,
}

impl Scenario {
  pub fn from_path(path: &FsPath) -> Result<Self> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
  }

  fn access_policy(&self) -> MemoryAccessPolicy {
    let policy = MemoryAccessPolicy::allow_all();
    match &self.permissions {
      None => policy,
      Some(allowed) => Action::iter()
        .filter(|action| !allowed.contains(action))
        .fold(policy, MemoryAccessPolicy::deny),
    }
  }
}

fn default_true() -> bool { true }

/// One step of a scenario.
#[derive(Debug, Clone, Deserialize, IntoStaticStr)]
#[serde(tag = "step", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
  Set { path: Path, value: Value },
  Remove { path: Path },
  Insert { path: Path, index: usize, value: Value },
  Push { path: Path, value: Value },
  /// An operation from another client.
  RemoteSet { path: Path, value: Value },
  /// The server replaces `sys`.
  RemoteSys { sys: Value },
  Publish,
  Unpublish,
  Archive,
  Unarchive,
  Delete,
  Revert,
  Disconnect,
  Reconnect,
  /// The next write fails with `code` (`forbidden`,
  /// `internal_server_error`, `disconnected`, or anything else).
  FailNext { code: String },
  /// Credential refreshes fail from now on (or succeed again).
  FailReauth {
    #[serde(default = "default_true")]
    fail: bool,
  },
}

impl Step {
  fn resource_action(&self) -> Option<ResourceAction> {
    match self {
      Self::Publish => Some(ResourceAction::Publish),
      Self::Unpublish => Some(ResourceAction::Unpublish),
      Self::Archive => Some(ResourceAction::Archive),
      Self::Unarchive => Some(ResourceAction::Unarchive),
      Self::Delete => Some(ResourceAction::Delete),
      _ => None,
    }
  }
}

fn ot_error(code: &str) -> OtError {
  match code {
    "forbidden" => OtError::Forbidden,
    "internal_server_error" => OtError::InternalServerError,
    "disconnected" => OtError::Disconnected,
    other => OtError::Other(other.to_owned()),
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// The document's state after one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
  pub step:        usize,
  pub name:        &'static str,
  /// Why the step failed, if it did.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure:     Option<String>,
  pub status:      DocumentStatus,
  pub version:     u64,
  pub state:       ResourceState,
  pub dirty:       bool,
  pub can_edit:    bool,
  pub connected:   bool,
  /// Everything published on the error feed so far.
  pub errors:      Vec<String>,
  pub diagnostics: Vec<String>,
}

// ─── Replay ──────────────────────────────────────────────────────────────────

pub struct Replay {
  id:             String,
  connection:     Arc<MemoryConnection>,
  document:       Document<MemoryConnection, MemoryEndpoint>,
  errors:         Arc<Mutex<Vec<String>>>,
  diagnostics:    Arc<Mutex<Vec<String>>>,
  _subscriptions: [Subscription; 2],
}

fn record<T: ToString + 'static>(
  sink: &Arc<Mutex<Vec<String>>>,
) -> impl Fn(&T) + Send + Sync + 'static {
  let sink = sink.clone();
  move |item: &T| {
    sink
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .push(item.to_string());
  }
}

fn snapshot(sink: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
  sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
}

impl Replay {
  /// Open a document for the scenario's entity.
  pub fn open(config: &DocumentConfig, scenario: &Scenario) -> Self {
    let id = scenario.entity.sys.id.clone();
    let connection = Arc::new(MemoryConnection::new());
    let endpoint = Arc::new(MemoryEndpoint::new(connection.clone(), &config.user_id));
    let document = Document::new(
      config.clone(),
      scenario.entity.clone(),
      Schema::new(scenario.field_ids.iter().cloned(), scenario.locales.iter().cloned()),
      Collaborators {
        connection: connection.clone(),
        access:     Arc::new(scenario.access_policy()),
        presence:   Arc::new(MemoryPresenceHub),
        endpoint,
      },
    );

    let errors = Arc::default();
    let diagnostics = Arc::default();
    let subscriptions = [
      document.state().error.subscribe(record(&errors)),
      document.diagnostics().subscribe(record(&diagnostics)),
    ];
    Self {
      id,
      connection,
      document,
      errors,
      diagnostics,
      _subscriptions: subscriptions,
    }
  }

  pub fn document(&self) -> &Document<MemoryConnection, MemoryEndpoint> {
    &self.document
  }

  fn live(&self) -> Result<Arc<MemoryDoc>> {
    self.connection.doc(&self.id).ok_or(Error::NoLiveDocument)
  }

  /// Run one step and report the resulting state.
  pub async fn step(&self, index: usize, step: &Step) -> Report {
    let name: &'static str = step.into();
    info!(step = index, name, "replaying");
    let failure = match self.execute(step).await {
      Ok(()) => None,
      Err(err) => {
        warn!(step = index, name, error = %err, "step failed");
        Some(err.to_string())
      }
    };
    self.report(index, name, failure)
  }

  async fn execute(&self, step: &Step) -> Result<()> {
    let document = &self.document;
    if let Some(action) = step.resource_action() {
      document.resource_state().apply(action).await?;
      return Ok(());
    }

    match step {
      Step::Set { path, value } => {
        document.set_value_at(path.clone(), value.clone()).await?;
      }
      Step::Remove { path } => {
        document.remove_value_at(path.clone()).await?;
      }
      Step::Insert { path, index, value } => {
        document.insert_value_at(path.clone(), *index, value.clone()).await?;
      }
      Step::Push { path, value } => {
        document.push_value_at(path.clone(), value.clone()).await?;
      }
      Step::RemoteSet { path, value } => {
        self
          .live()?
          .remote_apply(Mutation::Set { path: path.clone(), value: value.clone() })?;
      }
      Step::RemoteSys { sys } => self.live()?.remote_sys(sys.clone())?,
      Step::Revert => {
        document.reverter().revert().await?;
      }
      Step::Disconnect => self.connection.disconnect(&self.id),
      Step::Reconnect => {
        if !self.connection.open(&self.id) {
          return Err(Error::NoLiveDocument);
        }
      }
      Step::FailNext { code } => self.live()?.fail_next(ot_error(code)),
      Step::FailReauth { fail } => self.connection.fail_reauth(*fail),
      Step::Publish
      | Step::Unpublish
      | Step::Archive
      | Step::Unarchive
      | Step::Delete => {}
    }
    Ok(())
  }

  fn report(&self, step: usize, name: &'static str, failure: Option<String>) -> Report {
    let state = self.document.state();
    Report {
      step,
      name,
      failure,
      status: self.document.status().get(),
      version: self.document.sys().get().version,
      state: self.document.resource_state().state().get(),
      dirty: state.is_dirty.get(),
      can_edit: state.can_edit.get(),
      connected: state.is_connected.get(),
      errors: snapshot(&self.errors),
      diagnostics: snapshot(&self.diagnostics),
    }
  }
}

/// Replay every step of `scenario`, returning one report per step.
pub async fn run(config: &DocumentConfig, scenario: &Scenario) -> Vec<Report> {
  let replay = Replay::open(config, scenario);
  let mut reports = Vec::with_capacity(scenario.steps.len());
  for (index, step) in scenario.steps.iter().enumerate() {
    reports.push(replay.step(index, step).await);
  }
  replay.document().destroy();
  reports
}
