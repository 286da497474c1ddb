//! Revert support: compare against, and restore, the fields the session was
//! opened with.

use std::sync::Arc;

use serde_json::{Map, Value};
use tandem_core::{Path, connection::Connection};

use crate::{error::Result, gateway::MutationGateway};

pub struct Reverter<C: Connection> {
  baseline: Arc<Value>,
  gateway:  MutationGateway<C>,
}

impl<C: Connection> Reverter<C> {
  pub(crate) fn new(baseline: Value, gateway: MutationGateway<C>) -> Self {
    Self { baseline: Arc::new(baseline), gateway }
  }

  /// The fields captured when the session was opened.
  pub fn baseline(&self) -> &Value { &self.baseline }

  /// Whether the current fields differ from the baseline.
  pub fn has_changes(&self) -> bool {
    let current = self
      .gateway
      .get_value_at(&Path::fields())
      .unwrap_or_else(|| Value::Object(Map::new()));
    current != *self.baseline
  }

  /// Write the baseline back as the whole fields map. Resolves with the
  /// resulting version; with no changes nothing is written.
  pub async fn revert(&self) -> Result<u64> {
    self
      .gateway
      .set_value_at(Path::fields(), Value::clone(&self.baseline))
      .await
  }
}
