//! Collaborator presence, consumed through a narrow interface.
//!
//! The broadcast mechanism belongs to the presence implementation; the sync
//! core only feeds it received shouts and a function to send one.

use std::sync::Arc;

use serde_json::Value;

use crate::{
  Path,
  reactive::{Property, Stream},
};

/// Sends a broadcast message through the current live document. Messages
/// sent while disconnected are dropped.
pub type ShoutFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Presence state of one user in one document.
pub trait Presence: Send + Sync {
  /// Ids of the other users currently in the document.
  fn collaborators(&self) -> Property<Vec<String>>;

  /// Ids of the other users focused on `path` or anything below it.
  fn collaborators_for(&self, path: &Path) -> Vec<String>;

  /// Announce that this user focuses `path`.
  fn focus(&self, path: &Path);

  /// Announce that this user left the document.
  fn leave(&self);

  /// Leave and release every resource; no further effect afterwards.
  fn destroy(&self);
}

/// Creates presence sessions.
pub trait PresenceHub: Send + Sync {
  fn create(
    &self,
    user_id: &str,
    shouts: Stream<Value>,
    shout: ShoutFn,
  ) -> Box<dyn Presence>;
}
