//! Presence over document shouts.
//!
//! Every client broadcasts a [`PresenceMessage`] when it joins, moves its
//! focus or leaves; each session folds the messages of the other users into
//! a map of who is focused where.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::{
  Path,
  path::is_prefix,
  presence::{Presence, PresenceHub, ShoutFn},
  reactive::{Property, Signal, Stream, Subscription},
};
use tracing::{debug, trace};

use crate::doc::lock;

/// The wire form of a presence broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceMessage {
  Join { user: String },
  Focus { user: String, path: Path },
  Leave { user: String },
}

impl PresenceMessage {
  fn user(&self) -> &str {
    match self {
      Self::Join { user } | Self::Focus { user, .. } | Self::Leave { user } => user,
    }
  }
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryPresenceHub;

impl PresenceHub for MemoryPresenceHub {
  fn create(
    &self,
    user_id: &str,
    shouts: Stream<Value>,
    shout: ShoutFn,
  ) -> Box<dyn Presence> {
    Box::new(MemoryPresence::join(user_id, shouts, shout))
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

struct Roster {
  user_id:       String,
  /// Other users and where they are focused, if anywhere.
  focus:         Mutex<BTreeMap<String, Option<Path>>>,
  collaborators: Signal<Vec<String>>,
}

impl Roster {
  fn receive(&self, message: &Value) {
    let message: PresenceMessage = match serde_json::from_value(message.clone()) {
      Ok(message) => message,
      Err(err) => {
        trace!(error = %err, "ignoring shout that is not a presence message");
        return;
      }
    };
    if message.user() == self.user_id {
      return;
    }

    let users: Vec<String> = {
      let mut focus = lock(&self.focus);
      match message {
        PresenceMessage::Join { user } => {
          focus.entry(user).or_insert(None);
        }
        PresenceMessage::Focus { user, path } => {
          focus.insert(user, Some(path));
        }
        PresenceMessage::Leave { user } => {
          focus.remove(&user);
        }
      }
      focus.keys().cloned().collect()
    };
    self.collaborators.set(users);
  }
}

pub struct MemoryPresence {
  roster:    Arc<Roster>,
  shout:     ShoutFn,
  listening: Mutex<Option<Subscription>>,
  destroyed: AtomicBool,
}

impl MemoryPresence {
  /// Start listening to `shouts` and announce `user_id`.
  pub fn join(user_id: &str, shouts: Stream<Value>, shout: ShoutFn) -> Self {
    let roster = Arc::new(Roster {
      user_id:       user_id.to_owned(),
      focus:         Mutex::default(),
      collaborators: Signal::new(Vec::new()),
    });
    let receiver = roster.clone();
    let listening = shouts.subscribe(move |message| receiver.receive(message));

    let presence = Self {
      roster,
      shout,
      listening: Mutex::new(Some(listening)),
      destroyed: AtomicBool::new(false),
    };
    presence.send(PresenceMessage::Join { user: user_id.to_owned() });
    presence
  }

  fn send(&self, message: PresenceMessage) {
    match serde_json::to_value(&message) {
      Ok(value) => (self.shout)(value),
      Err(err) => debug!(error = %err, "presence message not sent"),
    }
  }

  fn is_destroyed(&self) -> bool { self.destroyed.load(Ordering::Acquire) }
}

impl Presence for MemoryPresence {
  fn collaborators(&self) -> Property<Vec<String>> {
    self.roster.collaborators.property()
  }

  fn collaborators_for(&self, path: &Path) -> Vec<String> {
    lock(&self.roster.focus)
      .iter()
      .filter(|(_, focus)| focus.as_ref().is_some_and(|focus| is_prefix(path, focus)))
      .map(|(user, _)| user.clone())
      .collect()
  }

  fn focus(&self, path: &Path) {
    if self.is_destroyed() {
      return;
    }
    self.send(PresenceMessage::Focus {
      user: self.roster.user_id.clone(),
      path: path.clone(),
    });
  }

  fn leave(&self) {
    if self.is_destroyed() {
      return;
    }
    self.send(PresenceMessage::Leave { user: self.roster.user_id.clone() });
  }

  fn destroy(&self) {
    if self.is_destroyed() {
      return;
    }
    self.leave();
    self.destroyed.store(true, Ordering::Release);
    lock(&self.listening).take();
    self.roster.collaborators.end();
  }
}
