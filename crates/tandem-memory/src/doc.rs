//! [`MemoryDoc`], an OT document that lives entirely in process.
//!
//! Local submissions are applied to the snapshot immediately and, unless
//! acknowledgments are held, acknowledged right away. Every acknowledged
//! operation bumps the version by one. The `remote_*` hooks stand in for
//! operations arriving from other clients.

use std::{
  collections::VecDeque,
  future::Future,
  sync::{Mutex, MutexGuard, PoisonError},
};

use serde_json::Value;
use tandem_core::{
  Path,
  connection::{Mutation, OtDocument, OtError, RawEvent},
  reactive::{EventBus, Stream},
  sys::Entity,
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Ack = oneshot::Sender<Result<(), OtError>>;

struct State {
  snapshot:   Value,
  version:    u64,
  compressed: u64,
  /// Submitted, applied, not yet acknowledged.
  pending:    Vec<Ack>,
  /// Errors returned by the next submissions, in order.
  failures:   VecDeque<OtError>,
  hold_acks:  bool,
  /// Messages this client broadcast.
  outbox:     Vec<Value>,
  detached:   usize,
}

pub struct MemoryDoc {
  state:  Mutex<State>,
  events: EventBus<RawEvent>,
}

impl MemoryDoc {
  pub fn new(snapshot: Value, version: u64) -> Self {
    Self {
      state:  Mutex::new(State {
        snapshot,
        version,
        compressed: 0,
        pending: Vec::new(),
        failures: VecDeque::new(),
        hold_acks: false,
        outbox: Vec::new(),
        detached: 0,
      }),
      events: EventBus::new(),
    }
  }

  /// A document seeded with `entity`, at the entity's version.
  pub fn from_entity(entity: &Entity) -> Result<Self> {
    Ok(Self::new(entity.to_snapshot()?, entity.sys.version))
  }

  // ── Fault injection ───────────────────────────────────────────────────────

  /// The next submission is rejected with `error` and not applied.
  pub fn fail_next(&self, error: OtError) {
    lock(&self.state).failures.push_back(error);
  }

  /// While held, submissions stay pending until [`flush`](Self::flush).
  pub fn hold_acks(&self, hold: bool) {
    lock(&self.state).hold_acks = hold;
  }

  /// Acknowledge every pending submission. Returns how many there were.
  pub fn flush(&self) -> usize {
    let acked = {
      let mut state = lock(&self.state);
      let acked = std::mem::take(&mut state.pending);
      state.version += acked.len() as u64;
      acked
    };
    if acked.is_empty() {
      return 0;
    }

    self.events.emit(RawEvent::Acknowledge);
    let count = acked.len();
    for ack in acked {
      let _ = ack.send(Ok(()));
    }
    count
  }

  /// Simulate server-side compression folding `count` operations away.
  pub fn set_compressed(&self, count: u64) {
    lock(&self.state).compressed = count;
  }

  // ── Remote activity ───────────────────────────────────────────────────────

  /// Apply an operation from another client.
  pub fn remote_apply(&self, mutation: Mutation) -> Result<()> {
    {
      let mut state = lock(&self.state);
      mutation.apply(&mut state.snapshot)?;
      state.version += 1;
    }
    debug!(path = %mutation.path(), "remote operation applied");
    self.events.emit(RawEvent::Change {
      op_paths: vec![mutation.path().clone()],
      local:    false,
    });
    Ok(())
  }

  /// Replace the snapshot's `sys` as the server would after a lifecycle
  /// request. Counts as one remote operation.
  pub fn remote_sys(&self, sys: Value) -> Result<()> {
    self.remote_apply(Mutation::Set { path: Path::from(["sys"]), value: sys })
  }

  /// Deliver a broadcast message from another client.
  pub fn receive_shout(&self, message: Value) {
    self.events.emit(RawEvent::Shout(message));
  }

  /// How many times a client released this handle.
  pub fn detach_count(&self) -> usize { lock(&self.state).detached }

  /// Messages broadcast by this client since the last call.
  pub fn take_shouts(&self) -> Vec<Value> {
    std::mem::take(&mut lock(&self.state).outbox)
  }
}

impl OtDocument for MemoryDoc {
  fn snapshot(&self) -> Value { lock(&self.state).snapshot.clone() }

  fn version(&self) -> u64 { lock(&self.state).version }

  fn compressed(&self) -> u64 { lock(&self.state).compressed }

  fn has_pending_ops(&self) -> bool { !lock(&self.state).pending.is_empty() }

  fn events(&self) -> Stream<RawEvent> { self.events.stream() }

  fn submit(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<(), OtError>> + Send + 'static {
    let (ack, acked) = oneshot::channel();

    let applied = {
      let mut state = lock(&self.state);
      if let Some(error) = state.failures.pop_front() {
        let _ = ack.send(Err(error));
        None
      } else if let Err(err) = mutation.apply(&mut state.snapshot) {
        let _ = ack.send(Err(OtError::Other(err.to_string())));
        None
      } else {
        state.pending.push(ack);
        Some(state.hold_acks)
      }
    };

    if let Some(held) = applied {
      self.events.emit(RawEvent::Change {
        op_paths: vec![mutation.path().clone()],
        local:    true,
      });
      if !held {
        self.flush();
      }
    }

    async move { acked.await.unwrap_or(Err(OtError::Disconnected)) }
  }

  fn shout(&self, message: Value) { lock(&self.state).outbox.push(message); }

  fn detach(&self) { lock(&self.state).detached += 1; }
}
