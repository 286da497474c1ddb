//! Synchronous reactive primitives.
//!
//! A [`Stream`] carries ephemeral events; a [`Property`] always has a current
//! value and notifies only when that value changes. The writable halves are
//! [`EventBus`] and [`Signal`]; consumers only ever receive the read-only
//! halves.
//!
//! Delivery is synchronous and ordered: every value reaches every live
//! subscriber before the next value is delivered. A value emitted while a
//! delivery is in progress (for example from inside a subscriber) is queued
//! and delivered once the current value has been seen by everyone.
//!
//! Dropping a [`Subscription`] unsubscribes. No callback runs after its
//! subscription is dropped or after the source has been ended, even if a
//! delivery is in flight at that moment.

use std::{
  collections::VecDeque,
  fmt,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicBool, Ordering},
  },
};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

struct Slot<T> {
  id:       u64,
  live:     Arc<AtomicBool>,
  callback: Callback<T>,
}

/// Subscriber registry plus the delivery queue shared by both primitives.
struct Hub<T> {
  slots:      Vec<Slot<T>>,
  queue:      VecDeque<T>,
  next_id:    u64,
  delivering: bool,
  ended:      bool,
}

impl<T> Default for Hub<T> {
  fn default() -> Self {
    Self {
      slots:      Vec::new(),
      queue:      VecDeque::new(),
      next_id:    0,
      delivering: false,
      ended:      false,
    }
  }
}

type SharedHub<T> = Arc<Mutex<Hub<T>>>;

fn attach<T: Send + 'static>(hub: &SharedHub<T>, callback: Callback<T>) -> Subscription {
  let live = Arc::new(AtomicBool::new(false));
  let id = {
    let mut guard = lock(hub);
    if guard.ended {
      return Subscription::inert();
    }
    let id = guard.next_id;
    guard.next_id += 1;
    live.store(true, Ordering::Release);
    guard.slots.push(Slot { id, live: live.clone(), callback });
    id
  };

  let weak: Weak<Mutex<Hub<T>>> = Arc::downgrade(hub);
  Subscription {
    live,
    detach: Some(Box::new(move || {
      if let Some(hub) = weak.upgrade() {
        lock(&hub).slots.retain(|slot| slot.id != id);
      }
    })),
  }
}

/// Resets the hub if a subscriber panics mid-delivery, so later emissions are
/// not stuck behind a `delivering` flag nobody will clear.
struct DeliveryGuard<'a, T>(&'a Mutex<Hub<T>>);

impl<T> Drop for DeliveryGuard<'_, T> {
  fn drop(&mut self) {
    if std::thread::panicking() {
      let mut hub = lock(self.0);
      hub.delivering = false;
      hub.queue.clear();
    }
  }
}

fn deliver<T>(hub: &Mutex<Hub<T>>, value: T) {
  {
    let mut guard = lock(hub);
    if guard.ended {
      return;
    }
    guard.queue.push_back(value);
    if guard.delivering {
      return;
    }
    guard.delivering = true;
  }

  let _guard = DeliveryGuard(hub);
  loop {
    let (value, targets) = {
      let mut guard = lock(hub);
      let Some(value) = guard.queue.pop_front() else {
        guard.delivering = false;
        return;
      };
      let targets: Vec<(Arc<AtomicBool>, Callback<T>)> = guard
        .slots
        .iter()
        .map(|slot| (slot.live.clone(), slot.callback.clone()))
        .collect();
      (value, targets)
    };

    for (live, callback) in targets {
      if live.load(Ordering::Acquire) {
        callback(&value);
      }
    }
  }
}

fn end<T>(hub: &Mutex<Hub<T>>) {
  let slots = {
    let mut guard = lock(hub);
    guard.ended = true;
    guard.queue.clear();
    std::mem::take(&mut guard.slots)
  };
  for slot in slots {
    slot.live.store(false, Ordering::Release);
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// Handle to a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
  live:   Arc<AtomicBool>,
  detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  /// A subscription that was never attached (the source had already ended).
  fn inert() -> Self {
    Self { live: Arc::new(AtomicBool::new(false)), detach: None }
  }

  /// Whether the callback can still be invoked.
  pub fn is_active(&self) -> bool { self.live.load(Ordering::Acquire) }

  /// Explicit form of dropping the handle.
  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.live.store(false, Ordering::Release);
    if let Some(detach) = self.detach.take() {
      detach();
    }
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.is_active())
      .finish()
  }
}

// ─── Streams ─────────────────────────────────────────────────────────────────

/// The writable side of an event stream.
pub struct EventBus<T> {
  hub: SharedHub<T>,
}

/// A read-only view of an [`EventBus`].
pub struct Stream<T> {
  hub: SharedHub<T>,
}

impl<T: Send + 'static> EventBus<T> {
  pub fn new() -> Self { Self { hub: Arc::default() } }

  /// Deliver `event` to every current subscriber. Dropped after [`end`].
  ///
  /// [`end`]: Self::end
  pub fn emit(&self, event: T) { deliver(&self.hub, event); }

  pub fn stream(&self) -> Stream<T> { Stream { hub: self.hub.clone() } }

  /// Stop the bus: pending events are discarded, subscribers are released
  /// and further emissions are ignored.
  pub fn end(&self) { end(&self.hub); }

  pub fn is_ended(&self) -> bool { lock(&self.hub).ended }
}

impl<T: Send + 'static> Default for EventBus<T> {
  fn default() -> Self { Self::new() }
}

impl<T> Clone for EventBus<T> {
  fn clone(&self) -> Self { Self { hub: self.hub.clone() } }
}

impl<T: Send + 'static> Stream<T> {
  /// Register `callback` for every future event.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    attach(&self.hub, Arc::new(callback))
  }

  pub fn is_ended(&self) -> bool { lock(&self.hub).ended }
}

impl<T> Clone for Stream<T> {
  fn clone(&self) -> Self { Self { hub: self.hub.clone() } }
}

impl<T> fmt::Debug for Stream<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stream").finish_non_exhaustive()
  }
}

// ─── Properties ──────────────────────────────────────────────────────────────

struct Cell<T> {
  value: Mutex<T>,
  hub:   SharedHub<T>,
}

/// The writable side of a property.
pub struct Signal<T> {
  cell: Arc<Cell<T>>,
}

/// A read-only value that notifies subscribers when it changes.
pub struct Property<T> {
  cell: Arc<Cell<T>>,
}

impl<T> Signal<T>
where
  T: Clone + PartialEq + Send + 'static,
{
  pub fn new(initial: T) -> Self {
    Self {
      cell: Arc::new(Cell { value: Mutex::new(initial), hub: Arc::default() }),
    }
  }

  pub fn get(&self) -> T { lock(&self.cell.value).clone() }

  /// Replace the value and notify subscribers. Values equal to the current
  /// one are skipped. After [`end`](Self::end) the value is still stored but
  /// nobody is notified. Returns whether the value changed.
  pub fn set(&self, value: T) -> bool {
    {
      let mut current = lock(&self.cell.value);
      if *current == value {
        return false;
      }
      *current = value.clone();
    }
    deliver(&self.cell.hub, value);
    true
  }

  pub fn property(&self) -> Property<T> { Property { cell: self.cell.clone() } }

  /// Release every subscriber; later changes are not delivered.
  pub fn end(&self) { end(&self.cell.hub); }

  pub fn is_ended(&self) -> bool { lock(&self.cell.hub).ended }
}

impl<T> Clone for Signal<T> {
  fn clone(&self) -> Self { Self { cell: self.cell.clone() } }
}

impl<T> Property<T>
where
  T: Clone + PartialEq + Send + 'static,
{
  /// A property that never changes.
  pub fn constant(value: T) -> Self { Signal::new(value).property() }

  pub fn get(&self) -> T { lock(&self.cell.value).clone() }

  /// Register `callback`, invoking it immediately with the current value and
  /// then on every change.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    let callback: Callback<T> = Arc::new(callback);
    let subscription = attach(&self.cell.hub, callback.clone());
    if subscription.is_active() {
      callback(&self.get());
    }
    subscription
  }

  /// Register `callback` for future changes only.
  pub fn on_change<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    attach(&self.cell.hub, Arc::new(callback))
  }

  pub fn is_ended(&self) -> bool { lock(&self.cell.hub).ended }
}

impl<T> Clone for Property<T> {
  fn clone(&self) -> Self { Self { cell: self.cell.clone() } }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Property")
      .field(&*lock(&self.cell.value))
      .finish()
  }
}
