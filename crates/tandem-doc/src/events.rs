//! The change event bus: raw events of the live document, tagged with the
//! handle that produced them, plus the path algebra built on top.

use std::{fmt, sync::Arc};

use tandem_core::{
  Path,
  connection::RawEvent,
  path::{self, find_common_prefix},
};

/// A raw event together with the live document that emitted it. Stays
/// inside the crate; consumers only ever see the [`RawEvent`].
pub(crate) struct DocEvent<D> {
  pub(crate) doc:   Arc<D>,
  pub(crate) event: RawEvent,
}

impl<D> DocEvent<D> {
  pub(crate) fn new(doc: Arc<D>, event: RawEvent) -> Self { Self { doc, event } }

  /// The event announcing a freshly attached handle: the whole document
  /// changed.
  pub(crate) fn opened(doc: Arc<D>) -> Self {
    Self::new(doc, RawEvent::Change { op_paths: vec![Path::root()], local: false })
  }

  /// The path covering everything this event changed, if it is a change.
  pub(crate) fn change_path(&self) -> Option<Path> { change_path(&self.event) }
}

impl<D> Clone for DocEvent<D> {
  fn clone(&self) -> Self {
    Self { doc: self.doc.clone(), event: self.event.clone() }
  }
}

impl<D> fmt::Debug for DocEvent<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DocEvent").field("event", &self.event).finish_non_exhaustive()
  }
}

/// The common prefix of every op path of a change; `None` for other events.
pub fn change_path(event: &RawEvent) -> Option<Path> {
  match event {
    RawEvent::Change { op_paths, .. } => Some(find_common_prefix(op_paths)),
    RawEvent::Acknowledge | RawEvent::Shout(_) => None,
  }
}

/// Whether a change at `changed` may have touched anything under `fields`
/// as a whole (the root or the fields map itself).
pub fn touches_fields_root(changed: &Path) -> bool {
  path::is_prefix(changed, &Path::fields())
}

/// A write this client made through the mutation gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFieldChange {
  pub path: Path,
}

impl LocalFieldChange {
  pub fn field_id(&self) -> Option<&str> { self.path.field_id() }

  pub fn locale_code(&self) -> Option<&str> { self.path.locale_code() }
}
