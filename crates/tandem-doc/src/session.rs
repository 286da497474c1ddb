//! Mutable state of one document session.
//!
//! Owned by the [`Document`](crate::Document); only the document assigns the
//! live handle and the load error. Other components get read access through
//! [`SharedSession`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_core::{
  connection::{OtDocument, OtError},
  reactive::Subscription,
};

use crate::error::{DocError, Result};

pub(crate) struct Session<D> {
  /// The live handle, absent while loading, rejected or disconnected.
  pub(crate) doc:        Option<Arc<D>>,
  /// Forwards the live handle's raw events into the change event bus.
  pub(crate) doc_events: Option<Subscription>,
  pub(crate) load_error: Option<OtError>,
  pub(crate) destroyed:  bool,
}

impl<D: OtDocument> Session<D> {
  pub(crate) fn new() -> Self {
    Self { doc: None, doc_events: None, load_error: None, destroyed: false }
  }

  /// Drop the live handle and stop forwarding its events.
  pub(crate) fn detach(&mut self) -> Option<Arc<D>> {
    self.doc_events = None;
    let doc = self.doc.take();
    if let Some(doc) = &doc {
      doc.detach();
    }
    doc
  }
}

pub(crate) type SharedSession<D> = Arc<Mutex<Session<D>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live handle, or why there is none.
pub(crate) fn live_doc<D>(session: &SharedSession<D>) -> Result<Arc<D>> {
  let session = lock(session);
  if session.destroyed {
    return Err(DocError::Destroyed);
  }
  session.doc.clone().ok_or(DocError::Disconnected)
}
