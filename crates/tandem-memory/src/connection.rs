//! [`MemoryConnection`], a [`Connection`] over [`MemoryDoc`]s.
//!
//! By default every requested document opens immediately, seeded from the
//! entity it was requested for. Tests steer loading per entity id:
//! preload a document, reject the open, or drop and restore the handle.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use tandem_core::{
  connection::{Connection, DocLoadState, Loader, OtError},
  reactive::{Property, Signal},
  sys::Entity,
};
use tracing::debug;

use crate::{
  doc::{MemoryDoc, lock},
  error::Error,
};

// ─── Loader ──────────────────────────────────────────────────────────────────

pub struct MemoryLoader {
  state:       Signal<DocLoadState<MemoryDoc>>,
  is_editable: Property<bool>,
}

impl MemoryLoader {
  /// Whether the document was last requested for writing.
  pub fn is_editable(&self) -> bool { self.is_editable.get() }
}

impl Loader for MemoryLoader {
  type Doc = MemoryDoc;

  fn state(&self) -> Property<DocLoadState<MemoryDoc>> { self.state.property() }

  fn close(&self) { self.state.set(DocLoadState::None); }
}

// ─── Connection ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
  docs:     HashMap<String, Arc<MemoryDoc>>,
  loaders:  HashMap<String, Signal<DocLoadState<MemoryDoc>>>,
  rejected: HashMap<String, OtError>,
  manual:   bool,
}

#[derive(Default)]
pub struct MemoryConnection {
  registry:    Mutex<Registry>,
  fail_reauth: AtomicBool,
  refreshes:   AtomicUsize,
}

impl MemoryConnection {
  pub fn new() -> Self { Self::default() }

  /// Requested documents stay pending until [`open`](Self::open).
  pub fn manual() -> Self {
    let connection = Self::default();
    lock(&connection.registry).manual = true;
    connection
  }

  /// Serve `doc` for entity `id` instead of seeding one from the entity.
  pub fn preload(&self, id: impl Into<String>, doc: Arc<MemoryDoc>) {
    lock(&self.registry).docs.insert(id.into(), doc);
  }

  /// Refuse to open entity `id`.
  pub fn reject(&self, id: impl Into<String>, error: OtError) {
    let id = id.into();
    let loader = {
      let mut registry = lock(&self.registry);
      registry.rejected.insert(id.clone(), error.clone());
      registry.loaders.get(&id).cloned()
    };
    if let Some(loader) = loader {
      loader.set(DocLoadState::Error(error));
    }
  }

  /// The live document of entity `id`, if one was created.
  pub fn doc(&self, id: &str) -> Option<Arc<MemoryDoc>> {
    lock(&self.registry).docs.get(id).cloned()
  }

  /// Deliver the document of entity `id` to its loader.
  pub fn open(&self, id: &str) -> bool {
    let (loader, doc) = {
      let registry = lock(&self.registry);
      (registry.loaders.get(id).cloned(), registry.docs.get(id).cloned())
    };
    match (loader, doc) {
      (Some(loader), Some(doc)) => {
        debug!(id, "document opened");
        loader.set(DocLoadState::Doc(doc));
        true
      }
      _ => false,
    }
  }

  /// Drop the handle of entity `id`, as a lost connection would.
  pub fn disconnect(&self, id: &str) {
    let loader = lock(&self.registry).loaders.get(id).cloned();
    if let Some(loader) = loader {
      debug!(id, "document disconnected");
      loader.set(DocLoadState::None);
    }
  }

  /// Make every credential refresh fail (or succeed again).
  pub fn fail_reauth(&self, fail: bool) {
    self.fail_reauth.store(fail, Ordering::Release);
  }

  /// How many times credentials were refreshed.
  pub fn refresh_count(&self) -> usize { self.refreshes.load(Ordering::Acquire) }
}

impl Connection for MemoryConnection {
  type Doc = MemoryDoc;
  type Loader = MemoryLoader;
  type Error = Error;

  fn get_doc_loader(
    &self,
    entity: &Entity,
    is_editable: Property<bool>,
  ) -> MemoryLoader {
    let id = entity.sys.id.clone();
    let mut registry = lock(&self.registry);

    let initial = if let Some(error) = registry.rejected.get(&id) {
      DocLoadState::Error(error.clone())
    } else {
      let doc = match registry.docs.get(&id) {
        Some(doc) => Ok(doc.clone()),
        None => MemoryDoc::from_entity(entity).map(Arc::new),
      };
      match doc {
        Ok(doc) => {
          registry.docs.insert(id.clone(), doc.clone());
          if registry.manual {
            DocLoadState::Pending
          } else {
            DocLoadState::Doc(doc)
          }
        }
        Err(err) => DocLoadState::Error(OtError::Other(err.to_string())),
      }
    };

    let state = Signal::new(initial);
    registry.loaders.insert(id, state.clone());
    MemoryLoader { state, is_editable }
  }

  fn refresh_auth(&self) -> impl Future<Output = Result<(), Error>> + Send + '_ {
    async move {
      self.refreshes.fetch_add(1, Ordering::AcqRel);
      if self.fail_reauth.load(Ordering::Acquire) {
        Err(Error::ReauthFailed)
      } else {
        Ok(())
      }
    }
  }
}
