//! A static [`AccessPolicy`]: everything is allowed unless denied.

use std::{collections::HashSet, sync::Arc};

use tandem_core::access::{AccessPolicy, Action, EntityIdentity, PermissionEvaluator};

#[derive(Debug, Clone, Default)]
pub struct MemoryAccessPolicy {
  denied: HashSet<Action>,
  locked: HashSet<(String, String)>,
}

impl MemoryAccessPolicy {
  pub fn allow_all() -> Self { Self::default() }

  pub fn deny(mut self, action: Action) -> Self {
    self.denied.insert(action);
    self
  }

  /// Forbid editing one field in one locale.
  pub fn lock_field_locale(
    mut self,
    field_id: impl Into<String>,
    locale_code: impl Into<String>,
  ) -> Self {
    self.locked.insert((field_id.into(), locale_code.into()));
    self
  }
}

impl AccessPolicy for MemoryAccessPolicy {
  fn permissions_for(&self, _identity: &EntityIdentity) -> Arc<dyn PermissionEvaluator> {
    Arc::new(self.clone())
  }
}

impl PermissionEvaluator for MemoryAccessPolicy {
  fn can(&self, action: Action) -> bool { !self.denied.contains(&action) }

  fn can_edit_field_locale(&self, field_id: &str, locale_code: &str) -> bool {
    self.can(Action::Update)
      && !self
        .locked
        .contains(&(field_id.to_owned(), locale_code.to_owned()))
  }
}
