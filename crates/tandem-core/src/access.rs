//! Access-control decisions consumed by the sync core.
//!
//! Policy evaluation itself is out of scope: the core only asks yes/no
//! questions of a [`PermissionEvaluator`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::sys::{Link, Sys};

/// An action a user may or may not perform on an entity.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  Read,
  Update,
  Publish,
  Unpublish,
  Archive,
  Unarchive,
  Delete,
}

/// The immutable identity of an entity, the only input a permission
/// evaluator is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdentity {
  pub id:              String,
  pub entity_type:     String,
  pub content_type_id: Option<String>,
  pub created_by:      Option<String>,
}

impl EntityIdentity {
  pub fn from_sys(sys: &Sys) -> Self {
    Self {
      id:              sys.id.clone(),
      entity_type:     sys.entity_type().to_owned(),
      content_type_id: sys.content_type.as_ref().map(|l| l.id().to_owned()),
      created_by:      sys.created_by.as_ref().map(Link::id).map(str::to_owned),
    }
  }
}

/// Answers permission questions for one entity.
pub trait PermissionEvaluator: Send + Sync {
  fn can(&self, action: Action) -> bool;

  fn can_edit_field_locale(&self, field_id: &str, locale_code: &str) -> bool;
}

/// Builds evaluators; consulted once per document session.
pub trait AccessPolicy: Send + Sync {
  fn permissions_for(
    &self,
    identity: &EntityIdentity,
  ) -> Arc<dyn PermissionEvaluator>;
}
