//! Status codes derived from a document's metadata and connection.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::sys::Sys;

/// The single status a document is in. Never stored; always derived.
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
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DocumentStatus {
  EditingNotAllowed,
  OtConnectionError,
  InternalServerError,
  Archived,
  Ok,
}

/// Where an entity is in its publishing lifecycle.
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
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceState {
  /// Never published, or unpublished.
  Draft,
  /// Published, with edits made since.
  Changes,
  Published,
  Archived,
  Deleted,
}

impl ResourceState {
  pub fn of(sys: &Sys) -> Self {
    if sys.is_deleted() {
      Self::Deleted
    } else if sys.is_archived() {
      Self::Archived
    } else {
      match sys.published_version {
        Some(published) if sys.version == published + 1 => Self::Published,
        Some(_) => Self::Changes,
        None => Self::Draft,
      }
    }
  }
}
