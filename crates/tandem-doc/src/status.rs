//! Pure derivations of the document's status flags.

use tandem_core::{connection::OtError, status::DocumentStatus, sys::Sys};

use crate::error::FailureKind;

/// Map the current inputs to a status. First match wins: archived,
/// permission denied, connection error (except `forbidden`, which is a
/// permission matter), internal server error, ok.
pub fn derive_status(
  sys: &Sys,
  load_error: Option<&OtError>,
  can_update: bool,
  last_failure: Option<FailureKind>,
) -> DocumentStatus {
  if sys.is_archived() {
    DocumentStatus::Archived
  } else if !can_update || last_failure == Some(FailureKind::Forbidden) {
    DocumentStatus::EditingNotAllowed
  } else if load_error.is_some_and(|err| !err.is_forbidden()) {
    DocumentStatus::OtConnectionError
  } else if last_failure == Some(FailureKind::InternalServerError) {
    DocumentStatus::InternalServerError
  } else {
    DocumentStatus::Ok
  }
}

/// Dirty unless the entity is published and nothing was saved since, i.e.
/// `version == publishedVersion + 1` (publishing itself bumps the version).
pub fn is_dirty(sys: &Sys) -> bool {
  sys
    .published_version
    .is_none_or(|published| sys.version != published + 1)
}

/// Whether the entity's state and the user's permissions allow updates.
pub fn is_editable(sys: &Sys, can_update: bool) -> bool {
  !sys.is_archived() && !sys.is_deleted() && can_update
}

/// [`is_editable`], and a live document to write into.
pub fn can_edit(sys: &Sys, can_update: bool, connected: bool) -> bool {
  is_editable(sys, can_update) && connected
}
