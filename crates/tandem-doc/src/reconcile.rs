//! Sys reconciliation: merge the raw `sys` of a live document snapshot with
//! the metadata already known for the entity.
//!
//! The OT protocol does not carry everything the UI relies on. `updatedAt`
//! is only bumped on real version changes, `updatedBy` is often missing and
//! has to be inferred, and the environment may be reported by internal id
//! instead of the alias the session was opened with.

use chrono::{DateTime, Utc};
use tandem_core::sys::Sys;

use crate::error::Diagnostic;

/// The result of reconciling one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
  /// The new metadata, if it differs from the previous one.
  pub sys:         Option<Sys>,
  pub diagnostics: Vec<Diagnostic>,
}

/// Reconciles raw snapshot metadata for one document session.
#[derive(Debug, Clone, Copy)]
pub struct SysReconciler {
  initial_version: u64,
}

impl SysReconciler {
  /// `initial_version` is the entity version the session was opened with.
  pub fn new(initial_version: u64) -> Self { Self { initial_version } }

  /// `version` and `compressed` come from the live document; the entity
  /// version is their sum.
  pub fn reconcile(
    &self,
    previous: &Sys,
    raw: Sys,
    version: u64,
    compressed: u64,
    now: DateTime<Utc>,
  ) -> Reconciliation {
    let version = version + compressed;
    let mut diagnostics = Vec::new();

    let floor = self.initial_version.max(previous.version);
    if version < floor {
      diagnostics.push(Diagnostic::VersionInconsistency {
        expected: floor,
        received: version,
      });
    }
    // Versions never go backwards.
    if version < previous.version {
      return Reconciliation { sys: None, diagnostics };
    }

    let mut next = raw;
    next.updated_at = if version > previous.version {
      Some(now)
    } else {
      previous.updated_at
    };
    next.version = version;

    if next.updated_by.is_none() {
      let published_more = next.published_counter.unwrap_or(0)
        > previous.published_counter.unwrap_or(0);
      next.updated_by = if published_more {
        next.published_by.clone()
      } else {
        previous.updated_by.clone()
      };
    }

    if previous.environment.is_some() {
      next.environment = previous.environment.clone();
    }
    // Deletion is only known locally; snapshots never carry it.
    if next.deleted_version.is_none() {
      next.deleted_version = previous.deleted_version;
    }

    let changed = next.version != previous.version || next != *previous;
    Reconciliation { sys: changed.then_some(next), diagnostics }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use tandem_core::sys::Link;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn sys(version: u64) -> Sys {
    Sys {
      id: "entry".into(),
      version,
      updated_at: Some(at(100)),
      updated_by: Some(Link::user("alice")),
      ..Sys::default()
    }
  }

  #[test]
  fn newer_version_bumps_updated_at() {
    let reconciler = SysReconciler::new(3);
    let out = reconciler.reconcile(&sys(3), sys(3), 4, 0, at(500));
    let next = out.sys.expect("changed");
    assert_eq!(next.version, 4);
    assert_eq!(next.updated_at, Some(at(500)));
    assert!(out.diagnostics.is_empty());
  }

  #[test]
  fn same_version_and_content_is_unchanged() {
    let reconciler = SysReconciler::new(3);
    let out = reconciler.reconcile(&sys(3), sys(3), 3, 0, at(500));
    assert_eq!(out.sys, None);
  }

  #[test]
  fn same_version_with_new_content_keeps_updated_at() {
    let reconciler = SysReconciler::new(3);
    let mut raw = sys(3);
    raw.updated_at = None;
    raw.published_version = Some(2);
    let out = reconciler.reconcile(&sys(3), raw, 3, 0, at(500));
    let next = out.sys.expect("content changed");
    assert_eq!(next.updated_at, Some(at(100)));
    assert_eq!(next.published_version, Some(2));
  }

  #[test]
  fn same_version_ignores_the_snapshot_updated_at() {
    let reconciler = SysReconciler::new(3);
    let mut raw = sys(3);
    raw.updated_at = Some(at(300));
    let out = reconciler.reconcile(&sys(3), raw, 3, 0, at(500));
    assert_eq!(out.sys, None, "only updatedAt differed");
  }

  #[test]
  fn deletion_survives_later_snapshots() {
    let reconciler = SysReconciler::new(3);
    let mut deleted = sys(3);
    deleted.deleted_version = Some(3);

    let next = reconciler.reconcile(&deleted, sys(3), 4, 0, at(500)).sys.unwrap();
    assert_eq!(next.deleted_version, Some(3));
    assert_eq!(reconciler.reconcile(&deleted, sys(3), 3, 0, at(500)).sys, None);
  }

  #[test]
  fn compressed_ops_count_towards_version() {
    let reconciler = SysReconciler::new(3);
    let out = reconciler.reconcile(&sys(3), sys(3), 2, 4, at(500));
    assert_eq!(out.sys.map(|s| s.version), Some(6));
  }

  #[test]
  fn older_version_is_reported_and_ignored() {
    let reconciler = SysReconciler::new(4);
    let out = reconciler.reconcile(&sys(4), sys(1), 1, 0, at(500));
    assert_eq!(out.sys, None);
    assert_eq!(out.diagnostics, vec![Diagnostic::VersionInconsistency {
      expected: 4,
      received: 1,
    }]);
  }

  #[test]
  fn missing_updated_by_follows_a_publish() {
    let reconciler = SysReconciler::new(1);
    let mut previous = sys(3);
    previous.published_counter = Some(1);

    let mut raw = sys(4);
    raw.updated_by = None;
    raw.published_counter = Some(2);
    raw.published_by = Some(Link::user("bob"));

    let next = reconciler.reconcile(&previous, raw, 4, 0, at(9)).sys.unwrap();
    assert_eq!(next.updated_by, Some(Link::user("bob")));
  }

  #[test]
  fn missing_updated_by_is_carried_over() {
    let reconciler = SysReconciler::new(1);
    let mut raw = sys(4);
    raw.updated_by = None;
    let next = reconciler.reconcile(&sys(3), raw, 4, 0, at(9)).sys.unwrap();
    assert_eq!(next.updated_by, Some(Link::user("alice")));
  }

  #[test]
  fn known_environment_wins_over_reported_one() {
    let reconciler = SysReconciler::new(1);
    let mut previous = sys(3);
    previous.environment = Some(Link::new("Environment", "master"));
    let mut raw = sys(3);
    raw.environment = Some(Link::new("Environment", "5f0e0c9b-internal"));

    let out = reconciler.reconcile(&previous, raw, 3, 0, at(9));
    assert_eq!(out.sys, None, "only the environment differed");
  }
}
