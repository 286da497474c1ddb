//! The document synchronization core.
//!
//! A [`Document`] binds one entity to a live OT document obtained from a
//! [`Connection`](tandem_core::connection::Connection). It exposes the
//! entity's values and status as reactive properties, funnels local writes
//! through the [`MutationGateway`](gateway::MutationGateway), keeps `sys`
//! consistent with the OT version, strips keys unknown to the content type,
//! and drives the publish lifecycle through the
//! [`SpaceEndpoint`](tandem_core::endpoint::SpaceEndpoint).

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod gateway;
pub mod normalize;
pub mod reconcile;
pub mod resource_state;
pub mod reverter;
mod session;
pub mod status;

pub use config::DocumentConfig;
pub use document::{Collaborators, Document, DocumentState, Lifecycle};
pub use error::{Diagnostic, DocError, FailureKind, ResourceError, Result};
pub use events::LocalFieldChange;
pub use normalize::Schema;
pub use resource_state::{ResourceAction, StateChange};

#[cfg(test)]
mod tests;
