//! Core types and trait definitions for the Tandem document sync core.
//!
//! This crate is deliberately free of runtime and transport dependencies.
//! The sync core and every collaborator backend depend on it.

// We intentionally use native `async fn`/`impl Future` in traits.
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod path;
pub mod presence;
pub mod reactive;
pub mod status;
pub mod sys;
pub mod tree;

pub use error::{Error, Result};
pub use path::{Path, Segment};
