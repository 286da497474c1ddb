//! The space endpoint used for publish-lifecycle requests.

use std::future::Future;

use crate::sys::{Entity, Sys};

/// Publish-lifecycle operations of the space API. Every method that returns
/// a [`Sys`] returns the entity's metadata after the operation.
///
/// All methods return `Send` futures so the trait can be driven from
/// multi-threaded runtimes.
pub trait SpaceEndpoint: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Publish `entity` as given (fields included) at its current version.
  fn publish(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_;

  fn unpublish(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_;

  fn archive(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_;

  fn unarchive(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<Sys, Self::Error>> + Send + '_;

  /// Delete the entity. The API returns no body.
  fn delete(
    &self,
    id: String,
    version: u64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
