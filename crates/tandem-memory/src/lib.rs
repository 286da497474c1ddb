//! In-process backends for the Tandem sync core.
//!
//! Everything here stays in memory: OT documents, the connection that hands
//! them out, a static access policy, presence over document shouts and a
//! space endpoint. Used by the tests of the sync core and by the replay
//! tool, and handy wherever a real server is not available.

pub mod access;
pub mod connection;
pub mod doc;
pub mod endpoint;
pub mod error;
pub mod presence;

pub use access::MemoryAccessPolicy;
pub use connection::{MemoryConnection, MemoryLoader};
pub use doc::MemoryDoc;
pub use endpoint::MemoryEndpoint;
pub use error::{Error, Result};
pub use presence::{MemoryPresence, MemoryPresenceHub, PresenceMessage};
