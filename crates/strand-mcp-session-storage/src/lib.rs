//! # Session and Event Stores
//!
//! Pluggable persistence for the HTTP transport:
//!
//! - [`SessionStore`]: session existence, activity timestamps and an opaque
//!   metadata blob, with TTL expiry. Backed in memory, by a locked JSON
//!   file, or by SQLite for multi-process deployments.
//! - [`EventStore`]: per-stream, ordered, capped, TTL-bound log of sent
//!   messages for stream resumption. Backed in memory or by SQLite.
//!
//! Stores never run background tasks; the hosting server calls
//! `cleanup_expired` / `evict_expired` on its own schedule.

mod events;
mod traits;

pub use events::*;
pub use traits::*;

pub mod file;
pub mod in_memory;
pub mod in_memory_events;
pub mod prelude;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod sqlite_events;

pub use file::{FileSessionConfig, FileSessionStore};
pub use in_memory::{InMemorySessionConfig, InMemorySessionStore};
pub use in_memory_events::InMemoryEventStore;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteSessionStore};

#[cfg(feature = "sqlite")]
pub use sqlite_events::SqliteEventStore;

use std::sync::Arc;

/// Shared session store handle
pub type BoxedSessionStore = Arc<dyn SessionStore>;

/// Shared event store handle
pub type BoxedEventStore = Arc<dyn EventStore>;
