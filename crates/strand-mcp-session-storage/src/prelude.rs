//! Commonly used storage types.

pub use crate::events::{EventId, EventStore, EventStoreConfig, EventStoreError, StoredEvent};
pub use crate::traits::{SessionRecord, SessionStorageError, SessionStore};
pub use crate::{BoxedEventStore, BoxedSessionStore};
pub use crate::{FileSessionStore, InMemoryEventStore, InMemorySessionStore};

#[cfg(feature = "sqlite")]
pub use crate::{SqliteConfig, SqliteEventStore, SqliteSessionStore};
