//! Token storage: durable SQLite rows plus short-lived keyed entries.

pub mod db;
pub mod refresh;
pub mod transient;

pub use db::{ConnectionInfo, TokenRow, TokenStore, TokenUpsert};
pub use refresh::{needs_refresh, needs_refresh_at};
pub use transient::{spawn_sweeper, KeyValueStore, MemoryStore, SqliteKvStore};
