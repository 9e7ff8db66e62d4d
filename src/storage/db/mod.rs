//! Database backend.
//!
//! Currently supports SQLite. The store talks to the backend only through
//! [`SqliteConnector`] and plain `sqlx` queries.

mod sqlite;

pub use sqlite::{DEFAULT_CONNECT_TIMEOUT, SqliteConnector, close_quietly};
