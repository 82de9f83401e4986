//! Lazy database connections with reentrant connection and transaction scopes.
//!
//! An [`Engine`] produces raw connections through a driver's [`Connector`].
//! Each caller owns an [`ExecutionContext`], which opens a connection only
//! when a statement first needs one. [`ConnectionScope`] and
//! [`TransactionScope`] guards nest freely on a context: the outermost
//! connection scope releases the connection and the outermost transaction
//! scope alone commits or rolls back.

pub mod config;
pub mod connection;
pub mod context;
pub mod driver;
pub mod engine;
pub mod error;
pub mod profiling;
pub mod results;
pub mod scope;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use connection::LazyConnection;
pub use context::ExecutionContext;
pub use driver::{Connector, Cursor, RawConnection};
pub use engine::{Engine, EngineRegistry, create_engine, create_engine_with, engine};
pub use error::DbError;
pub use results::{ResultSet, Row};
pub use scope::{ConnectionScope, TransactionScope, with_connection, with_transaction};
pub use types::{DatabaseType, RowValues};
