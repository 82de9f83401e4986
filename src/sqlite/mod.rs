// SQLite driver for the scoping layer.
//
// - config: options read from `EngineConfig` and the connector
// - connection: raw connection and cursor
// - params: parameter conversion from `RowValues`
// - query: result extraction

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SqliteOptions, connector};
pub use connection::{SqliteCursor, SqliteRawConnection};
pub use params::Params;
pub use query::build_result_set;
