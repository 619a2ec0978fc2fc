//! Persistence layer: libSQL-backed storage for customers and the
//! administrative hierarchy.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
