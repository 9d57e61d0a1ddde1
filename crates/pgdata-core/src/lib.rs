//! pgdata core - shared abstractions for the pgdata crates
//!
//! This crate provides the types and traits the other pgdata crates
//! depend on:
//!
//! - `Connection` - async trait for database connections
//! - `DatabaseDriver` - trait for opening connections
//! - `SchemaIntrospection` - schema, table, column and index metadata
//! - `ConnectionConfig` - PostgreSQL URL parsing and `DATABASE_URL` lookup
//! - `QueryCache` - named SQL files loaded on demand
//! - Common types like `Value`, `Row`, `Record` and `QueryResult`

mod config;
mod connection;
mod driver;
mod error;
mod queries;
mod schema;
mod types;

pub use config::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use queries::*;
pub use schema::*;
pub use types::*;
