//! PostgreSQL driver implementation

mod codec;
mod connection;
mod driver;
mod schema;
mod tls;

pub use codec::{escape_identifier_pg, escape_table_name_pg};
pub use connection::PostgresConnection;
pub use driver::PostgresDriver;
pub use tls::{SslMode, TlsFiles, build_tls_connector};
