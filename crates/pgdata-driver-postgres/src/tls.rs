//! TLS setup for PostgreSQL connections
//!
//! Understands the libpq `sslmode` values and the `sslrootcert`,
//! `sslcert` and `sslkey` file parameters.

use native_tls::{Certificate, Identity, TlsConnector};
use pgdata_core::{PgDataError, Result};
use postgres_native_tls::MakeTlsConnector;
use std::fs;

/// libpq `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// Parse an `sslmode` value; unknown values fall back to `prefer`
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "allow" | "prefer" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" | "verify_ca" => SslMode::VerifyCa,
            "verify-full" | "verify_full" => SslMode::VerifyFull,
            other => {
                tracing::warn!(sslmode = other, "unknown sslmode, using prefer");
                SslMode::Prefer
            }
        }
    }

    pub fn uses_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    pub(crate) fn to_tokio_postgres(self) -> tokio_postgres::config::SslMode {
        match self {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                tokio_postgres::config::SslMode::Require
            }
        }
    }
}

/// Certificate files for a TLS connection
#[derive(Debug, Clone, Default)]
pub struct TlsFiles {
    pub root_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

fn read_file(path: &str, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| PgDataError::Connection(format!("Failed to read {} {}: {}", what, path, e)))
}

/// Build a TLS connector for `mode`
pub fn build_tls_connector(mode: SslMode, files: &TlsFiles) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();

    if let Some(path) = files.root_cert.as_deref().filter(|p| !p.is_empty()) {
        let data = read_file(path, "CA certificate")?;
        let cert = Certificate::from_pem(&data)
            .map_err(|e| PgDataError::Connection(format!("Failed to parse CA certificate: {}", e)))?;
        builder.add_root_certificate(cert);
    }

    if let (Some(cert_path), Some(key_path)) = (
        files.client_cert.as_deref().filter(|p| !p.is_empty()),
        files.client_key.as_deref().filter(|p| !p.is_empty()),
    ) {
        let cert = read_file(cert_path, "client certificate")?;
        let key = read_file(key_path, "client key")?;
        let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
            PgDataError::Connection(format!("Failed to create identity from certificate and key: {}", e))
        })?;
        builder.identity(identity);
    }

    // only verify-full checks the hostname
    builder.danger_accept_invalid_hostnames(mode != SslMode::VerifyFull);
    // prefer/require without a root certificate encrypt but do not verify
    builder.danger_accept_invalid_certs(
        matches!(mode, SslMode::Prefer | SslMode::Require) && files.root_cert.is_none(),
    );

    let connector = builder
        .build()
        .map_err(|e| PgDataError::Connection(format!("Failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}
