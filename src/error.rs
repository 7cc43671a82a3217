use std::path::PathBuf;

use crate::config::ConfigError;
use crate::catalog::StoreError;

/// Fatal errors that can abort startup, before the main loop takes over.
/// Recoverable, per-request or per-scan errors live closer to their own
/// modules ([`crate::scanner::ScanError`], [`crate::http`] handler errors)
/// and are not routed through this type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("document root {0} does not exist or is not a directory")]
    InvalidDocumentRoot(PathBuf),

    #[error("failed to bind listening address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
