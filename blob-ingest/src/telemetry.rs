//! Log output for binaries embedding the crate.

use crate::{IngestError, IngestResult};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
pub fn init() -> IngestResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| IngestError::invalid(format!("tracing already initialized: {}", e)))
}
