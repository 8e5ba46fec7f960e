//! Files photos and videos into `<date>/<place>` folders.
//!
//! A capture date comes from EXIF, the file name or the modification time.
//! A position comes from embedded GPS or, failing that, from a Google
//! location-history export. The place name is the nearest GeoNames record.

pub mod actions;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod resolver;
pub mod template;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
/// `level`.
pub fn init_logging(level: impl Into<LevelFilter>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.into().to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}
