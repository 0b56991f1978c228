//! Shared argument definitions.

use std::path::PathBuf;

use anyhow::anyhow;
use graze::{GrazeOptions, default_cache_dir, parse_duration};

/// Cache-related command-line arguments.
///
/// Can be embedded in other command Args using `#[command(flatten)]`.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct CacheArgs {
    /// Cache directory (defaults to $GRAZE_DIR, then ~/graze)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Force refresh: ignore the cached copy and fetch again
    #[arg(long, conflicts_with = "max_age")]
    pub refresh: bool,

    /// Refetch entries older than this (e.g., "24h", "7d")
    #[arg(long)]
    pub max_age: Option<String>,
}

impl CacheArgs {
    /// Cache root these arguments point at.
    pub fn root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Build lookup options from command-line arguments.
    pub fn to_options(&self) -> anyhow::Result<GrazeOptions> {
        let mut opts = GrazeOptions::new().rootdir(self.root());
        if self.refresh {
            opts = opts.refresh(true);
        }
        if let Some(max_age) = &self.max_age {
            let max_age =
                parse_duration(max_age).ok_or_else(|| anyhow!("invalid duration: {max_age}"))?;
            opts = opts.max_age(max_age);
        }
        Ok(opts)
    }
}
