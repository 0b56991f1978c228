//! Folder migration command.

use std::path::PathBuf;

use graze::{KeyLayout, default_cache_dir, migrate_folder};

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Layout the folder was written with ("v1" or "v2"); detected when omitted
    #[arg(long)]
    pub from: Option<KeyLayout>,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let root = args.cache_dir.unwrap_or_else(default_cache_dir);
    let report = migrate_folder(&root, args.from)?;
    println!(
        "Migrated {} entries from {} to {}",
        report.migrated, report.from, report.to
    );
    println!(
        "Check that everything works, then delete the backup: {}",
        report.backup.display()
    );
    Ok(())
}
