//! Download a URL to a file, bypassing the cache.

use std::path::PathBuf;

use graze::{DownloadOptions, internet, url_to_file_download};

use super::cache::format_size;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// URL to download
    pub url: String,

    /// Destination file
    pub file: PathBuf,

    /// Keep an existing destination file instead of downloading again
    #[arg(long)]
    pub no_overwrite: bool,

    /// Fail when the destination directory does not exist
    #[arg(long)]
    pub no_create_dirs: bool,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let source = internet()?;
    let opts = DownloadOptions {
        overwrite: !args.no_overwrite,
        ensure_dirs: !args.no_create_dirs,
    };
    let download = url_to_file_download(&args.url, &args.file, &source, opts)?;
    println!(
        "{} ({})",
        download.path.display(),
        format_size(download.content.len() as u64)
    );
    Ok(())
}
