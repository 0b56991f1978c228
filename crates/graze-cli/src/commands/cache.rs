//! Cache lookup and management commands.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local};
use graze::{Cache, Grazed, default_cache_dir, graze, internet, key_to_url, normalize_url, url_to_key};

use crate::args::CacheArgs;

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// URL to get
    pub url: String,

    /// Write the content to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// URL whose local file to print
    pub url: String,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    /// URLs to remove
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

pub fn run_get(args: GetArgs) -> anyhow::Result<()> {
    let source = internet()?;
    let got = graze(&args.url, &source, args.cache.to_options()?)?;
    let Some(content) = got.into_content() else {
        anyhow::bail!("folder cache returned no content for {}", args.url);
    };
    match args.output {
        Some(path) => {
            fs::write(&path, &content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {} to {}", format_size(content.len() as u64), path.display());
        }
        None => std::io::stdout().lock().write_all(&content)?,
    }
    Ok(())
}

pub fn run_path(args: PathArgs) -> anyhow::Result<()> {
    let source = internet()?;
    let opts = args.cache.to_options()?.return_key(true);
    match graze(&args.url, &source, opts)? {
        Grazed::Path(path) => println!("{}", path.display()),
        Grazed::Key(key) => println!("{key}"),
        Grazed::Content(_) => anyhow::bail!("expected a location for {}", args.url),
    }
    Ok(())
}

pub fn run_list(args: ListArgs) -> anyhow::Result<()> {
    let root = args.cache_dir.unwrap_or_else(default_cache_dir);
    let cache = Cache::folder(&root);

    let mut rows = Vec::new();
    for key in cache.keys() {
        let key = key?;
        let Some(path) = cache.local_path(&key) else {
            continue;
        };
        let meta = fs::metadata(&path)?;
        // Files that do not follow the current layout are listed by key
        let url = key_to_url(&key).unwrap_or_else(|_| key.clone());
        rows.push((url, meta.len(), meta.modified().ok()));
    }

    if rows.is_empty() {
        println!("Cache is empty.");
        return Ok(());
    }

    println!("{:<60} {:>10} {:>20}", "URL", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(92));

    let mut total_size: u64 = 0;
    for (url, size, modified) in &rows {
        let modified = modified
            .map(|at| DateTime::<Local>::from(at).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<60} {:>10} {:>20}", truncate(url, 60), format_size(*size), modified);
        total_size += size;
    }

    println!("{}", "-".repeat(92));
    println!("{} entries, {} total", rows.len(), format_size(total_size));
    Ok(())
}

pub fn run_rm(args: RmArgs) -> anyhow::Result<()> {
    let root = args.cache_dir.unwrap_or_else(default_cache_dir);
    let mut cache = Cache::folder(&root);
    for url in &args.urls {
        cache
            .delete(&url_to_key(normalize_url(url)))
            .with_context(|| format!("failed to remove {url}"))?;
        println!("Removed {url}");
    }
    Ok(())
}

pub fn run_dir() {
    println!("{}", default_cache_dir().display());
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let head: String = s.chars().take(width - 3).collect();
    format!("{head}...")
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
