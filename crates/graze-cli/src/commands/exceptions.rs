//! Exceptional URL management.

use std::path::PathBuf;

use clap::Subcommand;
use graze::{add_exception, default_cache_dir, list_exceptions};

#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(subcommand)]
    pub command: ExceptionsCommand,

    /// Custom cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ExceptionsCommand {
    /// Serve a URL from an existing local file
    Add {
        /// URL to register
        url: String,
        /// File holding the URL's content
        file: PathBuf,
    },
    /// List registered URLs
    List,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let root = args.cache_dir.unwrap_or_else(default_cache_dir);
    match args.command {
        ExceptionsCommand::Add { url, file } => {
            add_exception(&root, &url, &file)?;
            println!("Registered {url} -> {}", file.display());
        }
        ExceptionsCommand::List => {
            let exceptions = list_exceptions(&root)?;
            if exceptions.is_empty() {
                println!("No exceptional urls.");
            }
            for (url, path) in exceptions {
                println!("{url}\t{path}");
            }
        }
    }
    Ok(())
}
