mod args;
mod commands {
    pub mod cache;
    pub mod download;
    pub mod exceptions;
    pub mod migrate;
}

use std::process;

use clap::{Parser, Subcommand};
use commands::{cache, download, exceptions, migrate};
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "graze", version, about = "Cache the contents of urls locally")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content of a URL, fetching it if not cached yet
    Get(cache::GetArgs),
    /// Print the local file of a URL, fetching it if not cached yet
    Path(cache::PathArgs),
    /// List cached URLs
    List(cache::ListArgs),
    /// Remove cached URLs
    Rm(cache::RmArgs),
    /// Show the default cache directory
    Dir,
    /// Manage exceptional URLs served from local files
    Exceptions(exceptions::Args),
    /// Rewrite a cache folder written with an older key layout
    Migrate(migrate::Args),
    /// Download a URL to a file without caching it
    Download(download::Args),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Get(args) => cache::run_get(args),
        Commands::Path(args) => cache::run_path(args),
        Commands::List(args) => cache::run_list(args),
        Commands::Rm(args) => cache::run_rm(args),
        Commands::Dir => {
            cache::run_dir();
            Ok(())
        }
        Commands::Exceptions(args) => exceptions::run(args),
        Commands::Migrate(args) => migrate::run(args),
        Commands::Download(args) => download::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use graze::KeyLayout;

    use super::*;
    use commands::exceptions::ExceptionsCommand;

    #[test]
    fn test_parse_get_with_cache_args() {
        let cli = Cli::try_parse_from([
            "graze",
            "get",
            "https://example.com/data.csv",
            "--cache-dir",
            "/tmp/cache",
            "--max-age",
            "7d",
        ])
        .unwrap();
        let Commands::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.url, "https://example.com/data.csv");
        assert_eq!(args.cache.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(args.cache.max_age.as_deref(), Some("7d"));
        assert!(!args.cache.refresh);
        assert!(args.cache.to_options().unwrap().max_age.is_some());
    }

    #[test]
    fn test_refresh_conflicts_with_max_age() {
        let parsed = Cli::try_parse_from([
            "graze", "get", "https://e.com/x", "--refresh", "--max-age", "1h",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_max_age_is_reported() {
        let cli =
            Cli::try_parse_from(["graze", "path", "https://e.com/x", "--max-age", "soon"]).unwrap();
        let Commands::Path(args) = cli.command else {
            panic!("expected path");
        };
        assert!(args.cache.to_options().is_err());

        let cli = Cli::try_parse_from([
            "graze", "get", "https://e.com/x", "--max-age", "99999999999999w",
        ])
        .unwrap();
        let Commands::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert!(args.cache.to_options().is_err());
    }

    #[test]
    fn test_parse_exceptions_add() {
        let cli = Cli::try_parse_from([
            "graze",
            "exceptions",
            "add",
            "https://e.com/big",
            "/data/big.bin",
            "--cache-dir",
            "/tmp/c",
        ])
        .unwrap();
        let Commands::Exceptions(args) = cli.command else {
            panic!("expected exceptions");
        };
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert!(matches!(
            args.command,
            ExceptionsCommand::Add { ref url, ref file }
                if url == "https://e.com/big" && file == &PathBuf::from("/data/big.bin")
        ));
    }

    #[test]
    fn test_parse_migrate_layout() {
        let cli = Cli::try_parse_from(["graze", "migrate", "--from", "v2"]).unwrap();
        let Commands::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.from, Some(KeyLayout::V2));
        assert!(Cli::try_parse_from(["graze", "migrate", "--from", "v9"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["graze", "-v", "-q", "dir"]).is_err());
        let cli = Cli::try_parse_from(["graze", "dir", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_rm_requires_a_url() {
        assert!(Cli::try_parse_from(["graze", "rm"]).is_err());
        let cli = Cli::try_parse_from(["graze", "rm", "https://a/x", "https://b/y"]).unwrap();
        let Commands::Rm(args) = cli.command else {
            panic!("expected rm");
        };
        assert_eq!(args.urls.len(), 2);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
