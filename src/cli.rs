//! Command-line interface definitions for Local Feed.
//!
//! Every dashboard resource is one subcommand that prints its JSON response
//! on stdout; `snapshot` writes all of them into a directory. Global options
//! can be provided via flags or environment variables.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Local Feed application.
///
/// # Examples
///
/// ```sh
/// # Economy headlines, pretty-printed
/// local_feed --pretty news --category economy
///
/// # Every resource into ./out, refreshed every five minutes
/// local_feed snapshot --output-dir ./out --every 300
///
/// # Overridden catalog and a shorter upstream timeout
/// LOCAL_FEED_CONFIG=./feeds.yaml local_feed --timeout-ms 4000 stocks
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config overriding settings and catalog
    #[arg(short, long, global = true, env = "LOCAL_FEED_CONFIG")]
    pub config: Option<String>,

    /// Per-request upstream timeout in milliseconds
    #[arg(long, global = true, env = "LOCAL_FEED_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Deduplicated, newest-first headlines for a category
    News {
        #[arg(short = 'k', long, default_value = "all")]
        category: String,
    },
    /// Current conditions, outlook and air quality for a location
    Weather {
        #[arg(short, long, default_value = "seoul")]
        location: String,
    },
    /// Quotes for the most traded KRX equities, with USD conversion
    Stocks,
    /// Live USD/KRW rate
    Fx,
    /// Available categories and locations
    Meta,
    /// Write every resource as JSON files into a directory
    Snapshot {
        /// Directory receiving the JSON files
        #[arg(short, long)]
        output_dir: String,

        /// Repeat every N seconds instead of exiting after one pass
        #[arg(long)]
        every: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "local_feed",
            "--pretty",
            "news",
            "--category",
            "economy",
        ]);

        assert!(cli.pretty);
        assert_eq!(
            cli.command,
            Command::News {
                category: "economy".into()
            }
        );
    }

    #[test]
    fn test_cli_defaults_and_global_flags() {
        let cli = Cli::parse_from(["local_feed", "weather", "--timeout-ms", "2500"]);
        assert_eq!(cli.timeout_ms, Some(2500));
        assert_eq!(
            cli.command,
            Command::Weather {
                location: "seoul".into()
            }
        );
    }

    #[test]
    fn test_cli_snapshot_short_flags() {
        let cli = Cli::parse_from(["local_feed", "snapshot", "-o", "/tmp/out", "--every", "60"]);
        assert_eq!(
            cli.command,
            Command::Snapshot {
                output_dir: "/tmp/out".into(),
                every: Some(60)
            }
        );
    }
}
