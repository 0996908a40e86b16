//! Command-line interface definitions for the news scraper.
//!
//! Everything else lives in the YAML configuration file; flags only pick the
//! file, the log verbosity, and optionally narrow or tune a single run.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape every configured source
/// news_scraper --config config.yaml
///
/// # One source, saving after every 10 articles
/// news_scraper --source cnn --save-interval 10
///
/// # Verbose logging (RUST_LOG takes precedence when set)
/// news_scraper --log-level debug
///
/// # Keep a full debug log next to the console output
/// news_scraper --log-file scraper.log
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Only scrape the configured source with this name
    #[arg(short, long)]
    pub source: Option<String>,

    /// Save to disk after this many new articles per source (0 saves only at the end)
    #[arg(long)]
    pub save_interval: Option<usize>,

    /// Also write DEBUG-level logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["news_scraper"]);

        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.log_level, "info");
        assert!(cli.source.is_none());
        assert!(cli.save_interval.is_none());
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::parse_from([
            "news_scraper",
            "--config",
            "/etc/news/sources.yaml",
            "--log-level",
            "debug",
            "--source",
            "nytimes_world",
            "--save-interval",
            "25",
            "--log-file",
            "logs/scraper.log",
        ]);

        assert_eq!(cli.config, PathBuf::from("/etc/news/sources.yaml"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.source.as_deref(), Some("nytimes_world"));
        assert_eq!(cli.save_interval, Some(25));
        assert_eq!(cli.log_file, Some(PathBuf::from("logs/scraper.log")));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["news_scraper", "-c", "alt.yaml", "-s", "cnn", "-l", "warn"]);

        assert_eq!(cli.config, PathBuf::from("alt.yaml"));
        assert_eq!(cli.source.as_deref(), Some("cnn"));
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_cli_rejects_non_numeric_interval() {
        assert!(Cli::try_parse_from(["news_scraper", "--save-interval", "often"]).is_err());
    }
}
