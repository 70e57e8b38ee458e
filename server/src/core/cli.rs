use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_DEBUG, ENV_HOST, ENV_PORT, ENV_REMOTE_TIMEOUT_SECS, ENV_TABLES_DIR,
};

#[derive(Parser)]
#[command(name = "dataplane-server")]
#[command(version, about = "Serve typed tables over the Data Plane protocol", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Enable debug mode (verbose logging, request headers in traces)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Directory scanned for table spec (*.json) and CSV (*.csv) files
    #[arg(long, short = 't', global = true, env = ENV_TABLES_DIR)]
    pub tables_dir: Option<PathBuf>,

    /// Timeout in seconds for requests made by remote tables
    #[arg(long, global = true, env = ENV_REMOTE_TIMEOUT_SECS)]
    pub remote_timeout_secs: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Load every table file, report problems and exit
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub tables_dir: Option<PathBuf>,
    pub remote_timeout_secs: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        debug: cli.debug,
        config: cli.config,
        tables_dir: cli.tables_dir,
        remote_timeout_secs: cli.remote_timeout_secs,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "dataplane-server",
            "check",
            "-p",
            "9000",
            "--tables-dir",
            "/srv/tables",
            "--remote-timeout-secs",
            "5",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.tables_dir, Some(PathBuf::from("/srv/tables")));
        assert_eq!(cli.remote_timeout_secs, Some(5));
    }
}
