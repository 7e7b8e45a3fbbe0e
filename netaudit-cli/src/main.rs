//! netaudit CLI
//!
//! Command-line interface for auditing managed OpenShift cluster networking

use anyhow::{bail, Result};
use clap::Parser;
use netaudit_cli::audit::{self, assembler::AssembleOptions, driver};
use netaudit_cli::cache::{CacheBackend, ResponseCache};
use netaudit_cli::config::{Config, OcmCredentials};
use netaudit_cli::logging::LoggingConfig;
use netaudit_cli::output::{self, OutputFormat, WriteMode};
use netaudit_cli::{DriverOptions, OcmClient};
use std::io::{self, IsTerminal};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Audit the network configurations of managed OpenShift clusters")]
struct Cli {
    /// Path to a list of internal cluster IDs, one per line
    cid_file: PathBuf,

    /// Output path for the audit results (see also -a, -c)
    csv_file: PathBuf,

    /// Directory where on-cluster audit results are stored, organized by cluster ID
    #[arg(long, value_name = "PATH")]
    on_cluster_audit_dir: Option<PathBuf>,

    /// Skip writing headers to the output CSV file (see also -a)
    #[arg(short, long)]
    no_headers: bool,

    /// Append to the output file instead of overwriting it
    #[arg(short, long, conflicts_with = "clobber")]
    append: bool,

    /// Overwrite the output file if it already exists
    #[arg(short, long)]
    clobber: bool,

    /// Output format (csv, json, yaml)
    #[arg(short, long, default_value = "csv")]
    output: String,

    /// Also print the results as a table
    #[arg(long)]
    table: bool,

    /// OCM credentials file
    #[arg(long, env = "OCM_CONFIG", value_name = "PATH")]
    ocm_config: Option<PathBuf>,

    /// CLI configuration file (default: ~/.config/netaudit/cli.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the HTTP response cache
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Keep responses in memory for this run only
    #[arg(long, conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Refetch cached responses older than this many seconds
    #[arg(long, value_name = "SECONDS")]
    cache_expire_after: Option<u64>,

    /// Seconds to wait before retrying a cluster after a connectivity failure
    #[arg(long, value_name = "SECONDS")]
    retry_delay: Option<u64>,

    /// Flag clusters whose on-cluster version differs from OCM
    #[arg(long)]
    check_version: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write JSON logs to this directory
    #[arg(long, value_name = "DIR")]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration
    fn merge_into(&self, mut config: Config) -> Config {
        if let Some(path) = &self.ocm_config {
            config.ocm_config = Some(path.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(secs) = self.cache_expire_after {
            config.cache_expire_after = Some(secs);
        }
        if let Some(secs) = self.retry_delay {
            config.retry_delay = secs;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.check_version |= self.check_version;
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = cli.merge_into(config);

    let _log_guard = LoggingConfig {
        level: config.log_level.clone(),
        file_dir: cli.log_file.clone(),
    }
    .init()?;

    let mode = WriteMode::from_flags(cli.append, cli.clobber);
    let format = OutputFormat::from_str(&cli.output);
    output::check_destination(&cli.csv_file, format, mode)?;

    let cluster_ids = audit::read_cluster_ids(&cli.cid_file)?;

    let Some(ocm_config) = &config.ocm_config else {
        bail!("no OCM credentials: set OCM_CONFIG or pass --ocm-config");
    };
    let credentials = OcmCredentials::load(ocm_config)?;

    // Initialize API client
    let backend = if cli.no_cache {
        CacheBackend::Memory
    } else {
        CacheBackend::Disk(config.cache_dir.clone())
    };
    let cache = ResponseCache::new(backend, config.cache_expire_after());
    let api = OcmClient::new(&credentials, cache, config.request_timeout())?;

    let options = DriverOptions {
        retry_delay: config.retry_delay(),
        show_progress: io::stderr().is_terminal(),
        assemble: AssembleOptions {
            check_version: config.check_version,
        },
    };

    let run = driver::run(&api, &cluster_ids, cli.on_cluster_audit_dir.as_deref(), &options).await;

    let written = output::write_records(&cli.csv_file, &run.records, format, mode, !cli.no_headers)?;
    if written == 0 {
        output::print_warning("No clusters could be audited, nothing written");
    } else {
        if cli.table {
            output::print_table(&run.records);
        }
        output::print_success(&format!(
            "Wrote {} of {} clusters to {}",
            written,
            cluster_ids.len(),
            cli.csv_file.display()
        ));
    }

    for omitted in &run.omitted {
        output::print_error(&format!("{}: {}", omitted.cluster_id, omitted.reason));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_append_conflicts_with_clobber() {
        let result = Cli::try_parse_from(["netaudit", "ids.txt", "out.csv", "-a", "-c"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "netaudit",
            "ids.txt",
            "out.csv",
            "--retry-delay",
            "1",
            "--check-version",
            "--cache-dir",
            "/tmp/cache",
        ])
        .unwrap();

        let config = cli.merge_into(Config::default());
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert!(config.check_version);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.log_level, "info");
    }
}
