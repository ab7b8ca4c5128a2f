use clap::{Args, Parser, Subcommand};
use tracing::error;

mod scan;
mod server;

#[derive(Debug, Parser)]
#[command(name = "chunkdb", version)]
#[command(about = "chunkdb command line tools")]
#[command(long_about = r#"chunkdb command line tools
Examples:
    # Scan the current weekly chunk table with 8 parallel segments:
    chunkdb scan --segments 8
    # Run the multi-tenant block store query server:
    chunkdb blockstore --config ./config.toml"#)]
struct Cli {
    #[command(subcommand)]
    subcmd: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Scan a weekly chunk table, counting rows per tenant and optionally
    /// reindexing every chunk into a new index table family.
    Scan(ScanArgs),
    /// Run the multi-tenant block store query server.
    Blockstore(BlockStoreArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Address to listen on, for metrics, profiling, etc.
    #[arg(long, default_value = ":6060")]
    address: String,

    /// Week number to scan, e.g. 2497 (0 means current week).
    #[arg(long, default_value_t = 0)]
    week: i64,

    /// Number of segments to read in parallel.
    #[arg(long, default_value_t = 1)]
    segments: usize,

    /// File containing IDs of orgs to delete.
    #[arg(long = "delete-orgs-file", default_value = "")]
    delete_orgs_file: String,

    /// Debug level: debug, info, warning, error.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Prefix of new index table (blank to disable reindexing).
    #[arg(long = "dynamodb.reindex-prefix", default_value = "")]
    reindex_prefix: String,

    /// Path to the TOML config file, blank for defaults.
    #[arg(long, default_value = "")]
    config: String,
}

#[derive(Debug, Args)]
pub struct BlockStoreArgs {
    /// Debug level: debug, info, warning, error.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Path to the TOML config file, blank for defaults.
    #[arg(long, default_value = "")]
    config: String,
}

/// Logs the error and exits 1, the contract for any fatal failure.
pub fn check_fatal<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!("fatal error: {}", e);
            eprintln!("fatal error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str) {
    // `warning` is accepted for compatibility with older deployments.
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level.to_string()))
        .init();
}

fn load_config(path: &str) -> config::Config {
    if path.is_empty() {
        return config::Config::default();
    }
    check_fatal(config::Config::from_file(path))
}

fn main() {
    let cli = Cli::parse();
    let log_level = match &cli.subcmd {
        CliCommand::Scan(args) => args.log_level.clone(),
        CliCommand::Blockstore(args) => args.log_level.clone(),
    };
    init_logging(&log_level);

    let runtime = check_fatal(
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
    );

    match cli.subcmd {
        CliCommand::Scan(args) => runtime.block_on(scan::run(args)),
        CliCommand::Blockstore(args) => runtime.block_on(server::run(args)),
    }
}
