//! QuickELT CLI: ingest sources into the bronze tier, clean bronze artifacts
//! into silver and inspect what has been stored.

mod commands;
pub(crate) mod setup;

use clap::Parser;
use quickelt_core::columnar::{FileFormat, OutputFormat};
use quickelt_core::naming::Tier;
use std::path::PathBuf;

/// QuickELT: bronze/silver ingestion with paired metadata sidecars
#[derive(Parser, Debug)]
#[command(name = "quickelt", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds quickelt.toml and the storage tiers)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch a source and store it with its metadata sidecar
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },
    /// Clean a bronze artifact into the silver tier
    Clean {
        /// Path to the bronze artifact
        artifact: PathBuf,
        /// Cleaning template settings (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the silver artifact in this format (parquet, csv, jsonl)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },
    /// List stored artifacts
    List {
        /// Only this tier (bronze, silver, gold)
        #[arg(short, long)]
        tier: Option<Tier>,
        /// Only this origin
        #[arg(short, long)]
        origin: Option<String>,
    },
    /// Check that every artifact has its sidecar and the reverse
    Verify,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Interactive configuration wizard
    Setup,
}

/// Options shared by every ingest source.
#[derive(clap::Args, Debug, Clone)]
struct IngestArgs {
    /// Origin name used in the Naming Key
    #[arg(long)]
    origin: String,
    /// Format token for the Naming Key (defaults to the source's format)
    #[arg(long)]
    format_token: Option<String>,
    /// Storage tier
    #[arg(long, default_value = "bronze")]
    tier: Tier,
    /// Artifact format (defaults to storage.default_output_format)
    #[arg(long)]
    output_format: Option<OutputFormat>,
    /// Data contract: a built-in name or a .toml/.json file
    #[arg(long)]
    contract: Option<String>,
    /// Extra run parameter recorded in the sidecar (key=value, repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum IngestSource {
    /// Local CSV, JSON, JSON Lines or Parquet file
    File {
        path: PathBuf,
        /// Override the format implied by the extension
        #[arg(long)]
        format: Option<FileFormat>,
        #[arg(long, default_value = ",")]
        delimiter: char,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// SQL query against a SQLite database
    Database {
        /// Query to run
        #[arg(long)]
        query: String,
        /// SQLite file (defaults to databases.sqlite_path)
        #[arg(long)]
        db: Option<PathBuf>,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// JSON HTTP API
    Api {
        /// Absolute URL or a path under api.base_url
        endpoint: String,
        /// Bearer token (defaults to api.key)
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Field holding the records in an object response
        #[arg(long, default_value = "results")]
        results_key: String,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// CSV file stored in SharePoint
    Sharepoint {
        file_url: String,
        /// Bearer token (defaults to sharepoint.token, then client credentials)
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = ",")]
        delimiter: char,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// HTML table on a web page
    Web {
        /// Page URL (defaults to scraping.url)
        url: Option<String>,
        /// Which table on the page, counting from 0
        #[arg(long, default_value = "0")]
        table_index: usize,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// Object in S3-compatible storage
    S3 {
        /// Object key, relative to s3.prefix, or a full s3://bucket/key URL
        key: String,
        /// Bucket (defaults to s3.bucket)
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        format: Option<FileFormat>,
        #[arg(long, default_value = ",")]
        delimiter: char,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// Run an ingestion described in a TOML job file
    Job {
        /// Job file with `origin` and a `[source]` table
        path: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default quickelt.toml into the workspace
    Init,
    /// Show the resolved configuration with secrets masked
    Show,
    /// Validate the resolved configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    // Load .env files if present; variables already set win.
    let _ = dotenvy::from_path(workspace.join(".env"));
    let _ = dotenvy::dotenv();

    let verbosity = commands::Verbosity {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    commands::handle_command(cli.command, &workspace, verbosity).await
}
