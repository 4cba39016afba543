//! NetCDF Kerchunk index CLI.
//!
//! An index is a directory or Zip archive holding one Kerchunk JSON
//! document per NetCDF file of a source archive, mirroring the archive's
//! directory tree. This form of index suits NetCDF files that cannot be
//! concatenated along a common dimension, such as SMOS Level-2 products.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nckc_index::{IndexDescription, NcKcIndex, SyncOptions, DEFAULT_BLOCK_SIZE};
use netcdf_refs::silence_hdf5_errors;

#[derive(Parser, Debug)]
#[command(name = "nckcidx")]
#[command(about = "Manage NetCDF Kerchunk indexes")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Write logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a NetCDF Kerchunk index
    Create(CreateArgs),
    /// Synchronize an index with its source
    Sync(SyncArgs),
    /// Describe an index
    #[command(alias = "info")]
    Describe(DescribeArgs),
}

#[derive(Args, Debug)]
struct IndexArg {
    /// Index path, a directory or a `.zip` file
    #[arg(short, long = "index", value_name = "PATH", env = "NCKC_INDEX_PATH")]
    index_path: PathBuf,
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[command(flatten)]
    index: IndexArg,

    /// Source path, e.g. a local directory or `bucket/prefix` for S3
    #[arg(short, long, value_name = "PATH")]
    source_path: String,

    /// Source protocol: `file` or `s3`; derived from the path if omitted
    #[arg(short = 'p', long, value_name = "PROTOCOL")]
    source_protocol: Option<String>,

    /// Source storage options as a JSON object
    #[arg(short = 'o', long, value_name = "JSON")]
    source_storage_options: Option<String>,

    /// S3 access key identifier
    #[arg(long, value_name = "KEY")]
    key: Option<String>,

    /// S3 secret access key
    #[arg(long, value_name = "SECRET")]
    secret: Option<String>,

    /// S3 endpoint URL
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Force anonymous S3 access
    #[arg(long)]
    anon: bool,

    /// Replace an existing index
    #[arg(long)]
    replace: bool,
}

#[derive(Args, Debug)]
struct SyncArgs {
    #[command(flatten)]
    index: IndexArg,

    /// Only index files below this source path prefix
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Number of files translated concurrently
    #[arg(short = 'w', long, default_value_t = 1)]
    num_workers: usize,

    /// Number of files per block when using several workers
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Do not skip files that are already indexed
    #[arg(long)]
    force: bool,

    /// Do not write any index entries
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct DescribeArgs {
    #[command(flatten)]
    index: IndexArg,

    /// Print the description as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    silence_hdf5_errors();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Create(args) => create(args),
            Command::Sync(args) => sync(args).await,
            Command::Describe(args) => describe(args),
        }
    })
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn create(args: CreateArgs) -> Result<()> {
    let options = storage_options(&args)?;
    let index = NcKcIndex::create(
        &args.index.index_path,
        Some(&args.source_path),
        args.source_protocol.as_deref(),
        Some(options),
        args.replace,
    )
    .with_context(|| format!("Failed to create index {}", args.index.index_path.display()))?;
    index.close()?;
    println!("Created empty index {}", absolute(index.index_path()).display());
    Ok(())
}

async fn sync(args: SyncArgs) -> Result<()> {
    if args.num_workers == 0 || args.block_size == 0 {
        bail!("--num-workers and --block-size must be positive");
    }
    let index = open_index(&args.index.index_path, !args.dry_run)?;
    let options = SyncOptions {
        prefix: args.prefix,
        num_workers: args.num_workers,
        block_size: args.block_size,
        force: args.force,
        dry_run: args.dry_run,
    };
    info!(?options, "Synchronizing index");
    let report = index.sync(&options).await?;
    index.close()?;

    println!(
        "{} file(s) synchronized in {}",
        report.num_indexed,
        absolute(index.index_path()).display()
    );
    if report.num_skipped > 0 {
        println!("{} file(s) already indexed", report.num_skipped);
    }
    if !report.problems.is_empty() {
        println!("{} problem(s) encountered:", report.problems.len());
        for problem in &report.problems {
            println!("  {}", problem);
        }
    }
    Ok(())
}

fn describe(args: DescribeArgs) -> Result<()> {
    let index = open_index(&args.index.index_path, false)?;
    let description = index.describe()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&description)?);
    } else {
        print!("{}", format_description(&description));
    }
    Ok(())
}

fn open_index(index_path: &Path, writable: bool) -> Result<NcKcIndex> {
    let index = if writable {
        NcKcIndex::open_with_mode(index_path, storage::IndexMode::Append)
    } else {
        NcKcIndex::open(index_path)
    };
    index.with_context(|| format!("Failed to open index {}", index_path.display()))
}

/// Merge `--source-storage-options` with the S3 convenience flags.
fn storage_options(args: &CreateArgs) -> Result<Map<String, Value>> {
    let mut options = match &args.source_storage_options {
        Some(json) => match serde_json::from_str(json).context("Invalid --source-storage-options")? {
            Value::Object(map) => map,
            other => bail!("--source-storage-options must be a JSON object, got {}", other),
        },
        None => Map::new(),
    };
    if let Some(key) = &args.key {
        options.insert("key".into(), Value::from(key.as_str()));
    }
    if let Some(secret) = &args.secret {
        options.insert("secret".into(), Value::from(secret.as_str()));
    }
    if let Some(endpoint) = &args.endpoint {
        options.insert("endpoint_url".into(), Value::from(endpoint.as_str()));
    }
    if args.anon {
        options.insert("anon".into(), Value::from(true));
    }
    Ok(options)
}

fn format_description(description: &IndexDescription) -> String {
    let mut out = String::new();
    out.push_str(&format!("Index path: {}\n", description.index_path));
    out.push_str(&format!("Source path: {}\n", description.source_path));
    out.push_str(&format!("Source protocol: {}\n", description.source_protocol));
    if description.source_storage_options.is_empty() {
        out.push_str("No source storage options.\n");
    } else {
        out.push_str("Source storage options:\n");
        for (key, value) in &description.source_storage_options {
            out.push_str(&format!("  {}: {}\n", key, value));
        }
    }
    out.push_str(&format!("Entries: {}\n", description.num_entries));
    for (product_type, count) in &description.entries_per_product_type {
        out.push_str(&format!("  {}: {}\n", product_type, count));
    }
    out
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
