//! simhub - command line client for the SimHub resource service

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use simhub_client::{
    config, metrics, ClientConfig, ProgressFn, ResourceQuery, SimHubClient, UploadMeta, UploadMode,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SimHub command line client
#[derive(Parser, Debug)]
#[command(name = "simhub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to SIMHUB_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SimHub base URL, overrides the configuration
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token, overrides the configuration
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG when unset
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List resource types
    Types,

    /// List resources
    List {
        #[arg(long = "type")]
        type_key: Option<String>,

        #[arg(long)]
        keyword: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        size: u32,
    },

    /// Show a resource
    Get { id: String },

    /// Upload a file as a new resource version
    Upload {
        file: PathBuf,

        #[arg(long = "type")]
        resource_type: String,

        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "1.0.0")]
        semver: String,

        /// Stored file name (defaults to the file's name)
        #[arg(long)]
        filename: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        /// auto, simple or multipart
        #[arg(long, default_value_t = UploadMode::Auto)]
        mode: UploadMode,

        /// Part size in bytes
        #[arg(long)]
        part_size: Option<u64>,

        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Download the latest version of a resource
    Download { id: String, path: PathBuf },
}

fn init_logging(level: Option<&str>, json: bool) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match (&args.config, &args.base_url) {
        (Some(path), _) => ClientConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        (None, Some(base_url)) => ClientConfig::new(
            base_url.clone(),
            config::token_from_env().context("reading SIMHUB_TOKEN")?,
        ),
        (None, None) => ClientConfig::from_env()
            .context("no --config or --base-url given and SIMHUB_BASE_URL is not usable")?,
    };

    if let Some(base_url) = &args.base_url {
        config.server.base_url = base_url.clone();
    }
    if let Some(token) = &args.token {
        config.server.token = Some(token.clone());
    }
    if let Command::Upload {
        part_size,
        concurrency,
        ..
    } = &args.command
    {
        if let Some(part_size) = part_size {
            config.upload.part_size = *part_size;
        }
        if let Some(concurrency) = concurrency {
            config.upload.concurrency = *concurrency;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Progress line on stderr
fn progress_printer(label: &'static str) -> ProgressFn {
    Arc::new(move |done, total, finished| {
        if total > 0 {
            eprint!("\r{label}: {done}/{total} bytes ({:.1}%)", done as f64 * 100.0 / total as f64);
        } else {
            eprint!("\r{label}: {done} bytes");
        }
        if finished {
            eprintln!();
        }
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    info!(base_url = %config.base_url(), "Using SimHub");
    let client = SimHubClient::new(config)?;

    match &args.command {
        Command::Types => print_json(&client.list_resource_types().await?),
        Command::List {
            type_key,
            keyword,
            page,
            size,
        } => {
            let query = ResourceQuery {
                type_key: type_key.clone(),
                keyword: keyword.clone(),
                page: *page,
                size: *size,
            };
            print_json(&client.list_resources(&query).await?)
        }
        Command::Get { id } => print_json(&client.get_resource(id).await?),
        Command::Upload {
            file,
            resource_type,
            name,
            semver,
            filename,
            category,
            tags,
            mode,
            ..
        } => {
            let mut meta = UploadMeta::new(
                resource_type.as_str(),
                filename.clone().unwrap_or_default(),
                name.as_str(),
                semver.as_str(),
            )
            .with_tags(tags.iter().cloned());
            if let Some(category) = category {
                meta = meta.with_category(category.as_str());
            }

            let confirmed = client
                .upload_file(file, &meta, *mode, Some(progress_printer("upload")))
                .await
                .with_context(|| format!("uploading {}", file.display()))?;

            print_json(&serde_json::json!({
                "ticket_id": confirmed.ticket_id,
                "object_key": confirmed.object_key,
                "size": confirmed.size,
                "parts": confirmed.parts,
                "resource": confirmed.response,
            }))
        }
        Command::Download { id, path } => {
            let bytes = download(&client, id, path).await?;
            print_json(&serde_json::json!({ "resource_id": id, "path": path, "bytes": bytes }))
        }
    }
}

async fn download(client: &SimHubClient, id: &str, path: &Path) -> anyhow::Result<u64> {
    client
        .download_to_file(id, path, Some(progress_printer("download")))
        .await
        .with_context(|| format!("downloading {} to {}", id, path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref(), args.json_logs)?;

    let result = run(&args).await;

    if args.metrics {
        eprint!("{}", metrics::render());
    }
    result
}
