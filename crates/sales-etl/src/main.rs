//! Sales ETL - transform and load sales CSV files

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sales_etl::config::EtlConfig;
use sales_etl::handler::{handle_load, handle_pipeline, handle_transform, InvocationResponse};
use sales_etl::query;
use sales_etl::sink::PgConnector;
use sales_etl::storage::S3BlobStore;
use sales_etl_common::logging::{init_logging, LogConfig, LogLevel};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sales-etl")]
#[command(author, version, about = "Sales CSV transform-and-load pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean a raw extract and upload it as `<name>-et.<ext>`
    Transform(EventArgs),

    /// Load a cleaned file into the sales_data table
    Load(EventArgs),

    /// Transform, then load the cleaned file
    Pipeline(EventArgs),

    /// Print summary statistics of the loaded data
    Query,
}

#[derive(Args, Debug)]
struct EventArgs {
    /// Raw invocation event, e.g. '{"bucketname":"raw","filename":"sales.csv"}'
    #[arg(long, conflicts_with_all = ["bucket", "key"])]
    event: Option<String>,

    /// Source bucket
    #[arg(short, long)]
    bucket: Option<String>,

    /// Source object key
    #[arg(short, long)]
    key: Option<String>,
}

impl EventArgs {
    fn to_event(&self) -> Result<Value> {
        if let Some(raw) = &self.event {
            return serde_json::from_str(raw).context("--event is not valid JSON");
        }

        let mut event = serde_json::Map::new();
        if let Some(bucket) = &self.bucket {
            event.insert("bucketname".to_string(), json!(bucket));
        }
        if let Some(key) = &self.key {
            event.insert("filename".to_string(), json!(key));
        }
        Ok(Value::Object(event))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sales-etl")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = EtlConfig::load().context("Failed to load configuration")?;

    let response = match cli.command {
        Command::Transform(args) => {
            let store = S3BlobStore::new(&config.storage).await;
            handle_transform(&store, &args.to_event()?).await
        },
        Command::Load(args) => {
            let store = S3BlobStore::new(&config.storage).await;
            let connector = PgConnector::from_config(&config.database);
            handle_load(&store, &connector, config.load.batch_size, &args.to_event()?).await
        },
        Command::Pipeline(args) => {
            let store = S3BlobStore::new(&config.storage).await;
            let connector = PgConnector::from_config(&config.database);
            handle_pipeline(&store, &connector, config.load.batch_size, &args.to_event()?).await
        },
        Command::Query => {
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            let summary = query::summarize(&pool).await?;
            pool.close().await;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(ExitCode::SUCCESS);
        },
    };

    println!("{}", serde_json::to_string_pretty(&response.to_json())?);

    if let InvocationResponse::Error(_) = response {
        return Ok(ExitCode::FAILURE);
    }

    info!("Done");
    Ok(ExitCode::SUCCESS)
}
