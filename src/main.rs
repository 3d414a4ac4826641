//! CLI entry point for speedgrid.
//!
//! Ingests network speed measurements into the CSV store and serves
//! aggregated, filtered views of them as JSON.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use speedgrid::aggregate::{SummaryTable, recompute};
use speedgrid::config::{AggregationMode, EngineConfig};
use speedgrid::fetch::auth::{Header, UrlParam};
use speedgrid::fetch::{BasicClient, HttpClient};
use speedgrid::infra::{IpApiLocator, NominatimDescriber};
use speedgrid::ingest::Ingestor;
use speedgrid::normalize::Normalizer;
use speedgrid::output::print_json;
use speedgrid::parser::parse_submissions;
use speedgrid::publish::publish_summaries;
use speedgrid::query::QueryEngine;
use speedgrid::services::Describer;
use speedgrid::store::{CsvStore, MeasurementStore};
use speedgrid::trends::{FilterQuery, FilterSpec, ProviderTestsView, provider_rollup};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "speedgrid")]
#[command(about = "Aggregate crowd-sourced network speed measurements", long_about = None)]
struct Cli {
    /// JSON configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Only this provider ("all" for every provider)
    #[arg(long)]
    provider: Option<String>,

    /// Only this grid cell, as "latBucket,lonBucket"
    #[arg(long)]
    location: Option<String>,

    /// First date to include (YYYY-MM-DD)
    #[arg(long)]
    from_date: Option<String>,

    /// Last date to include (YYYY-MM-DD)
    #[arg(long)]
    to_date: Option<String>,
}

impl FilterArgs {
    fn spec(self) -> Result<FilterSpec> {
        Ok(FilterSpec::try_from(FilterQuery {
            provider: self.provider,
            location: self.location,
            from_date: self.from_date,
            to_date: self.to_date,
        })?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest submissions from a JSON array or JSON-lines file ("-" for stdin)
    Ingest {
        #[arg(value_name = "FILE")]
        source: String,

        /// Network address of the submitting client, used for location lookup
        #[arg(long)]
        client_ip: Option<String>,
    },
    /// Aggregated bucket summaries matching a filter
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Speed and ping time series plus per-provider totals
    Trends {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// One marker per grid cell
    Map {
        #[command(flatten)]
        filter: FilterArgs,

        /// Label markers with reverse-geocoded place names
        #[arg(long, default_value_t = false)]
        describe: bool,
    },
    /// All stored measurements as GeoJSON
    Geojson,
    /// The most recent measurement
    Latest,
    /// Upload summaries and the provider index to S3
    Publish {
        #[command(flatten)]
        filter: FilterArgs,

        /// S3 bucket name to upload aggregated JSON to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: String,

        /// Gzip compress JSON before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/speedgrid.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("speedgrid.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env(cli.config.as_deref())?;
    info!(
        data_dir = %config.data_dir.display(),
        grid_decimals = config.grid_decimals,
        mode = ?config.aggregation_mode,
        "Configuration loaded"
    );

    let store = Arc::new(CsvStore::new(&config.data_dir));
    let table = summary_table(&config, store.as_ref()).await?;

    match cli.command {
        Commands::Ingest { source, client_ip } => {
            let bytes = read_source(&source)?;
            let batch = parse_submissions(&bytes)?;
            info!(submissions = batch.len(), source = %source, "Submissions decoded");

            let normalizer = Normalizer::new(locator(&config)?, config.lookup_timeout());
            let mut ingestor = Ingestor::new(normalizer, store.clone(), config.resolution());
            if let Some(table) = &table {
                ingestor = ingestor.with_summaries(table.clone());
            }

            let report = ingestor.ingest_parsed(batch, client_ip.as_deref()).await?;
            if let Some(table) = &table {
                info!(buckets = table.len(), "Incremental summaries after ingestion");
            }
            print_json(&report)?;
        }
        Commands::Query { filter } => {
            let engine = query_engine(&config, store, table);
            print_json(&engine.query(&filter.spec()?).await?)?;
        }
        Commands::Trends { filter } => {
            let engine = query_engine(&config, store, table);
            print_json(&engine.trends(&filter.spec()?).await?)?;
        }
        Commands::Map { filter, describe } => {
            let engine = query_engine(&config, store, table);
            let spec = filter.spec()?;
            let points = if describe {
                let client = Header::user_agent(BasicClient::new()?, &config.user_agent)?;
                let describer = NominatimDescriber::new(client, config.nominatim_base_url.clone());
                engine.map(&spec, Some(&describer)).await?
            } else {
                engine.map::<dyn Describer>(&spec, None).await?
            };
            print_json(&points)?;
        }
        Commands::Geojson => {
            let engine = query_engine(&config, store, table);
            print_json(&engine.geojson().await?)?;
        }
        Commands::Latest => {
            let engine = query_engine(&config, store, table);
            match engine.latest().await? {
                Some(m) => print_json(&m)?,
                None => info!("No measurements stored yet"),
            }
        }
        Commands::Publish {
            filter,
            s3_bucket,
            gzip,
        } => {
            let spec = filter.spec()?;
            let engine = query_engine(&config, store, table);
            let summaries = engine.query(&spec).await?;

            let selected: Vec<_> = engine
                .summaries()
                .await?
                .into_iter()
                .filter(|s| spec.matches(s))
                .collect();
            let providers: Vec<ProviderTestsView> = provider_rollup(&selected)
                .iter()
                .map(ProviderTestsView::from)
                .collect();

            let aws = aws_config::load_from_env().await;
            let s3 = aws_sdk_s3::Client::new(&aws);
            let keys = publish_summaries(&s3, &s3_bucket, &summaries, providers, gzip).await?;
            print_json(&keys)?;
        }
    }

    Ok(())
}

/// Reads a file, or stdin when `source` is `-`.
fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(source)?)
    }
}

/// Seeds the incremental summary table from the store when that mode is on.
async fn summary_table<S: MeasurementStore>(
    config: &EngineConfig,
    store: &S,
) -> Result<Option<Arc<SummaryTable>>> {
    if config.aggregation_mode != AggregationMode::Incremental {
        return Ok(None);
    }

    let measurements = store.scan_all().await?;
    let set = recompute(&measurements, config.resolution(), chrono::Utc::now());
    info!(
        measurements = measurements.len(),
        buckets = set.len(),
        "Seeded incremental summaries"
    );
    Ok(Some(Arc::new(SummaryTable::from_set(config.resolution(), set))))
}

fn query_engine(
    config: &EngineConfig,
    store: Arc<CsvStore>,
    table: Option<Arc<SummaryTable>>,
) -> QueryEngine<CsvStore> {
    let engine = QueryEngine::new(store, config.resolution());
    match table {
        Some(table) => engine.with_summaries(table),
        None => engine,
    }
}

fn locator(config: &EngineConfig) -> Result<IpApiLocator<Box<dyn HttpClient>>> {
    let basic = BasicClient::with_timeout(config.lookup_timeout())?;
    let client: Box<dyn HttpClient> = match &config.ipapi_key {
        Some(key) => Box::new(UrlParam {
            inner: basic,
            param_name: "key".to_string(),
            key: key.clone(),
        }),
        None => Box::new(basic),
    };
    Ok(IpApiLocator::new(client, config.ipapi_base_url.clone()))
}
