use airq_ingest::config::Config;
use airq_ingest::report::ReportDirectory;
use airq_ingest::{
    is_csv_upload, reader_from_path, Ingestor, MemoryCache, MemoryStore, ReadingStore,
    ReadingsService, UploadService,
};
use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let cmd = Command::new("ingest")
        .about("Ingest an air-quality CSV export and print what was stored")
        .arg(
            Arg::new("path")
                .long("path")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("batch_size")
                .long("batch-size")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("report_dir")
                .long("report-dir")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("parameter")
                .long("parameter")
                .help("Print statistics for this parameter after ingesting"),
        )
        .arg(
            Arg::new("aggregation")
                .long("aggregation")
                .help("hourly, daily or monthly"),
        )
        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue));

    #[cfg(feature = "sqlite")]
    let cmd = cmd.arg(
        Arg::new("database")
            .long("database")
            .help("SQLite URL, e.g. sqlite://readings.db"),
    );

    cmd
}

#[cfg(feature = "sqlite")]
async fn open_store(
    matches: &clap::ArgMatches,
    config: &Config,
) -> anyhow::Result<Arc<dyn ReadingStore>> {
    let url = matches
        .get_one::<String>("database")
        .cloned()
        .or_else(|| config.database_url.clone());
    match url {
        Some(url) => Ok(Arc::new(airq_ingest::store::SqliteStore::connect(&url).await?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(
    _matches: &clap::ArgMatches,
    config: &Config,
) -> anyhow::Result<Arc<dyn ReadingStore>> {
    if config.database_url.is_some() {
        tracing::warn!("database_url is set but this build has no sqlite support");
    }
    Ok(Arc::new(MemoryStore::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let path = matches
        .get_one::<PathBuf>("path")
        .context("--path is required")?;

    let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some(batch_size) = matches.get_one::<usize>("batch_size") {
        config.ingest.batch_size = *batch_size;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("report_dir") {
        config.reports.dir = dir.clone();
    }
    config.validate()?;

    let store = open_store(&matches, &config).await?;
    let ingestor = Ingestor::new(store.clone(), &config.ingest);
    let reports = ReportDirectory::new(&config.reports.dir, config.reports.cleanup_delay());
    let uploads = UploadService::new(ingestor, reports);

    let (reader, meta) = reader_from_path(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    if !is_csv_upload(&meta) {
        bail!("Only CSV files are allowed: {}", meta.file_name);
    }

    let outcome = uploads.upload(reader).await?;
    info!(file = %meta.file_name, "upload processed");

    let json = matches.get_flag("json");
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.message);
        println!(
            "rows: {} total, {} valid, {} invalid",
            outcome.summary.total_rows, outcome.summary.valid_rows, outcome.summary.invalid_rows
        );
        if let Some(report) = &outcome.error_report {
            println!(
                "error report: {}",
                config.reports.dir.join(&report.file_name).display()
            );
        }
    }

    let readings = ReadingsService::new(
        store,
        Arc::new(MemoryCache::new(config.cache.max_entries)),
        config.query.clone(),
    )
    .with_cache_ttl(config.cache.ttl());

    if let Some(parameter) = matches.get_one::<String>("parameter") {
        let aggregation = matches.get_one::<String>("aggregation").map(String::as_str);
        let stats = readings.statistics(parameter, aggregation, None, None).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("{} ({})", stats.parameter, stats.aggregation);
            for b in &stats.buckets {
                println!(
                    "  {}  avg {:.3}  min {:.3}  max {:.3}  n {}",
                    b.bucket, b.avg, b.min, b.max, b.count
                );
            }
        }
    } else {
        let summary = readings.data_summary().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else if let Some(range) = summary.date_range {
            println!(
                "stored: {} readings from {} to {}",
                summary.total_records, range.start, range.end
            );
        }
    }

    Ok(())
}
