mod output;
mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Context;
use beacon_core::config::Config;
use beacon_core::ids::ErrorHash;
use beacon_core::model::analytics::RawEventKind;
use beacon_core::query::RollupReport;
use beacon_core::time::{date_bucket, now_ms, parse_date_or_relative, parse_duration_str};
use beacon_ingest::otlp::decode::{decode_metrics, decode_traces};
use beacon_ingest::otlp::payload::{decode_metrics_body, decode_traces_body};
use beacon_ingest::pipeline::{Pipeline, PipelineConfig, WriteStats};
use beacon_store::{Store, StoreOptions};
use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::output::{
    print_breakdown_human, print_daily_stats_human, print_dashboard_human, print_error_human,
    print_errors_human, print_events_human, print_ingest_human, print_rollup_human,
    print_service_dashboard_human, print_services_human, print_spans_human, print_status_human,
    print_totals_human,
};
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(about = "Telemetry aggregation store: rollups, dashboards and OTLP file ingest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the rollup and expiry scheduler until ctrl-c")]
    Run {
        #[arg(long, help = "Rollup interval, e.g. 1h")]
        interval: Option<String>,
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    #[command(about = "Fold raw events past the retention window into daily stats")]
    Rollup {
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    #[command(about = "List known services, most recently active first")]
    Services,
    #[command(about = "Per-service counter series and recent errors")]
    Dashboard {
        #[arg(long)]
        days: Option<u64>,
        #[arg(long)]
        service: Option<String>,
    },
    #[command(about = "Most recent distinct errors of a service")]
    Errors {
        service: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Show one deduplicated error")]
    Error { service: String, hash: String },
    #[command(about = "Most recent spans of a service")]
    Spans {
        service: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    #[command(about = "Daily counter totals")]
    Totals {
        service: String,
        counter: String,
        #[arg(long, help = "YYYY-MM-DD or a duration back from today, e.g. 7d")]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, help = "Split each day by dimension")]
        by_dimension: bool,
    },
    #[command(about = "Stored daily rollups of a domain, newest first")]
    Stats {
        domain: String,
        #[arg(long, default_value_t = 30)]
        days: usize,
        #[arg(long, help = "Aggregate one day from raw events instead")]
        live: Option<String>,
    },
    #[command(about = "Raw analytics events not yet rolled up")]
    Events {
        domain: String,
        #[arg(long, default_value = "browser")]
        kind: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    #[command(about = "Ingest an OTLP protobuf trace export from a file")]
    IngestTraces {
        file: PathBuf,
        #[arg(long)]
        gzip: bool,
    },
    #[command(about = "Ingest an OTLP protobuf metrics export from a file")]
    IngestMetrics {
        file: PathBuf,
        #[arg(long)]
        gzip: bool,
    },
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.db_path.clone())?;

    if let Commands::Run { interval, domains } = cli.command {
        init_run_tracing();
        let res = run_scheduler(cfg, interval, domains).await;
        shutdown_tracing();
        return res;
    }

    init_cli_tracing();
    let store = open_store(&cfg)?;
    let res = run_command(&store, &cfg, cli.command, cli.json).await;
    store.close().context("close store")?;
    res
}

async fn run_command(
    store: &Store,
    cfg: &Config,
    command: Commands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { .. } => unreachable!("handled before the store is opened"),
        Commands::Rollup { domains } => {
            let domains = rollup_domains(domains, cfg)?;
            let reports = run_rollup_pass(store, &domains);
            emit(&reports, json, |v| print_rollup_human(v))?;
            if reports.iter().any(|r| !r.is_clean()) {
                anyhow::bail!("rollup did not complete for every domain");
            }
            Ok(())
        }
        Commands::Services => emit(&store.list_services()?, json, |v| print_services_human(v)),
        Commands::Dashboard { days, service } => {
            let days = days.unwrap_or(cfg.dashboard_days);
            match service {
                Some(name) => {
                    let dashboard = store
                        .get_service_dashboard(&name, days)?
                        .with_context(|| format!("unknown service {name}"))?;
                    emit(&dashboard, json, print_service_dashboard_human)
                }
                None => emit(&store.get_dashboard_data(days)?, json, print_dashboard_human),
            }
        }
        Commands::Errors { service, limit } => emit(
            &store.get_recent_errors(&service, limit)?,
            json,
            |v| print_errors_human(v),
        ),
        Commands::Error { service, hash } => {
            let hash = ErrorHash::parse(&hash)?;
            let record = store
                .get_error(&service, &hash)?
                .with_context(|| format!("no error {hash} recorded for {service}"))?;
            emit(&record, json, print_error_human)
        }
        Commands::Spans { service, limit } => emit(
            &store.get_recent_spans(&service, limit)?,
            json,
            |v| print_spans_human(v),
        ),
        Commands::Totals {
            service,
            counter,
            since,
            until,
            by_dimension,
        } => {
            let today = date_bucket(now_ms());
            let (start, end) = resolve_range(since, until, cfg.dashboard_days, today)?;
            if by_dimension {
                let breakdown = store.get_counter_breakdown(&service, &counter, start, end)?;
                emit(&breakdown, json, print_breakdown_human)
            } else {
                let series = store.get_totals_by_date_range(&service, &counter, start, end)?;
                emit(&series, json, |v| print_totals_human(v))
            }
        }
        Commands::Stats { domain, days, live } => {
            if let Some(day) = live {
                let date = parse_date_or_relative(&day, date_bucket(now_ms()))?;
                let stats = store.compute_live_daily_stats(&domain, date)?;
                emit(&vec![stats], json, |v| print_daily_stats_human(v))
            } else {
                let stats = store.get_daily_stats_range(&domain, days)?;
                emit(&stats, json, |v| print_daily_stats_human(v))
            }
        }
        Commands::Events {
            domain,
            kind,
            limit,
        } => {
            let kind = kind.parse::<RawEventKind>()?;
            emit(
                &store.get_recent_events(&domain, kind, limit)?,
                json,
                |v| print_events_human(v),
            )
        }
        Commands::IngestTraces { file, gzip } => {
            let body = read_payload(&file).await?;
            let req = decode_traces_body(&body, gzip)?;
            let spans = decode_traces(&req);
            let stats = ingest(store, cfg, |pipeline| async move {
                pipeline.submit_spans(spans).await;
            })
            .await;
            emit(&stats, json, print_ingest_human)
        }
        Commands::IngestMetrics { file, gzip } => {
            let body = read_payload(&file).await?;
            let req = decode_metrics_body(&body, gzip)?;
            let counters = decode_metrics(&req);
            let stats = ingest(store, cfg, |pipeline| async move {
                pipeline.submit_counters(counters).await;
            })
            .await;
            emit(&stats, json, print_ingest_human)
        }
        Commands::Status => emit(&store.status()?, json, print_status_human),
    }
}

async fn run_scheduler(
    mut cfg: Config,
    interval: Option<String>,
    domains: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(v) = interval {
        cfg.rollup_interval = parse_duration_str(&v)?;
    }
    let domains = rollup_domains(domains, &cfg)?;
    let store = open_store(&cfg)?;

    eprintln!("beacon run");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  domains: {}", domains.join(","));
    eprintln!(
        "  every: {}",
        humantime::format_duration(cfg.rollup_interval)
    );

    let mut ticker = tokio::time::interval(cfg.rollup_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_rollup_pass(&store, &domains);
                if let Err(err) = store.purge_expired() {
                    tracing::warn!(error = %err, "expiry sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
        }
    }

    store.close().context("close store")?;
    Ok(())
}

/// One sequential pass; domains never roll up concurrently.
fn run_rollup_pass(store: &Store, domains: &[String]) -> Vec<RollupReport> {
    let mut reports = Vec::with_capacity(domains.len());
    for domain in domains {
        match store.aggregate_and_cleanup(domain) {
            Ok(report) => {
                if !report.is_clean() {
                    tracing::warn!(domain = %domain, failed = report.failed_dates.len(), "rollup incomplete");
                }
                reports.push(report);
            }
            Err(err) => {
                tracing::warn!(domain = %domain, error = %err, "rollup failed");
                reports.push(RollupReport::failed(domain, err));
            }
        }
    }
    reports
}

async fn ingest<F, Fut>(store: &Store, cfg: &Config, submit: F) -> WriteStats
where
    F: FnOnce(Pipeline) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (pipeline, workers) = Pipeline::new(store.clone(), PipelineConfig::from(cfg));
    submit(pipeline).await;
    workers.join().await
}

fn load_config(db_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = db_path {
        cfg.db_path = v;
    }
    Ok(cfg)
}

fn open_store(cfg: &Config) -> anyhow::Result<Store> {
    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("open store at {}", cfg.db_path.display()))?;
    Ok(store.with_options(StoreOptions::from(cfg)))
}

fn rollup_domains(cli: Vec<String>, cfg: &Config) -> anyhow::Result<Vec<String>> {
    let domains = if cli.is_empty() {
        cfg.rollup_domains.clone()
    } else {
        cli
    };
    if domains.is_empty() {
        anyhow::bail!("no domains to roll up: pass --domain or set BEACON_ROLLUP_DOMAINS");
    }
    Ok(domains)
}

/// Defaults to the last `default_days` days ending today.
fn resolve_range(
    since: Option<String>,
    until: Option<String>,
    default_days: u64,
    today: NaiveDate,
) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let end = match until {
        Some(v) => parse_date_or_relative(&v, today)?,
        None => today,
    };
    let start = match since {
        Some(v) => parse_date_or_relative(&v, today)?,
        None => end
            .checked_sub_days(Days::new(default_days))
            .unwrap_or(NaiveDate::MIN),
    };
    Ok((start, end))
}

async fn read_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))
}

fn emit<T: Serialize>(value: &T, json: bool, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}
