//! CLI definition and dispatch.

use chrono::{DateTime, DurationRound, NaiveDate, NaiveTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

use crate::adapters::coinbase_adapter::CoinbaseAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::interrupt::install_interrupt_handler;
use crate::adapters::terminal_progress::TerminalProgress;
use crate::domain::cancel::CancelToken;
use crate::domain::candle::Namespace;
use crate::domain::engine::{EngineConfig, RetrievalEngine, RunOutcome, RunSummary};
use crate::domain::error::CandleError;
use crate::domain::progress::ProgressReporter;
use crate::domain::rate_limit::RateLimiter;
use crate::domain::resolution::Resolution;
use crate::domain::settings::{Settings, StorageBackend, StorageSettings};
use crate::domain::time_window::TimeRange;
use crate::ports::candle_port::{CandleSource, ProductSource};
use crate::ports::store_port::CandleStore;

#[derive(Parser, Debug)]
#[command(
    name = "candlescrape",
    about = "Download historical candlestick data from Coinbase"
)]
pub struct Cli {
    /// Log retrieval details to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve candles into the configured store
    Scrape {
        /// Candle resolution: 1m, 5m, 15m, 1hr, 6h or 1d
        #[arg(short, long)]
        granularity: Resolution,
        /// First day to retrieve (YYYY-MM-DD)
        #[arg(short, long, requires = "end")]
        start: Option<NaiveDate>,
        /// Day the retrieval stops at, exclusive (YYYY-MM-DD)
        #[arg(short, long, requires = "start")]
        end: Option<NaiveDate>,
        /// Product id to retrieve; repeatable. Defaults to every tradable product
        #[arg(long = "product")]
        products: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the products available upstream
    Products {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show what is stored for one product and resolution
    Info {
        #[arg(short, long)]
        granularity: Resolution,
        #[arg(long)]
        product: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// What one `scrape` invocation retrieves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapePlan {
    pub products: Vec<String>,
    pub range: TimeRange,
    pub resolution: Resolution,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Scrape {
            granularity,
            start,
            end,
            products,
            config,
        } => run_scrape(granularity, start, end, &products, config.as_ref()),
        Command::Products { config } => run_products(config.as_ref()),
        Command::Info {
            granularity,
            product,
            config,
        } => run_info(granularity, &product, config.as_ref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Settings from `path`, or from `~/.cb-candlesticks.ini` when no path is
/// given. Only the implicit file may be absent.
pub fn load_settings(path: Option<&PathBuf>) -> Result<Settings, CandleError> {
    let config = match path {
        Some(path) => {
            FileConfigAdapter::from_file(path).map_err(|e| CandleError::ConfigParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?
        }
        None => match FileConfigAdapter::user_config_path() {
            Some(path) => FileConfigAdapter::from_file_or_defaults(&path).map_err(|e| {
                CandleError::ConfigParse {
                    file: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?,
            None => FileConfigAdapter::empty(),
        },
    };
    Settings::from_config(&config)
}

/// The range a `scrape` covers. Dates are UTC midnights; with no dates the
/// resolution's default lookback ends at `now`, truncated to the minute.
pub fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    resolution: Resolution,
    now: DateTime<Utc>,
) -> Result<TimeRange, CandleError> {
    match (start, end) {
        (Some(start), Some(end)) => TimeRange::new(midnight(start), midnight(end)),
        (None, None) => {
            let end = now
                .duration_trunc(TimeDelta::minutes(1))
                .map_err(|e| CandleError::InvalidArgument {
                    reason: format!("cannot truncate {now} to the minute: {e}"),
                })?;
            Ok(TimeRange::ending_at(end, resolution.default_lookback()))
        }
        _ => Err(CandleError::InvalidArgument {
            reason: "--start and --end must be given together".to_string(),
        }),
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Products to retrieve: the requested ids in order without repeats, or
/// every product upstream that is open for trading.
pub fn select_products(
    source: &dyn ProductSource,
    requested: &[String],
) -> Result<Vec<String>, CandleError> {
    if !requested.is_empty() {
        let mut selected: Vec<String> = Vec::with_capacity(requested.len());
        for id in requested {
            let id = id.trim();
            if id.is_empty() {
                return Err(CandleError::InvalidArgument {
                    reason: "--product must not be empty".to_string(),
                });
            }
            if !selected.iter().any(|s| s == id) {
                selected.push(id.to_string());
            }
        }
        return Ok(selected);
    }

    let products = source.list_products()?;
    Ok(products
        .into_iter()
        .filter(|p| !p.trading_disabled)
        .map(|p| p.id)
        .collect())
}

/// Run every product of `plan` in order, stopping after the first run that
/// does not complete.
pub fn run_scrape_pipeline(
    source: &dyn CandleSource,
    store: &dyn CandleStore,
    limiter: &RateLimiter,
    cancel: CancelToken,
    engine_config: EngineConfig,
    plan: &ScrapePlan,
    progress: &mut dyn ProgressReporter,
) -> Vec<RunSummary> {
    let engine = RetrievalEngine::new(source, store, limiter, cancel, engine_config);
    let mut summaries = Vec::with_capacity(plan.products.len());

    for product in &plan.products {
        let summary = engine.run(product, plan.range, plan.resolution, progress);
        let completed = summary.is_completed();
        summaries.push(summary);
        if !completed {
            break;
        }
    }
    summaries
}

/// Arguments that restart `summary`'s run where it stopped, followed by
/// the planned products that never ran. Dates are widened to whole days;
/// already stored candles are skipped on rerun.
pub fn resume_hint(summary: &RunSummary, remaining: &[String]) -> String {
    let start = summary.resume_from.date_naive();
    let end = summary.range.end();
    let end_day = if end.time() == NaiveTime::MIN {
        end.date_naive()
    } else {
        end.date_naive().succ_opt().unwrap_or(end.date_naive())
    };

    let mut hint = format!("-g {}", summary.resolution);
    for product in std::iter::once(&summary.product).chain(remaining) {
        hint.push_str(" --product ");
        hint.push_str(product);
    }
    hint.push_str(&format!(
        " --start {} --end {}",
        start.format("%Y-%m-%d"),
        end_day.format("%Y-%m-%d")
    ));
    hint
}

/// Planned products the pipeline stopped before reaching.
pub fn unstarted_products<'a>(plan: &'a ScrapePlan, summaries: &[RunSummary]) -> &'a [String] {
    plan.products.get(summaries.len()..).unwrap_or_default()
}

/// Report the outcome of a scrape and pick the exit status.
pub fn finish_scrape(plan: &ScrapePlan, summaries: &[RunSummary]) -> ExitCode {
    let records: usize = summaries.iter().map(|s| s.records_written).sum();

    let Some(last) = summaries.last() else {
        eprintln!("Nothing to retrieve");
        return ExitCode::SUCCESS;
    };
    let remaining = unstarted_products(plan, summaries);

    match &last.outcome {
        RunOutcome::Completed => {
            eprintln!(
                "Retrieved {} products, {} new records",
                summaries.len(),
                records
            );
            ExitCode::SUCCESS
        }
        RunOutcome::Cancelled => {
            eprintln!(
                "Interrupted during {} after {} new records",
                last.product, records
            );
            eprintln!(
                "resume with: candlescrape scrape {}",
                resume_hint(last, remaining)
            );
            ExitCode::SUCCESS
        }
        RunOutcome::Failed { window, error } => {
            match window {
                Some(window) => eprintln!("error: {} failed in window {window}: {error}", last.product),
                None => eprintln!("error: {} failed: {error}", last.product),
            }
            eprintln!(
                "resume with: candlescrape scrape {}",
                resume_hint(last, remaining)
            );
            error.into()
        }
    }
}

fn run_scrape(
    resolution: Resolution,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    requested: &[String],
    config_path: Option<&PathBuf>,
) -> Result<ExitCode, CandleError> {
    let settings = load_settings(config_path)?;
    let range = resolve_range(start, end, resolution, Utc::now())?;
    let upstream = CoinbaseAdapter::from_settings(&settings.upstream)?;
    let products = select_products(&upstream, requested)?;
    let store = open_store(&settings.storage)?;

    let cancel = CancelToken::new();
    if let Err(e) = install_interrupt_handler(cancel.clone()) {
        warn!(error = %e, "Ctrl-C will not stop the run cleanly");
    }
    let limiter = RateLimiter::per_second(settings.upstream.requests_per_second);

    let plan = ScrapePlan {
        products,
        range,
        resolution,
    };
    eprintln!(
        "Retrieving {} products at {} over {}",
        plan.products.len(),
        plan.resolution,
        plan.range
    );

    let mut progress = TerminalProgress::stderr();
    let summaries = run_scrape_pipeline(
        &upstream,
        store.as_ref(),
        &limiter,
        cancel,
        settings.engine_config(),
        &plan,
        &mut progress,
    );
    Ok(finish_scrape(&plan, &summaries))
}

fn run_products(config_path: Option<&PathBuf>) -> Result<ExitCode, CandleError> {
    let settings = load_settings(config_path)?;
    let upstream = CoinbaseAdapter::from_settings(&settings.upstream)?;
    let products = upstream.list_products()?;

    if products.is_empty() {
        eprintln!("No products found");
    } else {
        for product in &products {
            if product.trading_disabled {
                println!("{} (trading disabled)", product.id);
            } else {
                println!("{}", product.id);
            }
        }
        eprintln!("{} products found", products.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_info(
    resolution: Resolution,
    product: &str,
    config_path: Option<&PathBuf>,
) -> Result<ExitCode, CandleError> {
    let settings = load_settings(config_path)?;
    let store = open_store(&settings.storage)?;
    let namespace = Namespace::new(product, resolution, &settings.storage.collection_suffix);

    match store.namespace_stats(&namespace)? {
        Some((first, last, count)) => println!(
            "{namespace}: {count} records, {} to {}",
            format_timestamp(first),
            format_timestamp(last)
        ),
        None => eprintln!("{namespace}: no data found"),
    }
    Ok(ExitCode::SUCCESS)
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Open the configured store.
pub fn open_store(storage: &StorageSettings) -> Result<Box<dyn CandleStore>, CandleError> {
    match storage.backend {
        StorageBackend::Sqlite => open_sqlite(storage),
        StorageBackend::Postgres => open_postgres(storage),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(storage: &StorageSettings) -> Result<Box<dyn CandleStore>, CandleError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(SqliteAdapter::from_settings(storage)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_storage: &StorageSettings) -> Result<Box<dyn CandleStore>, CandleError> {
    Err(backend_unavailable("sqlite"))
}

#[cfg(feature = "postgres")]
fn open_postgres(storage: &StorageSettings) -> Result<Box<dyn CandleStore>, CandleError> {
    use crate::adapters::postgres_adapter::PostgresAdapter;
    Ok(Box::new(PostgresAdapter::from_settings(storage)?))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_storage: &StorageSettings) -> Result<Box<dyn CandleStore>, CandleError> {
    Err(backend_unavailable("postgres"))
}

#[allow(dead_code)]
fn backend_unavailable(feature: &str) -> CandleError {
    CandleError::ConfigInvalid {
        section: "storage".into(),
        key: "backend".into(),
        reason: format!("candlescrape was built without the `{feature}` feature"),
    }
}
