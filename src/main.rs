use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use ziwei_lore::chart::BirthInput;
use ziwei_lore::config::Config;
use ziwei_lore::corpus::CorpusStore;
use ziwei_lore::db::Db;
use ziwei_lore::db::models::{Phase, Registry};
use ziwei_lore::engine::{Engine, parse_min_consensus};
use ziwei_lore::fetcher::HttpFetcher;
use ziwei_lore::ingest::{IngestReport, Ingestor, QueueFilter};
use ziwei_lore::mcp::{McpContext, McpServer};
use ziwei_lore::rules::RuleStore;

#[derive(Parser)]
#[command(
    name = "ziwei",
    about = "Zi Wei Dou Shu corpus builder, chart calculator and rule evaluator",
    version
)]
struct Cli {
    /// Path to the JSON config file (default: ziwei.json).
    #[arg(short, long, global = true, default_value = "")]
    config: String,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server over stdio (default).
    Serve,

    /// Walk the source registry and scrape pending sources into the corpus.
    Scrape {
        /// Scrape only this source id, whatever its status.
        #[arg(long)]
        source: Option<String>,

        /// Restrict the queue to one phase.
        #[arg(long, value_enum)]
        phase: Option<Phase>,

        /// Select and log only: no network calls, no writes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Import or export the source registry file.
    Registry {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Import or export the rule store.
    Rules {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Calculate a chart and print it as JSON.
    Chart(BirthArgs),

    /// Calculate a chart and evaluate every stored rule against it.
    Evaluate {
        #[command(flatten)]
        birth: BirthArgs,

        /// Lowest consensus label to keep: consensus | disputed | minority_view.
        #[arg(long)]
        min_consensus: Option<String>,
    },

    /// Keyword search over the rule store.
    Search {
        #[arg(default_value = "")]
        query: String,

        /// Dimension filter, e.g. career or wealth.
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
enum FileAction {
    Import { file: PathBuf },
    Export { file: PathBuf },
}

#[derive(Args)]
struct BirthArgs {
    /// Birth year (lunar unless --calendar gregorian).
    #[arg(long)]
    year: i32,
    #[arg(long)]
    month: u32,
    #[arg(long)]
    day: u32,
    /// Hour branch, e.g. 午
    #[arg(long)]
    hour: String,
    /// Year stem, e.g. 庚
    #[arg(long)]
    stem: String,
    /// Year branch, e.g. 午
    #[arg(long)]
    branch: String,
    /// male | female
    #[arg(long)]
    gender: String,
    /// lunar (default) | gregorian
    #[arg(long)]
    calendar: Option<String>,
    #[arg(long)]
    place: Option<String>,
    #[arg(long)]
    timezone: Option<String>,
}

impl From<BirthArgs> for BirthInput {
    fn from(a: BirthArgs) -> Self {
        BirthInput {
            year: a.year,
            month: a.month,
            day: a.day,
            hour_branch: a.hour,
            year_stem: a.stem,
            year_branch: a.branch,
            gender: a.gender,
            place: a.place,
            timezone: a.timezone,
            calendar: a.calendar,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Scrape {
            source,
            phase,
            dry_run,
        } => {
            let report = scrape(config, QueueFilter { source, phase }, dry_run).await?;
            print_json(&report)
        }
        Commands::Registry { action } => registry(&config, action),
        Commands::Rules { action } => rules(&config, action),
        Commands::Chart(birth) => {
            let engine = open_engine(&config)?;
            let chart = engine.calculate(&birth.into())?;
            print_json(&chart)
        }
        Commands::Evaluate {
            birth,
            min_consensus,
        } => {
            let engine = open_engine(&config)?;
            let min_consensus = parse_min_consensus(min_consensus.as_deref())?;
            let chart = engine.calculate(&birth.into())?;
            let interpretations = engine.evaluate_rules(&chart, min_consensus)?;
            print_json(&interpretations)
        }
        Commands::Search { query, category } => {
            let engine = open_engine(&config)?;
            let hits = engine.search_knowledge(&query, category.as_deref())?;
            print_json(&hits)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Startup helpers ──────────────────────────────────────────────────

/// Rules from the database, seeded from `rules_seed_path` when the table is empty.
fn load_rules(config: &Config, db: &mut Db) -> Result<RuleStore> {
    if db.count_rules()? == 0 {
        if let Some(seed) = &config.rules_seed_path {
            let mut store = RuleStore::new();
            store.import_file(Path::new(seed))?;
            db.save_rules(store.iter())?;
            info!(count = store.len(), "seeded rule table");
            return Ok(store);
        }
        warn!("rule table is empty and no rules_seed_path is configured");
    }
    RuleStore::from_rules(db.load_rules()?).context("stored rules failed validation")
}

fn open_engine(config: &Config) -> Result<Engine> {
    let mut db = Db::open(&config.db_path).context("Failed to open database")?;
    let rules = load_rules(config, &mut db)?;
    Engine::from_config(config, rules)
}

// ── Commands ─────────────────────────────────────────────────────────

async fn serve(config: Config) -> Result<()> {
    let mut db = Db::open(&config.db_path).context("Failed to open database")?;
    let rules = load_rules(&config, &mut db)?;
    let engine = Engine::from_config(&config, rules)?;

    let ctx = McpContext {
        db: Arc::new(TokioMutex::new(db)),
        config: Arc::new(config),
        engine: Arc::new(engine),
    };
    McpServer::new(ctx).start().await
}

async fn scrape(config: Config, filter: QueueFilter, dry_run: bool) -> Result<IngestReport> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current source");
            flag.store(true, Ordering::SeqCst);
        }
    });

    tokio::task::spawn_blocking(move || {
        // A dry run never writes, so it must not create the database either.
        let db = if dry_run {
            Db::open_read_only(&config.db_path).context("Failed to open database")?
        } else {
            Some(Db::open(&config.db_path).context("Failed to open database")?)
        };
        let Some(mut db) = db else {
            warn!(path = %config.db_path, "dry run: database does not exist, queue is empty");
            return Ok(IngestReport {
                dry_run: true,
                ..IngestReport::default()
            });
        };
        let fetcher = HttpFetcher::new(&config.fetch)?;
        let corpus = CorpusStore::new(config.corpus_dir());

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        Ingestor::new(&mut db, &fetcher, &corpus, &config)
            .with_stop_flag(stop)
            .with_progress(bar)
            .run(&filter, dry_run)
    })
    .await
    .context("scrape task panicked")?
}

fn read_registry(path: &Path) -> Result<Registry> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read registry: {}", path.display()))?;
    let registry: Registry = serde_json::from_str(&data)
        .with_context(|| format!("malformed registry: {}", path.display()))?;
    for source in &registry.sources {
        source
            .validate()
            .with_context(|| format!("rejected registry: {}", path.display()))?;
    }
    Ok(registry)
}

fn registry(config: &Config, action: FileAction) -> Result<()> {
    let mut db = Db::open(&config.db_path).context("Failed to open database")?;
    match action {
        FileAction::Import { file } => {
            let registry = read_registry(&file)?;
            let count = db.upsert_sources(&registry.sources)?;
            info!(count, "registry imported");
        }
        FileAction::Export { file } => {
            let registry = db.export_registry()?;
            let json = serde_json::to_string_pretty(&registry)?;
            std::fs::write(&file, json)
                .with_context(|| format!("failed to write registry: {}", file.display()))?;
            info!(count = registry.sources.len(), "registry exported");
        }
    }
    Ok(())
}

fn rules(config: &Config, action: FileAction) -> Result<()> {
    let mut db = Db::open(&config.db_path).context("Failed to open database")?;
    match action {
        FileAction::Import { file } => {
            let mut store = RuleStore::new();
            store.import_file(&file)?;
            db.save_rules(store.iter())?;
        }
        FileAction::Export { file } => {
            let store = RuleStore::from_rules(db.load_rules()?)?;
            store.export_file(&file)?;
        }
    }
    Ok(())
}
