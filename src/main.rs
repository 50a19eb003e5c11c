use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fourth_and_short::data::{generate_history, save_history_csv, HistoryOptions};
use fourth_and_short::decision::{DecisionEngine, DecisionPolicy};
use fourth_and_short::logging::{setup_logging, LogConfig};
use fourth_and_short::models::{ArtifactStore, EvaluationMetrics, ModelKind};
use fourth_and_short::registry::{ModelRegistry, RegistryConfig};
use fourth_and_short::servers::{DecisionApiConfig, DecisionApiServer};
use fourth_and_short::storage::Ledger;
use fourth_and_short::training::{
    run_training, ActivationStatus, CancellationToken, HistorySource, TrainingConfig,
};

#[derive(Parser, Debug)]
#[command(name = "fourth_and_short", version, about = "Fourth-down decision service")]
struct Cli {
    /// Fallback log level when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write rotating log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve recommendations over HTTP
    Serve(ServeArgs),
    /// Train one model from history and persist the artifact
    Train(TrainArgs),
    /// Write a synthetic history CSV
    GenerateHistory(GenerateArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Directory of model artifacts
    #[arg(long, default_value = "model_artifacts")]
    model_dir: PathBuf,

    /// SQLite ledger of models and requests
    #[arg(long, default_value = "data/ledger.db")]
    ledger: PathBuf,

    /// Disable the request ledger
    #[arg(long, default_value_t = false)]
    no_ledger: bool,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Per-request scoring budget in milliseconds
    #[arg(long, default_value_t = 250)]
    latency_budget_ms: u64,

    /// Largest accepted bulk request
    #[arg(long, default_value_t = 1000)]
    max_bulk_items: usize,

    /// Top probability below which a recommendation is flagged low-confidence
    #[arg(long, default_value_t = 0.5)]
    confidence_floor: f64,

    /// Models older than this many days are flagged stale
    #[arg(long, default_value_t = 30)]
    max_model_age_days: i64,

    /// Previous versions kept per model for rollback
    #[arg(long, default_value_t = 3)]
    history_depth: usize,

    /// Recommendations kept in the response cache (0 disables it)
    #[arg(long, default_value_t = 10_000)]
    cache_capacity: usize,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Historical records (CSV); synthetic history when omitted
    #[arg(long)]
    history: Option<PathBuf>,

    /// Rows of synthetic history
    #[arg(long, default_value_t = 50_000)]
    synthetic_rows: usize,

    /// Seed of the synthetic history
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, value_enum, default_value = "decision-classifier")]
    kind: ModelKind,

    /// JSON training options; overrides --kind and --min-examples
    #[arg(long)]
    options: Option<PathBuf>,

    /// Registry name, defaults to the kind's model name
    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value_t = 200)]
    min_examples: usize,

    #[arg(long, default_value = "model_artifacts")]
    model_dir: PathBuf,

    #[arg(long, default_value = "data/ledger.db")]
    ledger: PathBuf,

    #[arg(long, default_value_t = false)]
    no_ledger: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(short = 'o', long, default_value = "data/history.csv")]
    output: PathBuf,

    #[arg(long, default_value_t = 50_000)]
    rows: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

// ============================================================================
// SERVE
// ============================================================================

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Configuration errors surface before any artifact is read
    let max_model_age = chrono::Duration::try_days(args.max_model_age_days)
        .ok_or("max_model_age_days is out of range")?;
    let policy = DecisionPolicy::new(args.confidence_floor, max_model_age)?;
    let config = DecisionApiConfig {
        host: args.host,
        port: args.port,
        latency_budget: Duration::from_millis(args.latency_budget_ms),
        max_bulk_items: args.max_bulk_items,
        cache_capacity: args.cache_capacity,
        ..DecisionApiConfig::default()
    };
    config.validate()?;

    let store = ArtifactStore::new(&args.model_dir);
    let registry = Arc::new(ModelRegistry::new(RegistryConfig {
        history_depth: args.history_depth,
    }));

    let warmed = registry.sync_from_store(&store)?;
    if warmed.is_empty() {
        log::warn!(
            "⚠️ No usable artifact in {}; serving 503 until a reload",
            args.model_dir.display()
        );
    }
    for artifact in &warmed {
        log::info!("📂 Warm start: {}@{}", artifact.name(), artifact.version());
    }

    let engine = DecisionEngine::try_new(registry, policy)?;

    let mut server = DecisionApiServer::new(config, engine).with_store(store);
    if !args.no_ledger {
        if let Some(parent) = args.ledger.parent() {
            std::fs::create_dir_all(parent)?;
        }
        server = server.with_ledger(Ledger::open(&args.ledger)?);
    }
    server.start().await
}

// ============================================================================
// TRAIN
// ============================================================================

fn training_config(args: &TrainArgs) -> fourth_and_short::Result<TrainingConfig> {
    match &args.options {
        Some(path) => TrainingConfig::from_json_file(path),
        None => {
            let mut builder = TrainingConfig::builder(args.kind).min_examples(args.min_examples);
            if let Some(name) = &args.name {
                builder = builder.model_name(name.clone());
            }
            builder.build()
        }
    }
}

async fn train(args: TrainArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = training_config(&args)?;
    let source = match &args.history {
        Some(path) => HistorySource::Csv(path.clone()),
        None => HistorySource::Synthetic(HistoryOptions {
            rows: args.synthetic_rows,
            seed: args.seed,
            ..HistoryOptions::default()
        }),
    };
    let store = ArtifactStore::new(&args.model_dir);
    let ledger = if args.no_ledger {
        None
    } else {
        if let Some(parent) = args.ledger.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Some(Ledger::open(&args.ledger)?)
    };

    log::info!(
        "🧠 Training {} '{}' ({} epochs, split {})",
        config.model_kind(),
        config.model_name(),
        config.fit_params().epochs,
        config.validation_split()
    );

    let cancel = CancellationToken::new();
    let report = tokio::task::spawn_blocking(move || {
        run_training(&source, config, &store, ledger.as_ref(), &cancel)
    })
    .await??;

    if let Some(artifact) = &report.artifact {
        match artifact.metrics() {
            EvaluationMetrics::Classification(m) => println!(
                "accuracy={:.4} macro_f1={:.4} brier={:.4} log_loss={:.4} calibration_error={:.4} (n={})",
                m.accuracy, m.macro_f1, m.brier, m.log_loss, m.calibration_error, m.examples
            ),
            EvaluationMetrics::Regression(m) => println!(
                "rmse={:.4} mae={:.4} interval_coverage={:.4} (n={})",
                m.rmse, m.mae, m.interval_coverage, m.examples
            ),
        }
        println!("version={} verdict={}", artifact.version(), artifact.verdict().floor);
    }
    if let Some(path) = &report.artifact_path {
        log::info!("💾 Artifact written to {}", path.display());
    }
    println!("status={} examples={}", report.status, report.examples);

    Ok(match report.status {
        ActivationStatus::Accepted => 0,
        _ => 2,
    })
}

// ============================================================================
// GENERATE HISTORY
// ============================================================================

fn generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let records = generate_history(&HistoryOptions {
        rows: args.rows,
        seed: args.seed,
        ..HistoryOptions::default()
    })?;
    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_history_csv(&args.output, &records)?;
    log::info!("📊 {} records written to {}", records.len(), args.output.display());
    Ok(())
}

// ============================================================================
// FONCTION PRINCIPALE
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let _logger = setup_logging(&LogConfig {
        level: cli.log_level.clone(),
        directory: cli.log_dir.clone(),
        ..LogConfig::default()
    })?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Train(args) => {
            let code = train(args).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::GenerateHistory(args) => generate(args),
    }
}
