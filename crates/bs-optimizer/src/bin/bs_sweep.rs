use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use bs_engine::{Backend, CatBoostBackend, LightGbmBackend, XgBoostBackend};
use bs_optimizer::{run_config, SweepConfig};
use bs_types::{BackendKind, Encoding};

/// Grid-search gradient-boosting hyperparameters with time-series CV.
#[derive(Parser, Debug)]
#[command(name = "bs-sweep", version, about, long_about = None)]
struct Cli {
    /// Sweep configuration (JSON)
    config: PathBuf,

    /// Override the configured backend (lightgbm, xgboost, catboost)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Override the configured categorical encoding (factorize, onehot)
    #[arg(short, long)]
    encoding: Option<Encoding>,

    /// Seed for the grid shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate at most this many grid points
    #[arg(long)]
    max_trials: Option<usize>,

    /// Root directory of the result store
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Tag of the results table inside the store
    #[arg(long)]
    tag: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, mut config: SweepConfig) -> SweepConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(max_trials) = self.max_trials {
            config.max_trials = Some(max_trials);
        }
        if let Some(root) = &self.store_root {
            config.store_root = Some(root.clone());
        }
        if let Some(tag) = &self.tag {
            config.result_tag = tag.clone();
        }
        config
    }
}

fn init_tracing(json: bool) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_filter(filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(filter())
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

async fn sweep<B: Backend>(config: &SweepConfig, backend: B) -> anyhow::Result<()> {
    let outcome = run_config(config, &backend)
        .await
        .with_context(|| format!("sweep {} failed", config.name))?;

    println!("{}", outcome.results.leaderboard(config.leaderboard_size));
    let status = &outcome.status;
    let seconds = status
        .duration()
        .map(|d| d.num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();
    match &status.best {
        Some(best) => info!(
            "Sweep {} ({}) finished {} of {} iterations in {:.1}s; best valid_auc_mean {:.5}",
            status.name,
            status.id,
            status.completed,
            status.total,
            seconds,
            best.summary.valid_auc_mean
        ),
        None => info!(
            "Sweep {} ({}) finished {} iterations in {:.1}s without a scored setting",
            status.name, status.id, status.completed, seconds
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = SweepConfig::from_file(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let config = cli.apply(config);

    let program = config.tools.program(config.backend).to_path_buf();
    let work_dir = config.work_dir();
    match config.backend {
        BackendKind::LightGbm => sweep(&config, LightGbmBackend::new(program, work_dir)).await,
        BackendKind::XgBoost => sweep(&config, XgBoostBackend::new(program, work_dir)).await,
        BackendKind::CatBoost => sweep(&config, CatBoostBackend::new(program, work_dir)).await,
    }
}
