//! `batch-preview` -- run a preview batch for a workflow template.
//!
//! Builds one job per seed (or per sweep combination), dispatches them
//! over the in-process bus to a loopback worker, and writes each returned
//! artifact to the output directory in variation order.
//!
//! Dispatch settings come from `PREVIEW_*` environment variables (see
//! [`DispatchConfig::from_env`]); a `.env` file is loaded if present.

mod loopback;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use previewer_bus::InMemoryBus;
use previewer_core::discovery::discover_override_paths;
use previewer_core::sweep::SweepSpec;
use previewer_core::variation::{parse_seed_list, seed_variations};
use previewer_core::{JobTemplate, OutputSlots, Slot, Variation};
use previewer_dispatch::{DispatchConfig, Dispatcher, ResolverRegistry};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "batch-preview")]
#[command(version)]
#[command(about = "Fan a workflow template out into preview jobs and collect the results.", long_about = None)]
struct Cli {
    /// Workflow template (JSON)
    template: PathBuf,

    /// Where artifacts are written
    #[arg(short, long, default_value = "previews")]
    output_dir: PathBuf,

    /// Also override inputs discovered from the template's node types
    #[arg(long, action)]
    discover: bool,

    #[command(subcommand)]
    variations: Variations,
}

#[derive(Subcommand, Debug)]
enum Variations {
    /// One job per seed
    Seeds {
        /// Comma-separated seeds, e.g. "10, 20, 30"
        #[arg(short, long)]
        seeds: String,

        /// Prompt text applied to every job
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// One job per combination in a sweep file
    Sweep {
        /// Sweep specification (JSON)
        #[arg(short, long)]
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batch_preview=info,previewer_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = DispatchConfig::from_env().context("invalid PREVIEW_* configuration")?;
    let template = JobTemplate::load(&cli.template)
        .with_context(|| format!("failed to load template {}", cli.template.display()))?;
    template.validate_nodes()?;

    if cli.discover {
        config.override_paths.merge(discover_override_paths(&template));
    }

    let variations = build_variations(&cli.variations)?;
    if variations.is_empty() {
        anyhow::bail!("no variations to dispatch");
    }

    let bus = Arc::new(InMemoryBus::default());
    let shutdown = CancellationToken::new();
    let worker = loopback::spawn(
        Arc::clone(&bus),
        &config.job_topic,
        config.result_topic.clone(),
        cli.output_dir.join("jobs"),
        shutdown.clone(),
    )
    .await;

    let dispatcher = Dispatcher::new(bus, Arc::new(ResolverRegistry::with_defaults()), config);
    let slots = dispatcher.dispatch(&template, &variations).await?;

    shutdown.cancel();
    worker.await.context("loopback worker panicked")?;

    write_artifacts(&cli.output_dir, &slots)?;
    tracing::info!(
        output_dir = %cli.output_dir.display(),
        summary = %slots.summary(),
        "Preview batch complete",
    );
    Ok(())
}

fn build_variations(mode: &Variations) -> anyhow::Result<Vec<Variation>> {
    match mode {
        Variations::Seeds { seeds, prompt } => {
            let seeds = parse_seed_list(seeds);
            Ok(seed_variations(&seeds, prompt.as_deref()))
        }
        Variations::Sweep { spec } => {
            let text = std::fs::read_to_string(spec)
                .with_context(|| format!("failed to read sweep {}", spec.display()))?;
            let sweep = SweepSpec::from_json_str(&text)?;
            tracing::info!(variations = sweep.variation_count(), "Expanded sweep");
            Ok(sweep.expand())
        }
    }
}

/// Write ready slots as `<index>-<job_id>.json`; log the missing ones.
fn write_artifacts(output_dir: &Path, slots: &OutputSlots) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    for (index, slot) in slots.iter().enumerate() {
        match slot {
            Slot::Ready(artifact) => {
                let path = output_dir.join(format!("{index:02}-{}.json", artifact.job_id));
                std::fs::write(&path, &artifact.bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!(slot = index, path = %path.display(), "Wrote artifact");
            }
            Slot::Missing { job_id, reason } => {
                tracing::warn!(slot = index, job_id = %job_id, reason = %reason, "Slot missing");
            }
        }
    }
    Ok(())
}
