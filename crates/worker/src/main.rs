use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finadvice_core::training::{train_snapshot, TrainingConfig};

mod ingest;

#[derive(Debug, Parser)]
#[command(name = "finadvice_worker")]
struct Args {
    /// Profile records: a JSON array or JSON lines.
    #[arg(long)]
    profiles: PathBuf,

    /// Snapshot destination. Defaults to SNAPSHOT_PATH, then snapshot.json.
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    k_min: Option<usize>,

    #[arg(long)]
    k_max: Option<usize>,

    #[arg(long)]
    latent_dim: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Top content products recorded per user for the collaborative model (0 disables it).
    #[arg(long)]
    interactions_per_user: Option<usize>,

    /// Reject categories unseen during fitting instead of mapping them to the unknown code.
    #[arg(long)]
    strict: bool,

    /// Train and report without writing the snapshot.
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn training_config(&self) -> TrainingConfig {
        let mut out = TrainingConfig::default();
        if let Some(k) = self.k_min {
            out.k_min = k;
        }
        if let Some(k) = self.k_max {
            out.k_max = k;
        }
        if let Some(d) = self.latent_dim {
            out.latent_dim = d;
        }
        if let Some(s) = self.seed {
            out.seed = s;
        }
        if let Some(n) = self.interactions_per_user {
            out.interactions_per_user = n;
        }
        out.strict_encoding = self.strict;
        out
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finadvice_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(settings.snapshot_path_or_default()));

    if let Err(err) = run(&args, &out) {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "training run failed");
        return Err(err);
    }
    Ok(())
}

fn run(args: &Args, out: &Path) -> anyhow::Result<()> {
    let records = ingest::load_profile_records(&args.profiles)?;
    let config = args.training_config();

    let outcome = train_snapshot(&records, &config).context("training failed")?;
    let report = &outcome.report;
    let meta = &outcome.snapshot.meta;

    if args.dry_run {
        tracing::info!(
            version = %meta.version,
            dry_run = true,
            profiles_used = report.profiles_used,
            profiles_skipped = report.skipped.len(),
            k = report.cluster_count,
            silhouette = report.silhouette,
            reconstruction_error = ?report.reconstruction_error,
            "training summary (dry-run)"
        );
        return Ok(());
    }

    let blob = outcome.snapshot.to_bytes()?;
    write_atomically(out, &blob)?;

    tracing::info!(
        version = %meta.version,
        trained_at = %meta.trained_at,
        path = %out.display(),
        bytes = blob.len(),
        "snapshot written"
    );
    Ok(())
}

/// Writes to a sibling temp file and renames it over `path`, so a reader never sees a
/// half-written snapshot.
fn write_atomically(path: &Path, blob: &[u8]) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, blob).with_context(|| format!("write {} failed", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {} failed", tmp.display(), path.display()))?;
    Ok(())
}

fn init_sentry(settings: &finadvice_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
