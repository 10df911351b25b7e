use anyhow::{Context, Result};
use cvmscraper::{FileOutcome, ImportConfig, Pipeline};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = match env::var("CVMSCRAPER_CONFIG") {
        Ok(path) => ImportConfig::from_yaml_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => ImportConfig::default(),
    };
    info!(
        staging = %config.staging_dir.display(),
        store = %config.store_path.display(),
        "configured"
    );

    // ─── 3) run the import ───────────────────────────────────────────
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let report = match pipeline.run().await {
        Ok(r) => r,
        Err(e) => {
            error!("import aborted: {}", e);
            return Err(e.into());
        }
    };
    report.log_summary();

    if report
        .outcomes
        .iter()
        .any(|o| matches!(o.outcome, FileOutcome::Failed(_)))
    {
        info!("some datasets failed; rerun after fixing the source");
    }
    Ok(())
}
