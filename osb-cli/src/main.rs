//! The `osb` binary: parse the CLI, build the backend set and run context,
//! drive the controller through every loop of the mode string, then flush
//! the report sinks.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use osb_client::build_backends;
use osb_common::RunConfig;
use osb_core::{RunContext, RunController};

mod cli;
mod output;

use cli::{Args, OutputPaths};

/// Capacity of the per-object audit channel; PUT workers block when the
/// writer falls this far behind.
const AUDIT_CHANNEL_CAPACITY: usize = 1000;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn echo_parameters(config: &RunConfig, outputs: &OutputPaths) {
    info!("Parameters:");
    info!("url={:?}", config.endpoints);
    info!("object_prefix={}", config.object_prefix);
    info!("buckets={:?}", config.buckets);
    info!("region={}", config.region);
    info!("modes={}", config.modes);
    info!("output={:?}", outputs.csv);
    info!("json_output={:?}", outputs.json);
    info!("audit_output={:?}", outputs.audit);
    info!("max_keys={}", config.max_keys);
    info!("object_count={}", config.object_count);
    info!("first_object={}", config.first_object);
    info!("duration={}", config.duration_secs);
    info!("threads={}", config.threads);
    info!("loops={}", config.loops);
    info!("size={}", config.object_max_size);
    info!("min_size={}", config.object_min_size);
    info!("interval={}", config.interval_secs);
    info!("operation_timeout={}", config.op_timeout_ms);
    info!("storage_class={:?}", config.storage_class);
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, outputs) = args.into_config()?;

    info!("osb S3 benchmark v{}", env!("CARGO_PKG_VERSION"));
    echo_parameters(&config, &outputs);

    let backends = build_backends(
        &config.endpoints,
        &config.region,
        &config.access_key,
        &config.secret_key,
    );

    let (audit_tx, audit_rx) = mpsc::channel(AUDIT_CHANNEL_CAPACITY);
    let audit_writer = output::spawn_audit_writer(outputs.audit.clone(), audit_rx);

    let mut controller = RunController::new(Arc::new(RunContext::new(config, backends, audit_tx)));
    let records = controller.run().await?;

    // Dropping the controller drops the last audit sender; the writer then
    // drains what is buffered and exits.
    drop(controller);
    audit_writer.await??;

    if let Some(path) = &outputs.csv {
        output::write_csv(path, &records)?;
    }
    if let Some(path) = &outputs.json {
        output::write_json(path, &records)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}
