use clap::Parser;
use flag_stage::{FeatureFlagStage, Forwarder, GatewayError, StageError};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;

mod config;
mod logging;

use config::{Config, ConfigError, MetricsConfig};

const METRICS_PREFIX: &str = "featuregate";

#[derive(Parser)]
#[command(about = "HTTP gateway that injects evaluated feature flags as request headers")]
struct Cli {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_file_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let _sentry_guard = logging::init(config.logging.as_ref());

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "featuregate exited with error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), CliError> {
    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    rt.block_on(serve(config))
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::describe_metrics!(flag_stage::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );

    Ok(())
}

async fn serve(config: Config) -> Result<(), CliError> {
    let forwarder: Forwarder =
        Forwarder::new(config.upstream.clone(), config.upstream_timeout());
    let stage = FeatureFlagStage::connect(&config.stage, forwarder).await?;

    tracing::info!(upstream = %config.upstream, "Starting featuregate");
    shared::http::run_http_service(&config.listener.host, config.listener.port, stage).await?;

    Ok(())
}
