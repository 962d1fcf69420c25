use clap::Parser;
use extension::{ConfigError, ExtensionConfig, TelemetryServer};
use stats::{run_flusher, BufferedStatser, HeartBeater, LogSink, Tags};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "extension")]
#[command(about = "Sandbox extension: lifecycle telemetry listener and metrics heartbeat")]
struct Cli {
    /// TOML config file; flags and environment variables override it
    #[arg(short, long, env = "EXTENSION_CONFIG")]
    config: Option<PathBuf>,
    /// host:port for the telemetry listener
    #[arg(long, env = "EXTENSION_LISTEN_ADDR")]
    listen_addr: Option<String>,
    /// Seconds between metric flushes
    #[arg(long, env = "EXTENSION_FLUSH_INTERVAL_SECS")]
    flush_interval_secs: Option<u64>,
    /// Name of the heartbeat gauge
    #[arg(long, env = "EXTENSION_HEARTBEAT_METRIC")]
    heartbeat_metric: Option<String>,
    /// Heartbeat tag as key:value (repeatable)
    #[arg(long = "tag", env = "EXTENSION_HEARTBEAT_TAGS", value_delimiter = ',')]
    tags: Vec<String>,
    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "EXTENSION_LOG_LEVEL")]
    log_level: Option<String>,
    /// Print the telemetry endpoint and exit
    #[arg(long)]
    print_endpoint: bool,
}

fn resolve_config(cli: &Cli) -> Result<ExtensionConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ExtensionConfig::from_file(path)?,
        None => ExtensionConfig::default(),
    };

    if let Some(addr) = &cli.listen_addr {
        config.listen_addr = Some(addr.clone());
    }
    if let Some(secs) = cli.flush_interval_secs {
        config.flush_interval_secs = secs;
    }
    if let Some(metric) = &cli.heartbeat_metric {
        config.heartbeat_metric = metric.clone();
    }
    if !cli.tags.is_empty() {
        config.heartbeat_tags = cli.tags.iter().map(|tag| Tags::parse_pair(tag)).collect();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = token.cancelled() => return,
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = token.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
            _ = token.cancelled() => return,
        }
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let token = CancellationToken::new();

    // The end of an invocation shuts every loop down.
    let done = token.clone();
    let server = TelemetryServer::new(
        info_span!("telemetry"),
        move || done.cancel(),
        config.server_config(),
    );

    if cli.print_endpoint {
        println!("{}", server.endpoint());
        return Ok(());
    }

    let statser = Arc::new(BufferedStatser::new(Arc::new(LogSink::new())));
    let heartbeat = HeartBeater::new(
        config.heartbeat_metric.clone(),
        config.heartbeat_tags.clone(),
    )?;

    info!(
        endpoint = %server.endpoint(),
        flush_interval = ?config.flush_interval(),
        heartbeat = %config.heartbeat_metric,
        "Extension starting"
    );

    let server_task = tokio::spawn({
        let token = token.clone();
        async move { server.start(token).await }
    });
    let flusher_task = tokio::spawn(run_flusher(
        statser.clone(),
        config.flush_interval(),
        token.clone(),
    ));
    let heartbeat_task = tokio::spawn(heartbeat.run(statser.clone(), token.clone()));
    tokio::spawn(cancel_on_signal(token.clone()));

    let server_result = server_task.await?;
    if let Err(e) = &server_result {
        error!(error = %e, "Telemetry listener failed");
    }
    token.cancel();

    heartbeat_task.await?;
    flusher_task.await?;
    info!("Extension stopped");

    server_result?;
    Ok(())
}
