use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil_server::{create_router, AppConfig, Services};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run a single evaluation cycle and exit
    #[arg(long)]
    once: bool,

    /// Run the evaluator loop without the admin API
    #[arg(long)]
    no_api: bool,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    init_tracing(&config.logging.level);

    info!("Starting VIGIL with config: {}", args.config.display());

    let services = Services::build(&config).await?;

    if args.once {
        let report = services.runner.run_cycle().await?;
        info!(
            machines = report.machines,
            succeeded = report.succeeded,
            failed = report.failed,
            notified = report.notified,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Single cycle finished"
        );
        return Ok(());
    }

    let handle = services.runner.clone().start();

    if args.no_api {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    } else {
        let app = create_router(services.state());
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Admin API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down");
            })
            .await?;
    }

    handle.shutdown().await;
    info!("VIGIL stopped");
    Ok(())
}
