/// OneBridge daemon - Main entry point
use onebridge_core::bridge::Bridge;
use onebridge_core::console::run_console;
use onebridge_core::control_api::start_control_server;
use onebridge_core::message_store::MessageStore;
use onebridge_core::onebot::OneBotClient;
use onebridge_core::Config;
use std::env;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("error opening log file {}: {}", path.display(), e))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    init_tracing(&config)?;

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", config.data_dir.display(), e))?;
    let store = MessageStore::open(&config.message_db_path())
        .map_err(|e| anyhow::anyhow!("Failed to init db: {}", e))?;

    let (client, events) = OneBotClient::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))?;

    info!("🚀 Starting OneBridge");
    info!("   Backend: {}", config.ws_url);
    info!("   Control: http://127.0.0.1:{}", config.control_port);

    let (bridge, presentation) = Bridge::start(client.clone(), events, Arc::new(store), &config);

    // Populate caches in the background
    {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.populate_caches().await {
                error!("Cache population abandoned: {}", e);
            }
        });
    }

    {
        let bridge = bridge.clone();
        let port = config.control_port;
        tokio::spawn(async move {
            if let Err(e) = start_control_server(bridge, port).await {
                error!("Control server failed: {}", e);
            }
        });
    }

    if config.console {
        tokio::select! {
            _ = run_console(bridge, presentation) => {},
            _ = wait_for_shutdown() => {},
        }
    } else {
        drop(presentation);
        tokio::select! {
            _ = client.wait_stopped() => warn!("Backend connection lost"),
            _ = wait_for_shutdown() => {},
        }
    }

    if let Err(e) = client.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    info!("OneBridge stopped");
    Ok(())
}
