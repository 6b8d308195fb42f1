use anyhow::anyhow;
use dashboard::{app, build_app_state, get_config_info, get_log_level, setup_logger};
use log::{error, info};
use std::{net::SocketAddr, str::FromStr};
use tokio::{net::TcpListener, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = get_config_info();
    let log_level = get_log_level(&cli);

    setup_logger()
        .level(log_level)
        .level_for("dashboard", log_level)
        .level_for("http_response", log_level)
        .level_for("http_request", log_level)
        .level_for("aws_config", log::LevelFilter::Warn)
        .level_for("aws_smithy_runtime", log::LevelFilter::Warn)
        .apply()?;

    let socket_addr = SocketAddr::from_str(&format!("{}:{}", cli.host(), cli.port()))
        .map_err(|e| anyhow!("invalid address: {}", e))?;

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| anyhow!("error binding to socket: {}", e))?;

    info!("Air4Thai Dashboard starting...");
    info!("  Listen: http://{}", socket_addr);
    info!("  Dataset: {}", cli.dataset_uri());
    info!("  Year: {}", cli.year());
    info!("  Cache TTL: {} seconds", cli.cache_ttl().as_secs());

    let app_state = build_app_state(&cli).await.map_err(|e| {
        error!("error building app: {}", e);
        e
    })?;

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
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
