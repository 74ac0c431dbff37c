use anyhow::Result;

use lending_mcp::config::Config;
use lending_mcp::lifecycle::AppContext;
use lending_mcp::mcp::McpServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // stdout carries the protocol, so logs go to stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(?config, "Configuration loaded");

    let app = AppContext::start(config).await?;
    let server = McpServer::new(app.api.clone(), &app.config.user_name);

    tracing::info!("Serving MCP over stdio");
    let result = tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => result,
        _ = shutdown_signal() => Ok(()),
    };

    if let Err(e) = &result {
        tracing::error!("MCP server stopped with error: {:#}", e);
    }

    app.shutdown();
    result
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
