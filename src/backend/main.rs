/**
 * docsync Server Entry Point
 *
 * Loads configuration, initializes tracing and serves the sync engine's
 * HTTP and WebSocket routes.
 */

#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let config = docsync::shared::SyncConfig::load()?;

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("Server initialization started");

    let bind_addr = config.server.bind_addr.clone();
    let app = docsync::backend::server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
fn main() {
    eprintln!("Server requires the 'ssr' feature to be enabled.");
    eprintln!("Run with: cargo run --bin docsync-server --features ssr");
    std::process::exit(1);
}
