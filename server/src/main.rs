use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use chatdesk_server::chat::retention::RetentionSweeper;
use chatdesk_server::config::{generate_config_template, Config};
use chatdesk_server::ws::ConnectionRegistry;
use chatdesk_server::{auth, db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatdesk_server=info,tower_http=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Chatdesk server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    match &config.chat.support_account {
        Some(email) => tracing::info!(support_account = %email, "User messages routed to configured support account"),
        None => tracing::info!("User messages routed to the oldest admin account"),
    }

    // Retention schedule; stopped through the watch channel on shutdown
    let sweeper = Arc::new(RetentionSweeper::new(db.clone(), &config.retention));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_handle = sweeper.clone().spawn_schedule(shutdown_rx);

    let app_state = state::AppState {
        db,
        jwt_secret,
        connections: Arc::new(ConnectionRegistry::new()),
        chat: Arc::new(config.chat.clone()),
        sweeper,
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep_handle.await {
        tracing::warn!(error = %e, "Retention schedule did not stop cleanly");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
