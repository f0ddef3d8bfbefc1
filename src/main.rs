use secretlink::{
    clock::SystemClock,
    config::AppConfig,
    crypto::TokenCipher,
    db,
    secrets::SecretService,
    web,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // `secretlink keygen` prints a fresh token key and exits
    if std::env::args().nth(1).as_deref() == Some("keygen") {
        println!("{}", TokenCipher::generate_key());
        return Ok(());
    }

    // Initialize logging first
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secretlink=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SecretLink v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    if config.crypto.token_key.is_empty() {
        error!("Token key not configured!");
        error!("Generate one with: secretlink keygen");
        error!("Then set crypto.token_key in config/local.toml or SECRETLINK_CRYPTO__TOKEN_KEY env var");
        return Err(anyhow::anyhow!("Token key not configured"));
    }

    // Initialize database
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;
    info!("Database connected: {}", config.database.url);

    // Run migrations
    db::init_db(&pool).await?;

    let service = SecretService::from_config(pool, &config, Arc::new(SystemClock))
        .map_err(|e| anyhow::anyhow!("Failed to initialize secret service: {}", e))?;

    let web_state = web::AppState {
        service,
        web: Arc::new(config.web.clone()),
    };
    let app = web::create_router(web_state);

    let web_addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = TcpListener::bind(&web_addr).await?;
    info!("Web server listening on http://{}", web_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Web server error: {}", e);
        return Err(e.into());
    }

    info!("Shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
