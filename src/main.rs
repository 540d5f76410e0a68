use std::sync::Arc;

use dbapi_rust::config;
use dbapi_rust::dispatch::Registry;
use dbapi_rust::modules::example;
use dbapi_rust::server;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, BEARER, etc.
    let _ = dotenvy::dotenv();

    let config = config::config();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    tracing::info!("Starting dbapi in {:?} mode", config.environment);
    if config.bearer.is_empty() {
        tracing::warn!("BEARER is not set; only empty tokens will authenticate");
    }

    // Explicit startup-phase registration; the registry is immutable afterwards
    let registry = Arc::new(
        Registry::builder()
            .module(example::NAME, example::routes(&config.bearer))
            .build(),
    );

    let app = server::app(registry);

    // Allow tests or deployments to override port via env
    let port = std::env::var("DBAPI_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("dbapi server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}
