use drinks_api::{
    AppState,
    config::{AppConfig, Env, MEMORY_DB_URL},
    create_router,
    keys::{KeyStoreState, RemoteKeyStore},
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects the store and the signing key source,
/// then serves the HTTP API until the process is stopped.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().unwrap_or_else(|e| panic!("FATAL: invalid configuration: {e}"));

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "drinks_api=debug,tower_http=info,axum=trace".into());

    // 3. Log format follows the environment: pretty locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Store Initialization
    let repo: RepositoryState = if config.db_url == MEMORY_DB_URL {
        tracing::warn!("DATABASE_URL=memory: drinks are kept in memory and lost on exit");
        Arc::new(MemoryRepository::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.db_url)
            .await
            .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

        let postgres = PostgresRepository::new(pool);
        postgres
            .migrate()
            .await
            .expect("FATAL: Failed to apply database migrations.");
        Arc::new(postgres)
    };

    if config.reset_db {
        tracing::warn!("DB_RESET is set: dropping all drinks and seeding the menu");
        repo.reset_and_seed()
            .await
            .expect("FATAL: Failed to reset the drinks table.");
    }

    // 5. Signing Keys: fetched lazily from the identity provider and cached.
    let keys = Arc::new(RemoteKeyStore::new(config.auth.jwks_url())) as KeyStoreState;
    tracing::info!(
        issuer = %config.auth.issuer(),
        audience = %config.auth.audience,
        "Verifying bearer tokens"
    );

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState { repo, keys, config };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {bind_addr}: {e}"));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
    }
}
