use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use fbcon_server::config::{Config, StoreBackend};
use fbcon_server::middleware::AuthKeys;
use fbcon_server::payments::{StripeClient, WebhookVerifier};
use fbcon_server::routes::create_routes;
use fbcon_server::services::ExpoPushRelay;
use fbcon_server::state::AppState;
use fbcon_server::store::{IdentityDirectory, InMemoryStore, PgStore, TicketStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let (store, directory): (Arc<dyn TicketStore>, Arc<dyn IdentityDirectory>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .expect("DATABASE_URL must be set");
                let store = PgStore::connect(database_url, config.database_max_connections)
                    .await
                    .expect("Failed to connect to database");
                tracing::info!("Successfully connected to database");

                store.migrate().await.expect("Failed to run migrations");
                tracing::info!("Migrations run successfully");

                let store = Arc::new(store);
                let directory: Arc<dyn IdentityDirectory> = store.clone();
                let store: Arc<dyn TicketStore> = store;
                (store, directory)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; nothing will be persisted");
                let store = Arc::new(InMemoryStore::new());
                let directory: Arc<dyn IdentityDirectory> = store.clone();
                let store: Arc<dyn TicketStore> = store;
                (store, directory)
            }
        };

    let state = AppState::new(
        store,
        directory,
        Arc::new(StripeClient::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        )),
        Arc::new(ExpoPushRelay::new(config.expo_push_url.clone())),
        WebhookVerifier::new(
            config.stripe_webhook_secret.clone(),
            config.signature_tolerance_secs,
        ),
        AuthKeys::new(&config.jwt_secret),
        config.issuance.clone(),
    );

    let app: Router = create_routes(state, config.cors_allowed_origins.as_deref());

    tracing::info!("Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
