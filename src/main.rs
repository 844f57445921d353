mod db;
mod llm;
mod message;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::hub::{HubConfig, spawn_hub};
use services::persistence::{SweepConfig, spawn_sweep_task};
use services::store::{BoardStore, SqliteBoardStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| db::DEFAULT_DATABASE_URL.into());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");
    let store: Arc<dyn BoardStore> = Arc::new(SqliteBoardStore::new(pool));

    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "ai review enabled");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "ai review disabled");
            None
        }
    };

    let (hub, _hub_task) = spawn_hub(Arc::clone(&store), HubConfig::from_env());
    let _sweep = spawn_sweep_task(Arc::clone(&store), hub.clone(), SweepConfig::from_env());
    let state = state::AppState::new(store, hub, llm);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "huddle listening");
    axum::serve(listener, app).await.expect("server failed");
}
