use std::future::Future;

use codeduel::app::{
    coordinator::RoomCoordinator,
    problem::{self, ProblemProvider, ProviderError},
    redis_client,
    storage::{models::Problem, Store},
    types, utils,
};

/// Serves the built-in problem set; a stand-in until an external provider is
/// wired up.
struct LocalProblemProvider;

impl ProblemProvider for LocalProblemProvider {
    fn fetch_problem(&self) -> impl Future<Output = Result<Problem, ProviderError>> + Send {
        std::future::ready(Ok(problem::fallback_problem()))
    }
}

// Single threaded runtime
#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .init();

    let config =
        utils::read_config::<types::ServerConfig>("config/server.toml", Some("CODEDUEL_SERVER"));

    let redis_client = redis_client::create_redis_client(config.redis.unwrap_or_default()).await?;
    let store = Store::new(redis_client);

    let coordinator = RoomCoordinator::new(
        store,
        LocalProblemProvider,
        config.game.unwrap_or_default(),
    );
    coordinator.resume_pending_matches().await?;

    tracing::info!("room coordinator running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
