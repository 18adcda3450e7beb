use std::sync::Arc;

use memoh_mcp::{config::Config, domain::builtins::build_registry, logging, serve_stdio, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let registry = Arc::new(build_registry()?);
    let state = AppState::new(
        config.server_name.clone(),
        config.server_version.clone(),
        registry,
    );

    info!(
        server_name = %config.server_name,
        server_version = %config.server_version,
        tools = state.registry.len(),
        max_frame_bytes = config.max_frame_bytes,
        "server starting on stdio"
    );

    let summary = serve_stdio(state, config.max_frame_bytes).await?;

    info!(
        frames_received = summary.frames_received,
        responses_sent = summary.responses_sent,
        "server stopped"
    );
    Ok(())
}
