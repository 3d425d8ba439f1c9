use anyhow::Context;
use std::sync::Arc;
use story_context::api::{build_router, AppState};
use story_context::{Config, Narrator, OpenAiClient};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match std::env::var("STORY_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::from_env(),
    }
    .context("Failed to load configuration")?;

    story_context::logging::init(&config.logging)?;

    let client = OpenAiClient::new(&config.completion).context("Failed to build completion client")?;
    if config.completion.resolve_api_key().is_none() {
        tracing::warn!("No API key configured; completion calls will be unauthenticated");
    }

    let narrator = Narrator::new(&config, Arc::new(client))?;
    let state = AppState {
        narrator: Arc::new(narrator),
    };
    let app = build_router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "Story context service listening on {} (model={}, max_context_tokens={})",
        addr, config.completion.model, config.context.max_context_tokens
    );

    axum::serve(listener, app).await?;
    Ok(())
}
