use anyhow::Context;

use linkpeek_embed::EmbedBinding;
use linkpeek_infra::config::Config;
use linkpeek_infra::shutdown_signal;

use linkpeek_api::app::services::{AppServices, EmbedService, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    linkpeek_observability::init_with_default(&config.log_level);

    let coordinator = config.redis_coordinator(EmbedBinding)?;
    coordinator
        .connect()
        .await
        .context("failed to connect to redis")?;

    let services = AppServices::new(EmbedService::Redis(coordinator), Settings::from_config(&config));
    let app = linkpeek_api::app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", config.port))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.embeds.disconnect().await;
    Ok(())
}
