use std::sync::Arc;

use anyhow::Context;

use linkpeek_embed::EmbedBinding;
use linkpeek_infra::config::Config;
use linkpeek_infra::shutdown_signal;
use linkpeek_worker::{HttpPostRenderer, PostRenderer, process};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    linkpeek_observability::init_with_default(&config.log_level);

    let renderer: Arc<dyn PostRenderer> = Arc::new(HttpPostRenderer::new()?);
    let coordinator = config.redis_coordinator(EmbedBinding)?;

    coordinator
        .run_connected(|coordinator| async move {
            let handler_coordinator = coordinator.clone();
            let listener = coordinator
                .listen_for_jobs(move |id| {
                    let coordinator = handler_coordinator.clone();
                    let renderer = Arc::clone(&renderer);
                    async move { process(&coordinator, renderer.as_ref(), id).await }
                })
                .await?;

            tracing::info!("worker started");
            listener.run_until(shutdown_signal()).await
        })
        .await
        .context("worker stopped")?;

    tracing::info!("worker stopped");
    Ok(())
}
