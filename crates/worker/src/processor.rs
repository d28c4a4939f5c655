use tracing::{error, info, warn};

use linkpeek_embed::{EmbedBinding, EmbedJobId};
use linkpeek_events::Notifier;
use linkpeek_infra::{JobCoordinator, RecordStore};

use crate::renderer::PostRenderer;

/// Render one claimed job and publish the result.
///
/// Failures are logged and nothing is written: the job stays `claimed`
/// until its record expires.
pub async fn process<S, N>(coordinator: &JobCoordinator<EmbedBinding, S, N>, renderer: &dyn PostRenderer, id: EmbedJobId)
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
{
    info!(%id, "rendering embed");

    let data = match renderer.render(&id).await {
        Ok(data) => data,
        Err(err) => {
            warn!(%id, error = format!("{err:#}"), "render failed; leaving job claimed");
            return;
        }
    };

    match coordinator.complete_job(&id, &data).await {
        Ok(()) => info!(%id, "embed published"),
        Err(err) => error!(%id, error = %err, "failed to publish embed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use linkpeek_core::JobRecord;
    use linkpeek_embed::{EmbedData, PostMeta, Screenshot};
    use linkpeek_infra::InMemoryCoordinator;

    use super::*;

    struct FixedRenderer;

    #[async_trait]
    impl PostRenderer for FixedRenderer {
        async fn render(&self, id: &EmbedJobId) -> Result<EmbedData> {
            Ok(EmbedData {
                meta: PostMeta {
                    title: id.slug().to_string(),
                    ..PostMeta::default()
                },
                screenshot: Screenshot::from_bytes("image/png", b"png"),
            })
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl PostRenderer for FailingRenderer {
        async fn render(&self, _id: &EmbedJobId) -> Result<EmbedData> {
            anyhow::bail!("post is gone")
        }
    }

    fn id() -> EmbedJobId {
        EmbedJobId::from_url_parts(None, "staff", "1-hello").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn successful_render_completes_the_job() {
        let coordinator = InMemoryCoordinator::in_memory(EmbedBinding);
        coordinator.enqueue_job(&id(), Duration::from_millis(1)).await.unwrap();

        process(&coordinator, &FixedRenderer, id()).await;

        let record = coordinator.inspect(&id()).await.unwrap().unwrap();
        let JobRecord::Complete(data) = record else {
            panic!("expected complete record, got {record:?}");
        };
        assert_eq!(data.meta.title, "1-hello");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_writes_nothing() {
        let coordinator = InMemoryCoordinator::in_memory(EmbedBinding);
        let listener = coordinator
            .listen_for_jobs({
                let coordinator = coordinator.clone();
                move |id| {
                    let coordinator = coordinator.clone();
                    async move { process(&coordinator, &FailingRenderer, id).await }
                }
            })
            .await
            .unwrap();

        let record = coordinator.enqueue_job(&id(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(record.state(), linkpeek_core::JobState::Claimed);

        listener.shutdown().await.unwrap();
        let record = coordinator.inspect(&id()).await.unwrap();
        assert!(matches!(record, Some(JobRecord::Claimed)));
    }
}
