//! Background tasks spawned by [`App`](super::App).
//!
//! Every task reports back over the event channel and wraps its body in
//! [`catch_task_panic`] so a panic surfaces as [`AppEvent::TaskPanicked`].
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::AppEvent;
use crate::content::{ArticleFetcher, SummaryFetcher};
use crate::util::catch_task_panic;

async fn send(tx: &mpsc::Sender<AppEvent>, event: AppEvent, name: &'static str) {
    if let Err(e) = tx.send(event).await {
        tracing::warn!(error = %e, event = name, "Channel send failed (receiver dropped)");
    }
}

async fn report_panic(tx: &mpsc::Sender<AppEvent>, task: &'static str, error: String) {
    tracing::error!(task, error = %error, "Background task panicked");
    let _ = tx.send(AppEvent::TaskPanicked { task, error }).await;
}

/// Fetch the article body for the card at `generation`.
pub(super) fn spawn_article_load(
    link: String,
    generation: u64,
    fetcher: ArticleFetcher,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = catch_task_panic(async {
            let result = fetcher.fetch(&link).await.map_err(|e| e.to_string());
            if let Err(error) = &result {
                tracing::warn!(link = %link, generation, error = %error, "Article load failed");
            }
            send(
                &tx,
                AppEvent::ArticleLoaded {
                    link: link.clone(),
                    generation,
                    result,
                },
                "ArticleLoaded",
            )
            .await;
        })
        .await;
        if let Err(error) = outcome {
            report_panic(&tx, "article_load", error).await;
        }
    })
}

/// Resolve the summary for the card at `generation`. Never reports an error,
/// only [`SummaryLookup::Unavailable`](crate::content::SummaryLookup::Unavailable).
pub(super) fn spawn_summary_load(
    link: String,
    generation: u64,
    fetcher: SummaryFetcher,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = catch_task_panic(async {
            let lookup = fetcher.get_summary(&link).await;
            send(
                &tx,
                AppEvent::SummaryLoaded {
                    link: link.clone(),
                    generation,
                    lookup,
                },
                "SummaryLoaded",
            )
            .await;
        })
        .await;
        if let Err(error) = outcome {
            report_panic(&tx, "summary_load", error).await;
        }
    })
}

/// Warm the article cache for the card underneath the current one.
pub(super) fn spawn_prefetch(link: String, fetcher: ArticleFetcher) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(error) = catch_task_panic(fetcher.fetch(&link)).await {
            tracing::error!(task = "prefetch", error = %error, "Background task panicked");
        }
    })
}

/// Deliver `event` once `delay` has elapsed (card exit or snap-back).
pub(super) fn spawn_animation_timer(
    delay: Duration,
    event: AppEvent,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        send(&tx, event, "AnimationFinished").await;
    })
}
