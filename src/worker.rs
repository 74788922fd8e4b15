//! Out-of-process cache invalidation.
//!
//! Other processes publish a user id on `tasks:invalidate`; the worker drops
//! that user's cached list pages. Inline invalidation in the task service is
//! still the primary path.

use anyhow::Context;
use deadpool_redis::redis;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::tasks::ListCache;

pub const INVALIDATE_CHANNEL: &str = "tasks:invalidate";

pub async fn run(
    redis_url: String,
    cache: ListCache,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url.as_str()).context("open redis client")?;
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .context("connect redis pubsub")?;
    pubsub
        .subscribe(INVALIDATE_CHANNEL)
        .await
        .context("subscribe to invalidation channel")?;
    info!(channel = INVALIDATE_CHANNEL, "cache invalidation worker started");

    let payloads = Box::pin(pubsub.into_on_message().filter_map(|msg| async move {
        match msg.get_payload::<String>() {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(error = %e, "unreadable invalidation payload");
                None
            }
        }
    }));
    consume(payloads, &cache, shutdown).await;
    Ok(())
}

/// Drain invalidation requests until the stream ends or shutdown is
/// signalled. Returns how many requests were applied.
pub async fn consume<S>(
    mut payloads: S,
    cache: &ListCache,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    S: Stream<Item = String> + Unpin,
{
    let mut handled = 0;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("cache invalidation worker stopping");
                break;
            }
            payload = payloads.next() => {
                let Some(payload) = payload else {
                    warn!("invalidation subscription closed");
                    break;
                };
                if handle_payload(cache, &payload).await.is_some() {
                    handled += 1;
                }
            }
        }
    }
    handled
}

/// Invalidate the cache for the user named in `payload`. Anything that is
/// not a user id is ignored so a stray glob can never reach the scan.
pub async fn handle_payload(cache: &ListCache, payload: &str) -> Option<u64> {
    let Ok(user_id) = Uuid::parse_str(payload.trim()) else {
        warn!(payload, "ignoring invalidation request without a user id");
        return None;
    };
    match cache.invalidate(user_id).await {
        Ok(removed) => {
            info!(%user_id, removed, "invalidated task cache on request");
            Some(removed)
        }
        Err(e) => {
            warn!(error = %e, %user_id, "remote invalidation failed");
            None
        }
    }
}
