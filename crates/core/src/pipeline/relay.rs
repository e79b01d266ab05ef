//! Forwards per-job progress notifications into the asset store.

use futures::{FutureExt, StreamExt};
use std::future::Future;
use tracing::debug;

use crate::asset::{AssetId, AssetStore};
use crate::metrics::{PROGRESS_SUBSCRIPTIONS, PROGRESS_UPDATES};
use crate::service::{ProcessingService, ProgressStream, ServiceError};

/// Live subscription to one job's progress.
///
/// Dropping it detaches, so a failed or panicking dispatch cannot leak it.
pub struct ProgressSubscription {
    asset_id: AssetId,
    stream: Option<ProgressStream>,
    applied: usize,
}

impl ProgressSubscription {
    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    /// Ticks that raised the record's progress.
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl std::fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("asset_id", &self.asset_id)
            .field("open", &self.stream.is_some())
            .field("applied", &self.applied)
            .finish()
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        PROGRESS_SUBSCRIPTIONS.dec();
    }
}

/// Applies progress ticks to records while their jobs run.
#[derive(Clone)]
pub struct ProgressRelay {
    store: AssetStore,
}

impl ProgressRelay {
    pub fn new(store: AssetStore) -> Self {
        Self { store }
    }

    /// Subscribes to the progress topic of `asset_id`.
    ///
    /// Must happen before the job is dispatched so no tick is missed.
    pub async fn attach<S>(
        &self,
        service: &S,
        asset_id: AssetId,
    ) -> Result<ProgressSubscription, ServiceError>
    where
        S: ProcessingService + ?Sized,
    {
        let stream = service.subscribe_progress(&asset_id).await?;
        PROGRESS_SUBSCRIPTIONS.inc();
        debug!(asset_id = %asset_id, "Attached progress subscription");

        Ok(ProgressSubscription {
            asset_id,
            stream: Some(stream),
            applied: 0,
        })
    }

    /// Awaits `dispatch` while draining progress on the same task.
    ///
    /// Ticks ready at the same time as the completion are applied first.
    pub async fn drive<F>(&self, subscription: &mut ProgressSubscription, dispatch: F) -> F::Output
    where
        F: Future,
    {
        tokio::pin!(dispatch);
        let asset_id = subscription.asset_id;
        let mut stream = subscription.stream.take();

        let output = loop {
            tokio::select! {
                biased;

                tick = next_tick(&mut stream), if stream.is_some() => match tick {
                    Some(percent) => {
                        if self.forward(&asset_id, percent).await {
                            subscription.applied += 1;
                        }
                    }
                    None => stream = None,
                },
                output = &mut dispatch => break output,
            }
        };

        // Ticks published while the dispatch was finishing
        if let Some(stream) = stream.as_mut() {
            while let Some(Some(percent)) = stream.next().now_or_never() {
                if self.forward(&asset_id, percent).await {
                    subscription.applied += 1;
                }
            }
        }

        output
    }

    /// Ends a subscription once its job has settled.
    pub fn detach(&self, subscription: ProgressSubscription) {
        debug!(
            asset_id = %subscription.asset_id,
            applied = subscription.applied,
            "Detached progress subscription"
        );
        drop(subscription);
    }

    /// Applies one tick. Stale ticks and ticks for removed or settled records
    /// are ignored.
    async fn forward(&self, asset_id: &AssetId, percent: u8) -> bool {
        match self.store.record_progress(asset_id, percent).await {
            Ok(true) => {
                PROGRESS_UPDATES.inc();
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(asset_id = %asset_id, percent, "Ignoring progress tick: {}", e);
                false
            }
        }
    }
}

async fn next_tick(stream: &mut Option<ProgressStream>) -> Option<u8> {
    match stream.as_mut() {
        Some(stream) => stream.next().await,
        None => None,
    }
}
