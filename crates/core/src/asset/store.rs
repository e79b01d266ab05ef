//! In-memory asset record store.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::error::StoreError;
use super::types::{AssetData, AssetId, AssetRecord, AssetStatus, Locator, PreviewHandle};

/// Change notification published after every store mutation.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A record was created or replaced.
    Upserted(Arc<AssetRecord>),
    /// A single record was removed.
    Removed(AssetId),
    /// Every record was removed.
    Cleared,
}

/// Records created by one placeholder insertion.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderBatch {
    pub created: Vec<Arc<AssetRecord>>,
    /// Locators skipped because they were already tracked or repeated.
    pub skipped: usize,
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub hydrating: usize,
    pub ready: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.hydrating + self.ready + self.processing + self.succeeded + self.failed
    }
}

/// Shared store of asset records, kept in ingestion order.
///
/// All writes go through a single write lock and replace whole records, so a
/// record handed out to a reader never changes underneath it. The handle is
/// cheaply cloneable.
#[derive(Debug, Clone)]
pub struct AssetStore {
    records: Arc<RwLock<Vec<Arc<AssetRecord>>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl AssetStore {
    /// Creates an empty store whose change feed buffers `event_capacity` events.
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    /// Subscribe to the change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// All records in ingestion order.
    pub async fn snapshot(&self) -> Vec<Arc<AssetRecord>> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &AssetId) -> Option<Arc<AssetRecord>> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == *id)
            .cloned()
    }

    /// The record tracking `locator`, if any.
    pub async fn find_by_locator(&self, locator: &Locator) -> Option<Arc<AssetRecord>> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.source_locator == *locator)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Records currently in `status`, in ingestion order.
    pub async fn with_status(&self, status: AssetStatus) -> Vec<Arc<AssetRecord>> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    pub async fn counts(&self) -> StatusCounts {
        let records = self.records.read().await;
        let mut counts = StatusCounts::default();
        for record in records.iter() {
            match record.status {
                AssetStatus::Hydrating => counts.hydrating += 1,
                AssetStatus::Ready => counts.ready += 1,
                AssetStatus::Processing => counts.processing += 1,
                AssetStatus::Succeeded => counts.succeeded += 1,
                AssetStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Holds the read side of the lock, standing in for a slow reader.
    #[cfg(test)]
    pub(crate) async fn hold_read(&self) -> tokio::sync::RwLockReadGuard<'_, Vec<Arc<AssetRecord>>> {
        self.records.read().await
    }

    /// Creates `Hydrating` placeholders for locators not tracked yet.
    ///
    /// Dedup and insertion happen under one write lock, so two concurrent
    /// ingestions of the same locator create at most one record.
    pub async fn insert_placeholders<I>(&self, locators: I) -> PlaceholderBatch
    where
        I: IntoIterator<Item = Locator>,
    {
        let mut records = self.records.write().await;
        let mut seen: HashSet<Locator> = records
            .iter()
            .map(|r| r.source_locator.clone())
            .collect();

        let mut batch = PlaceholderBatch::default();
        for locator in locators {
            if !seen.insert(locator.clone()) {
                debug!(locator = %locator, "Skipping already tracked asset");
                batch.skipped += 1;
                continue;
            }
            let record = Arc::new(AssetRecord::placeholder(locator));
            records.push(Arc::clone(&record));
            self.publish(StoreEvent::Upserted(Arc::clone(&record)));
            batch.created.push(record);
        }
        batch
    }

    /// Replaces a record with the result of `f`.
    ///
    /// This is the single write path for existing records.
    pub async fn update<F>(&self, id: &AssetId, f: F) -> Result<Arc<AssetRecord>, StoreError>
    where
        F: FnOnce(&AssetRecord) -> Result<AssetRecord, StoreError>,
    {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or(StoreError::NotFound(*id))?;

        let next = Arc::new(f(slot.as_ref())?);
        *slot = Arc::clone(&next);
        self.publish(StoreEvent::Upserted(Arc::clone(&next)));
        Ok(next)
    }

    pub async fn mark_ready(
        &self,
        id: &AssetId,
        size_bytes: u64,
        preview: PreviewHandle,
    ) -> Result<Arc<AssetRecord>, StoreError> {
        self.update(id, |r| r.hydrated(size_bytes, preview)).await
    }

    pub async fn mark_hydration_failed(
        &self,
        id: &AssetId,
        message: &str,
    ) -> Result<Arc<AssetRecord>, StoreError> {
        self.update(id, |r| r.hydration_failed(message)).await
    }

    pub async fn begin_processing(&self, id: &AssetId) -> Result<Arc<AssetRecord>, StoreError> {
        self.update(id, |r| r.processing()).await
    }

    /// Applies a progress tick.
    ///
    /// Returns `Ok(false)` when the tick did not raise the current value, in
    /// which case nothing is published.
    pub async fn record_progress(&self, id: &AssetId, percent: u8) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or(StoreError::NotFound(*id))?;

        let next = slot.with_progress(percent)?;
        if next.progress_percent == slot.progress_percent {
            return Ok(false);
        }
        let next = Arc::new(next);
        *slot = Arc::clone(&next);
        self.publish(StoreEvent::Upserted(next));
        Ok(true)
    }

    pub async fn mark_succeeded(
        &self,
        id: &AssetId,
        original_size_bytes: u64,
        result_size_bytes: u64,
        result: AssetData,
    ) -> Result<Arc<AssetRecord>, StoreError> {
        self.update(id, |r| r.succeeded(original_size_bytes, result_size_bytes, result))
            .await
    }

    pub async fn mark_failed(
        &self,
        id: &AssetId,
        message: &str,
    ) -> Result<Arc<AssetRecord>, StoreError> {
        self.update(id, |r| r.processing_failed(message)).await
    }

    /// Removes one record. Returns whether it existed.
    pub async fn remove(&self, id: &AssetId) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != *id);
        let removed = records.len() != before;
        if removed {
            self.publish(StoreEvent::Removed(*id));
        }
        removed
    }

    /// Removes every record. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut records = self.records.write().await;
        let count = records.len();
        records.clear();
        self.publish(StoreEvent::Cleared);
        count
    }
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locators(paths: &[&str]) -> Vec<Locator> {
        paths.iter().map(|p| Locator::from(*p)).collect()
    }

    async fn ready_record(store: &AssetStore, path: &str) -> AssetId {
        let batch = store.insert_placeholders(locators(&[path])).await;
        let id = batch.created[0].id;
        store
            .mark_ready(&id, 100, PreviewHandle::new("data:,"))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_insert_placeholders_dedups() {
        let store = AssetStore::default();

        let first = store.insert_placeholders(locators(&["/a.png", "/b.png"])).await;
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.skipped, 0);

        let second = store
            .insert_placeholders(locators(&["/b.png", "/c.png", "/c.png"]))
            .await;
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_find_by_locator() {
        let store = AssetStore::default();
        let batch = store.insert_placeholders(locators(&["/a.png", "/b.png"])).await;

        let found = store.find_by_locator(&Locator::from("/b.png")).await.unwrap();
        assert_eq!(found.id, batch.created[1].id);
        assert!(store.find_by_locator(&Locator::from("/c.png")).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_keeps_ingestion_order() {
        let store = AssetStore::default();
        store
            .insert_placeholders(locators(&["/z.png", "/a.png", "/m.png"]))
            .await;

        let names: Vec<String> = store
            .snapshot()
            .await
            .iter()
            .map(|r| r.display_name.clone())
            .collect();
        assert_eq!(names, vec!["z.png", "a.png", "m.png"]);
    }

    #[tokio::test]
    async fn test_update_replaces_whole_record() {
        let store = AssetStore::default();
        let batch = store.insert_placeholders(locators(&["/a.png"])).await;
        let before = Arc::clone(&batch.created[0]);

        let after = store
            .mark_ready(&before.id, 42, PreviewHandle::new("data:,"))
            .await
            .unwrap();

        assert_eq!(before.status, AssetStatus::Hydrating);
        assert_eq!(after.status, AssetStatus::Ready);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = AssetStore::default();
        let err = store.begin_processing(&AssetId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_progress_after_completion_is_rejected() {
        let store = AssetStore::default();
        let id = ready_record(&store, "/a.png").await;
        store.begin_processing(&id).await.unwrap();
        assert!(store.record_progress(&id, 50).await.unwrap());

        store
            .mark_succeeded(&id, 100, 10, AssetData::new(vec![0; 10]))
            .await
            .unwrap();

        let stale = store.record_progress(&id, 60).await;
        assert!(matches!(stale, Err(StoreError::InvalidTransition { .. })));

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status, AssetStatus::Succeeded);
        assert_eq!(record.progress_percent, 100);
    }

    #[tokio::test]
    async fn test_lower_progress_is_ignored() {
        let store = AssetStore::default();
        let id = ready_record(&store, "/a.png").await;
        store.begin_processing(&id).await.unwrap();

        assert!(store.record_progress(&id, 70).await.unwrap());
        assert!(!store.record_progress(&id, 20).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().progress_percent, 70);
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let store = AssetStore::default();
        let mut rx = store.subscribe();

        let batch = store.insert_placeholders(locators(&["/a.png"])).await;
        let id = batch.created[0].id;
        store.remove(&id).await;
        store.clear().await;

        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Upserted(r) if r.id == id));
        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Removed(removed) if removed == id));
        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Cleared));
    }

    #[tokio::test]
    async fn test_remove_allows_reingest() {
        let store = AssetStore::default();
        let batch = store.insert_placeholders(locators(&["/a.png"])).await;
        assert!(store.remove(&batch.created[0].id).await);
        assert!(!store.remove(&batch.created[0].id).await);

        let again = store.insert_placeholders(locators(&["/a.png"])).await;
        assert_eq!(again.created.len(), 1);
    }

    #[tokio::test]
    async fn test_counts() {
        let store = AssetStore::default();
        let id = ready_record(&store, "/a.png").await;
        store.insert_placeholders(locators(&["/b.png"])).await;
        store.begin_processing(&id).await.unwrap();
        store.mark_failed(&id, "nope").await.unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.hydrating, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(store.with_status(AssetStatus::Failed).await.len(), 1);
    }
}
