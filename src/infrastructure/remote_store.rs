use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub data: serde_json::Value,
}

/// Live feed of full collection snapshots. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<Vec<RemoteDocument>>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(
        snapshots: mpsc::UnboundedReceiver<Vec<RemoteDocument>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { snapshots, cancel }
    }

    /// Next snapshot, or `None` once the feed is closed or unsubscribed.
    pub async fn next_snapshot(&mut self) -> Option<Vec<RemoteDocument>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            snapshot = self.snapshots.recv() => snapshot,
        }
    }

    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Realtime document collection service.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// Fails when the service cannot be reached.
    async fn connect(&self) -> Result<(), InfraError>;

    async fn add_document(
        &self,
        collection: &str,
        document_id: &str,
        data: serde_json::Value,
    ) -> Result<(), InfraError>;

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        patch: serde_json::Value,
    ) -> Result<(), InfraError>;

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<(), InfraError>;

    /// The first snapshot carries the current collection contents.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, InfraError>;
}

type Subscriber = (String, mpsc::UnboundedSender<Vec<RemoteDocument>>);

/// Process-local document store that pushes a snapshot after every write.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    documents: Mutex<Vec<(String, RemoteDocument)>>,
    subscribers: Mutex<Vec<Subscriber>>,
    available: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl InMemoryDocumentStore {
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn documents(&self, collection: &str) -> Result<Vec<RemoteDocument>, InfraError> {
        let documents = self.lock_documents()?;
        Ok(documents
            .iter()
            .filter(|(owner, _)| owner == collection)
            .map(|(_, document)| document.clone())
            .collect())
    }

    /// Pushes the current contents again, as a realtime service may do.
    pub fn redeliver(&self, collection: &str) -> Result<(), InfraError> {
        self.broadcast(collection)
    }

    /// Subscribers on `collection` whose receiving end is still alive.
    pub fn live_subscribers(&self, collection: &str) -> Result<usize, InfraError> {
        let subscribers = self
            .subscribers
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("subscriber lock poisoned: {error}")))?;
        Ok(subscribers
            .iter()
            .filter(|(owner, sender)| owner == collection && !sender.is_closed())
            .count())
    }

    fn lock_documents(&self) -> Result<std::sync::MutexGuard<'_, Vec<(String, RemoteDocument)>>, InfraError> {
        self.documents
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("document store lock poisoned: {error}")))
    }

    fn ensure_writable(&self, operation: &str) -> Result<(), InfraError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(InfraError::RemoteOperationFailed(format!(
                "{operation}: document store unavailable"
            )));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(InfraError::RemoteOperationFailed(format!(
                "{operation}: write rejected"
            )));
        }
        Ok(())
    }

    fn broadcast(&self, collection: &str) -> Result<(), InfraError> {
        let snapshot = self.documents(collection)?;
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("subscriber lock poisoned: {error}")))?;
        subscribers.retain(|(owner, sender)| {
            if owner != collection {
                return !sender.is_closed();
            }
            sender.send(snapshot.clone()).is_ok()
        });
        Ok(())
    }
}

#[async_trait]
impl RemoteDocumentStore for InMemoryDocumentStore {
    async fn connect(&self) -> Result<(), InfraError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(InfraError::BackendUnavailable(
                "in-memory document store is offline".to_string(),
            ))
        }
    }

    async fn add_document(
        &self,
        collection: &str,
        document_id: &str,
        data: serde_json::Value,
    ) -> Result<(), InfraError> {
        self.ensure_writable("add_document")?;
        {
            let mut documents = self.lock_documents()?;
            let document = RemoteDocument {
                id: document_id.to_string(),
                data,
            };
            match documents
                .iter_mut()
                .find(|(owner, existing)| owner == collection && existing.id == document_id)
            {
                Some((_, existing)) => *existing = document,
                None => documents.push((collection.to_string(), document)),
            }
        }
        self.broadcast(collection)
    }

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        patch: serde_json::Value,
    ) -> Result<(), InfraError> {
        self.ensure_writable("update_document")?;
        {
            let mut documents = self.lock_documents()?;
            let Some((_, existing)) = documents
                .iter_mut()
                .find(|(owner, existing)| owner == collection && existing.id == document_id)
            else {
                return Err(InfraError::RemoteOperationFailed(format!(
                    "update_document: no document {document_id} in {collection}"
                )));
            };
            if let (Some(target), Some(fields)) = (existing.data.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        self.broadcast(collection)
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<(), InfraError> {
        self.ensure_writable("delete_document")?;
        {
            let mut documents = self.lock_documents()?;
            documents.retain(|(owner, existing)| !(owner == collection && existing.id == document_id));
        }
        self.broadcast(collection)
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, InfraError> {
        self.connect().await?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let initial = self.documents(collection)?;
        let _ = sender.send(initial);
        self.subscribers
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("subscriber lock poisoned: {error}")))?
            .push((collection.to_string(), sender));
        Ok(Subscription::new(receiver, CancellationToken::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscription_receives_initial_and_pushed_snapshots() {
        let store = InMemoryDocumentStore::default();
        store
            .add_document("containers", "a", json!({ "title": "A" }))
            .await
            .expect("seed");

        let mut subscription = store.subscribe("containers").await.expect("subscribe");
        let initial = subscription.next_snapshot().await.expect("initial snapshot");
        assert_eq!(initial.len(), 1);

        store
            .update_document("containers", "a", json!({ "title": "A2" }))
            .await
            .expect("update");
        let pushed = subscription.next_snapshot().await.expect("pushed snapshot");
        assert_eq!(pushed[0].data["title"], "A2");
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_feed() {
        let store = InMemoryDocumentStore::default();
        let mut subscription = store.subscribe("containers").await.expect("subscribe");
        let _ = subscription.next_snapshot().await;
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert!(subscription.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_is_no_longer_live() {
        let store = InMemoryDocumentStore::default();
        let subscription = store.subscribe("containers").await.expect("subscribe");
        assert_eq!(store.live_subscribers("containers").expect("count"), 1);
        assert_eq!(store.live_subscribers("archive").expect("count"), 0);

        drop(subscription);
        assert_eq!(store.live_subscribers("containers").expect("count"), 0);
    }

    #[tokio::test]
    async fn offline_store_refuses_connect_and_writes() {
        let store = InMemoryDocumentStore::unavailable();
        assert!(matches!(
            store.connect().await,
            Err(InfraError::BackendUnavailable(_))
        ));
        assert!(store.subscribe("containers").await.is_err());
        assert!(matches!(
            store.add_document("containers", "a", json!({})).await,
            Err(InfraError::RemoteOperationFailed(_))
        ));
    }

    #[tokio::test]
    async fn updating_missing_document_fails() {
        let store = InMemoryDocumentStore::default();
        let result = store
            .update_document("containers", "missing", json!({ "progress": 0 }))
            .await;
        assert!(matches!(result, Err(InfraError::RemoteOperationFailed(_))));
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = InMemoryDocumentStore::default();
        store
            .add_document("containers", "a", json!({}))
            .await
            .expect("add a");
        store
            .add_document("archive", "b", json!({}))
            .await
            .expect("add b");
        store.delete_document("archive", "a").await.expect("delete noop");
        assert_eq!(store.documents("containers").expect("list").len(), 1);
        assert_eq!(store.documents("archive").expect("list").len(), 1);
    }
}
