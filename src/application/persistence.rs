use crate::domain::models::{Container, ContainerPatch};
use crate::domain::reconciler_state::{apply_write, PendingWrite};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_store::KeyValueStore;
use crate::infrastructure::remote_store::{RemoteDocument, RemoteDocumentStore, Subscription};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Remote,
    Local,
}

/// What a successful write hands back to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Local mode: the full collection after the write.
    Applied(Vec<Container>),
    /// Remote mode: the subscription will deliver the result.
    AwaitingSnapshot,
}

#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn create(&self, container: &Container) -> Result<PersistOutcome, InfraError>;
    async fn update(&self, id: &str, patch: &ContainerPatch) -> Result<PersistOutcome, InfraError>;
    async fn delete(&self, id: &str) -> Result<PersistOutcome, InfraError>;
}

pub struct RemoteBackend {
    store: Arc<dyn RemoteDocumentStore>,
    collection: String,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn RemoteDocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ContainerStore for RemoteBackend {
    async fn create(&self, container: &Container) -> Result<PersistOutcome, InfraError> {
        let data = serde_json::to_value(container)?;
        self.store
            .add_document(&self.collection, &container.id, data)
            .await?;
        Ok(PersistOutcome::AwaitingSnapshot)
    }

    async fn update(&self, id: &str, patch: &ContainerPatch) -> Result<PersistOutcome, InfraError> {
        let data = serde_json::to_value(patch)?;
        self.store.update_document(&self.collection, id, data).await?;
        Ok(PersistOutcome::AwaitingSnapshot)
    }

    async fn delete(&self, id: &str) -> Result<PersistOutcome, InfraError> {
        self.store.delete_document(&self.collection, id).await?;
        Ok(PersistOutcome::AwaitingSnapshot)
    }
}

/// Whole-collection persistence under a single key. The in-memory copy only
/// advances after the store accepted the new value.
pub struct LocalBackend {
    store: Arc<dyn KeyValueStore>,
    key: String,
    containers: Mutex<Vec<Container>>,
}

impl LocalBackend {
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let containers = match read_local_collection(store.as_ref(), &key) {
            Ok(containers) => containers,
            Err(error) => {
                warn!(key = %key, %error, "local collection unreadable; starting empty");
                Vec::new()
            }
        };
        Self {
            store,
            key,
            containers: Mutex::new(containers),
        }
    }

    pub fn list_all(&self) -> Result<Vec<Container>, InfraError> {
        Ok(self.lock_containers()?.clone())
    }

    fn persist(&self, write: &PendingWrite) -> Result<PersistOutcome, InfraError> {
        let mut containers = self.lock_containers()?;
        let next = apply_write(&containers, write);
        let encoded = serde_json::to_string(&next)?;
        self.store
            .set(&self.key, &encoded)
            .map_err(|error| InfraError::LocalStoreWrite(format!("key {}: {error}", self.key)))?;
        *containers = next.clone();
        Ok(PersistOutcome::Applied(next))
    }

    fn lock_containers(&self) -> Result<MutexGuard<'_, Vec<Container>>, InfraError> {
        self.containers
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("local collection lock poisoned: {error}")))
    }
}

#[async_trait]
impl ContainerStore for LocalBackend {
    async fn create(&self, container: &Container) -> Result<PersistOutcome, InfraError> {
        self.persist(&PendingWrite::Create(container.clone()))
    }

    async fn update(&self, id: &str, patch: &ContainerPatch) -> Result<PersistOutcome, InfraError> {
        self.persist(&PendingWrite::Update {
            id: id.to_string(),
            patch: patch.clone(),
        })
    }

    async fn delete(&self, id: &str) -> Result<PersistOutcome, InfraError> {
        self.persist(&PendingWrite::Delete { id: id.to_string() })
    }
}

/// Absent key reads as an empty collection. Only a value that is not a JSON
/// array counts as corrupt; entries that do not decode are skipped.
pub fn read_local_collection(store: &dyn KeyValueStore, key: &str) -> Result<Vec<Container>, InfraError> {
    let Some(raw) = store.get(key)? else {
        return Ok(Vec::new());
    };
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|error| InfraError::LocalStoreCorrupt(format!("key {key}: {error}")))?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Container>(entry) {
            Ok(container) => Some(container.normalized()),
            Err(error) => {
                warn!(key, index, %error, "skipping malformed local container");
                None
            }
        })
        .collect())
}

/// Turns a snapshot into containers. The document id wins over any `id`
/// field in the payload; documents that do not decode are skipped.
pub fn decode_documents(documents: Vec<RemoteDocument>) -> Vec<Container> {
    documents
        .into_iter()
        .filter_map(|document| {
            let RemoteDocument { id, mut data } = document;
            let Some(fields) = data.as_object_mut() else {
                warn!(document_id = %id, "skipping snapshot document that is not an object");
                return None;
            };
            fields.insert("id".to_string(), serde_json::Value::String(id.clone()));
            match serde_json::from_value::<Container>(data) {
                Ok(container) => Some(container.normalized()),
                Err(error) => {
                    warn!(document_id = %id, %error, "skipping malformed snapshot document");
                    None
                }
            }
        })
        .collect()
}

pub enum Backend {
    Remote(RemoteBackend),
    Local(LocalBackend),
}

impl Backend {
    fn store(&self) -> &dyn ContainerStore {
        match self {
            Self::Remote(backend) => backend,
            Self::Local(backend) => backend,
        }
    }
}

/// The persistence adapter selected at startup. Mode never changes afterwards.
pub struct BackendHandle {
    backend: Backend,
    subscription: Mutex<Option<Subscription>>,
}

impl BackendHandle {
    /// Tries the remote collection first and falls back to the local store on
    /// any connection or subscription failure.
    pub async fn initialize(
        remote: Option<Arc<dyn RemoteDocumentStore>>,
        local: Arc<dyn KeyValueStore>,
        collection: &str,
        local_key: &str,
    ) -> Self {
        if let Some(store) = remote {
            match connect_remote(store.as_ref(), collection).await {
                Ok(subscription) => {
                    info!(collection, "using remote document store");
                    return Self {
                        backend: Backend::Remote(RemoteBackend::new(store, collection)),
                        subscription: Mutex::new(Some(subscription)),
                    };
                }
                Err(error) => {
                    warn!(%error, "remote document store unavailable; falling back to local store");
                }
            }
        } else {
            info!("remote document store not configured; using local store");
        }

        Self::local(LocalBackend::load(local, local_key))
    }

    pub fn local(backend: LocalBackend) -> Self {
        Self {
            backend: Backend::Local(backend),
            subscription: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> BackendMode {
        match self.backend {
            Backend::Remote(_) => BackendMode::Remote,
            Backend::Local(_) => BackendMode::Local,
        }
    }

    /// Local mode only. Remote mode learns its contents from snapshots.
    pub fn list_all(&self) -> Result<Option<Vec<Container>>, InfraError> {
        match &self.backend {
            Backend::Local(backend) => backend.list_all().map(Some),
            Backend::Remote(_) => Ok(None),
        }
    }

    /// Hands out the live subscription once. Always `None` in local mode.
    pub fn take_subscription(&self) -> Result<Option<Subscription>, InfraError> {
        let mut subscription = self
            .subscription
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("subscription lock poisoned: {error}")))?;
        Ok(subscription.take())
    }

    pub async fn persist(&self, write: &PendingWrite) -> Result<PersistOutcome, InfraError> {
        match write {
            PendingWrite::Create(container) => self.create(container).await,
            PendingWrite::Update { id, patch } => self.update(id, patch).await,
            PendingWrite::Delete { id } => self.delete(id).await,
        }
    }

    pub async fn create(&self, container: &Container) -> Result<PersistOutcome, InfraError> {
        self.backend.store().create(container).await
    }

    pub async fn update(&self, id: &str, patch: &ContainerPatch) -> Result<PersistOutcome, InfraError> {
        self.backend.store().update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<PersistOutcome, InfraError> {
        self.backend.store().delete(id).await
    }
}

async fn connect_remote(
    store: &dyn RemoteDocumentStore,
    collection: &str,
) -> Result<Subscription, InfraError> {
    store.connect().await?;
    store.subscribe(collection).await
}
