use crate::application::persistence::{decode_documents, BackendHandle, BackendMode, PersistOutcome};
use crate::domain::day_bucket::{DayBucket, DayScheduler};
use crate::domain::models::{Container, ContainerColor, Effect};
use crate::domain::reconciler_state::{ContainerStamp, IgnoreReason, ReconcilerState, Transition};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::Subscription;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

fn random_color() -> ContainerColor {
    ContainerColor::PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MutationStatus {
    /// Persisted and reflected in the session state.
    Applied,
    /// Persisted remotely; the next snapshot will carry it.
    AwaitingSnapshot,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MutationOutcome {
    pub status: MutationStatus,
    pub effects: Vec<Effect>,
}

impl MutationOutcome {
    fn ignored(reason: IgnoreReason) -> Self {
        Self {
            status: MutationStatus::Ignored(reason),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BucketColumn {
    #[serde(flatten)]
    pub bucket: DayBucket,
    pub progress: u8,
    pub containers: Vec<Container>,
}

struct SnapshotPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the rendered container list and routes every mutation through the
/// persistence adapter. Mutations are serialized by `write_gate`; remote
/// snapshots replace the list wholesale.
pub struct PlannerSession {
    state: Arc<Mutex<ReconcilerState>>,
    revisions: Arc<watch::Sender<u64>>,
    write_gate: tokio::sync::Mutex<()>,
    backend: BackendHandle,
    scheduler: DayScheduler,
    pump: Mutex<Option<SnapshotPump>>,
}

impl PlannerSession {
    pub fn start(backend: BackendHandle, scheduler: DayScheduler) -> Result<Self, InfraError> {
        let initial = backend.list_all()?.unwrap_or_default();
        let state = Arc::new(Mutex::new(ReconcilerState::new(initial)));
        let (revisions, _) = watch::channel(0);
        let revisions = Arc::new(revisions);

        let pump = backend.take_subscription()?.map(|subscription| {
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(pump_snapshots(
                Arc::clone(&state),
                Arc::clone(&revisions),
                subscription,
                cancel.clone(),
            ));
            SnapshotPump { cancel, handle }
        });

        Ok(Self {
            state,
            revisions,
            write_gate: tokio::sync::Mutex::new(()),
            backend,
            scheduler,
            pump: Mutex::new(pump),
        })
    }

    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }

    pub fn scheduler(&self) -> &DayScheduler {
        &self.scheduler
    }

    /// Bumps every time the visible list changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn containers(&self) -> Result<Vec<Container>, InfraError> {
        Ok(lock_state(&self.state)?.containers().to_vec())
    }

    pub fn day_progress(&self) -> Result<u8, InfraError> {
        Ok(lock_state(&self.state)?.day_progress())
    }

    pub fn columns(&self) -> Result<Vec<BucketColumn>, InfraError> {
        let state = lock_state(&self.state)?;
        Ok(self
            .scheduler
            .visible_buckets()
            .into_iter()
            .map(|bucket| BucketColumn {
                progress: state.bucket_progress(&bucket.key),
                containers: state.in_bucket(&bucket.key).cloned().collect(),
                bucket,
            })
            .collect())
    }

    pub async fn add_container(&self, title: &str, time: &str) -> Result<MutationOutcome, InfraError> {
        let stamp = ContainerStamp {
            id: next_id("ctr"),
            color: random_color(),
            day: self.scheduler.today(),
        };
        self.mutate("add_container", |state| state.plan_add_container(title, time, stamp))
            .await
    }

    pub async fn add_task(&self, container_id: &str, text: &str) -> Result<MutationOutcome, InfraError> {
        self.mutate("add_task", |state| state.plan_add_task(container_id, text))
            .await
    }

    pub async fn toggle_task(&self, container_id: &str, index: usize) -> Result<MutationOutcome, InfraError> {
        self.mutate("toggle_task", |state| state.plan_toggle_task(container_id, index))
            .await
    }

    pub async fn delete_task(&self, container_id: &str, index: usize) -> Result<MutationOutcome, InfraError> {
        self.mutate("delete_task", |state| state.plan_delete_task(container_id, index))
            .await
    }

    pub async fn delete_container(&self, container_id: &str) -> Result<MutationOutcome, InfraError> {
        self.mutate("delete_container", |state| state.plan_delete_container(container_id))
            .await
    }

    /// Replaces the list with a remote snapshot. Returns false when nothing changed.
    pub fn apply_snapshot(&self, containers: Vec<Container>) -> Result<bool, InfraError> {
        commit(&self.state, &self.revisions, containers)
    }

    /// Stops the snapshot pump and releases the remote subscription.
    pub async fn shutdown(&self) {
        let pump = match self.pump.lock() {
            Ok(mut pump) => pump.take(),
            Err(_) => None,
        };
        if let Some(pump) = pump {
            pump.cancel.cancel();
            let _ = pump.handle.await;
        }
    }

    async fn mutate<F>(&self, operation: &str, plan: F) -> Result<MutationOutcome, InfraError>
    where
        F: FnOnce(&ReconcilerState) -> Result<Transition, IgnoreReason>,
    {
        let _gate = self.write_gate.lock().await;
        let planned = {
            let state = lock_state(&self.state)?;
            plan(&state)
        };
        let Transition { write, effects } = match planned {
            Ok(transition) => transition,
            Err(reason) => {
                debug!(operation, ?reason, "mutation ignored");
                return Ok(MutationOutcome::ignored(reason));
            }
        };

        match self.backend.persist(&write).await {
            Ok(PersistOutcome::Applied(containers)) => {
                commit(&self.state, &self.revisions, containers)?;
                Ok(MutationOutcome {
                    status: MutationStatus::Applied,
                    effects,
                })
            }
            Ok(PersistOutcome::AwaitingSnapshot) => Ok(MutationOutcome {
                status: MutationStatus::AwaitingSnapshot,
                effects,
            }),
            Err(error) => {
                warn!(operation, container_id = write.container_id(), %error, "mutation not persisted");
                Err(error)
            }
        }
    }
}

impl Drop for PlannerSession {
    fn drop(&mut self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(pump) = pump.take() {
                pump.cancel.cancel();
            }
        }
    }
}

fn lock_state(state: &Mutex<ReconcilerState>) -> Result<MutexGuard<'_, ReconcilerState>, InfraError> {
    state
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("planner state lock poisoned: {error}")))
}

fn commit(
    state: &Mutex<ReconcilerState>,
    revisions: &watch::Sender<u64>,
    containers: Vec<Container>,
) -> Result<bool, InfraError> {
    let mut state = lock_state(state)?;
    let changed = state.replace_all(containers);
    if changed {
        revisions.send_replace(state.revision());
    }
    Ok(changed)
}

async fn pump_snapshots(
    state: Arc<Mutex<ReconcilerState>>,
    revisions: Arc<watch::Sender<u64>>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = subscription.next_snapshot() => snapshot,
        };
        let Some(documents) = snapshot else {
            info!("remote subscription closed");
            break;
        };
        let containers = decode_documents(documents);
        match commit(&state, &revisions, containers) {
            Ok(true) => debug!("applied remote snapshot"),
            Ok(false) => {}
            Err(error) => warn!(%error, "failed to apply remote snapshot"),
        }
    }
    subscription.unsubscribe();
}
