use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::persistence::{BackendHandle, BackendMode};
use crate::application::reconciler::{BucketColumn, MutationOutcome, MutationStatus, PlannerSession};
use crate::application::timer_service::TimerService;
use crate::domain::day_bucket::{DayScheduler, DayZone};
use crate::domain::timer::TimerView;
use crate::infrastructure::config::PlannerConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::feedback::{FeedbackSink, TracingFeedbackSink};
use crate::infrastructure::http_document_store::{HttpDocumentStore, HttpDocumentStoreConfig};
use crate::infrastructure::local_store::{KeyValueStore, SqliteKeyValueStore};
use crate::infrastructure::remote_store::RemoteDocumentStore;
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub struct AppState {
    logs_dir: PathBuf,
    session: PlannerSession,
    timer: TimerService,
    feedback: Arc<dyn FeedbackSink>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub async fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let remote = build_remote_store(&bootstrap.config);
        Self::with_collaborators(bootstrap, remote, Arc::new(TracingFeedbackSink)).await
    }

    pub async fn with_collaborators(
        bootstrap: BootstrapResult,
        remote: Option<Arc<dyn RemoteDocumentStore>>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Result<Self, InfraError> {
        let app = &bootstrap.config.app;
        let zone = DayZone::parse(app.timezone.as_deref()).map_err(InfraError::InvalidConfig)?;
        let local: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        let backend =
            BackendHandle::initialize(remote, local, &app.collection, &app.local_store_key).await;
        let session = PlannerSession::start(backend, DayScheduler::new(zone))?;
        let timer = TimerService::new(app.timer_seconds, Arc::clone(&feedback));

        Ok(Self {
            logs_dir: bootstrap.logs_dir,
            session,
            timer,
            feedback,
            log_guard: Mutex::new(()),
        })
    }

    pub fn session(&self) -> &PlannerSession {
        &self.session
    }

    /// Stops the timer ticker and releases the remote subscription.
    pub async fn shutdown(&self) {
        self.timer.shutdown().await;
        self.session.shutdown().await;
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

/// Unusable remote settings fall back to the local store like an unreachable remote.
fn build_remote_store(config: &PlannerConfig) -> Option<Arc<dyn RemoteDocumentStore>> {
    let settings = config.remote.as_ref()?;
    match HttpDocumentStore::new(HttpDocumentStoreConfig {
        base_url: settings.base_url.clone(),
        api_key: settings.api_key.clone(),
        request_timeout: settings.request_timeout,
        poll_interval: settings.poll_interval,
    }) {
        Ok(store) => Some(Arc::new(store)),
        Err(error) => {
            warn!(%error, "remote document store misconfigured");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardResponse {
    pub mode: BackendMode,
    pub offline: bool,
    pub today: String,
    pub day_progress: u8,
    pub columns: Vec<BucketColumn>,
    pub timer: TimerView,
}

fn finish_mutation(
    state: &AppState,
    command: &str,
    result: Result<MutationOutcome, InfraError>,
) -> Result<MutationOutcome, InfraError> {
    let outcome = result?;
    state.feedback.perform_all(&outcome.effects);
    let status = match outcome.status {
        MutationStatus::Applied => "applied".to_string(),
        MutationStatus::AwaitingSnapshot => "awaiting snapshot".to_string(),
        MutationStatus::Ignored(reason) => format!("ignored ({reason:?})"),
    };
    state.log_info(command, &status);
    Ok(outcome)
}

pub async fn add_container_impl(
    state: &AppState,
    title: String,
    time: String,
) -> Result<MutationOutcome, InfraError> {
    let result = state.session.add_container(&title, &time).await;
    finish_mutation(state, "add_container", result)
}

pub async fn add_task_impl(
    state: &AppState,
    container_id: String,
    text: String,
) -> Result<MutationOutcome, InfraError> {
    let result = state.session.add_task(&container_id, &text).await;
    finish_mutation(state, "add_task", result)
}

pub async fn toggle_task_impl(
    state: &AppState,
    container_id: String,
    index: usize,
) -> Result<MutationOutcome, InfraError> {
    let result = state.session.toggle_task(&container_id, index).await;
    finish_mutation(state, "toggle_task", result)
}

pub async fn delete_task_impl(
    state: &AppState,
    container_id: String,
    index: usize,
) -> Result<MutationOutcome, InfraError> {
    let result = state.session.delete_task(&container_id, index).await;
    finish_mutation(state, "delete_task", result)
}

pub async fn delete_container_impl(
    state: &AppState,
    container_id: String,
) -> Result<MutationOutcome, InfraError> {
    let result = state.session.delete_container(&container_id).await;
    finish_mutation(state, "delete_container", result)
}

pub fn start_timer_impl(state: &AppState) -> Result<TimerView, InfraError> {
    let view = state.timer.start()?;
    state.log_info("start_timer", &format!("running={} left={}", view.running, view.label));
    Ok(view)
}

pub fn pause_timer_impl(state: &AppState) -> Result<TimerView, InfraError> {
    let view = state.timer.pause()?;
    state.log_info("pause_timer", &format!("running={} left={}", view.running, view.label));
    Ok(view)
}

pub fn toggle_timer_impl(state: &AppState) -> Result<TimerView, InfraError> {
    let view = state.timer.toggle()?;
    state.log_info("toggle_timer", &format!("running={} left={}", view.running, view.label));
    Ok(view)
}

pub fn get_timer_state_impl(state: &AppState) -> Result<TimerView, InfraError> {
    state.timer.view()
}

pub fn get_board_impl(state: &AppState) -> Result<BoardResponse, InfraError> {
    let mode = state.session.mode();
    Ok(BoardResponse {
        mode,
        offline: mode == BackendMode::Local,
        today: state.session.scheduler().today(),
        day_progress: state.session.day_progress()?,
        columns: state.session.columns()?,
        timer: state.timer.view()?,
    })
}
