pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    add_container_impl, add_task_impl, delete_container_impl, delete_task_impl, get_board_impl,
    get_timer_state_impl, pause_timer_impl, start_timer_impl, toggle_task_impl, toggle_timer_impl,
    AppState,
};
use infrastructure::error::InfraError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "FOCUS_PLANNER_LOG";

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddContainerArgs {
    title: String,
    time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskArgs {
    container_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIndexArgs {
    container_id: String,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerArgs {
    container_id: String,
}

fn parse_args<T: DeserializeOwned>(state: &AppState, command: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|error| state.command_error(command, &InfraError::Json(error)))
}

fn respond<T: Serialize>(
    state: &AppState,
    command: &str,
    result: Result<T, InfraError>,
) -> Result<Value, String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    serde_json::to_value(value).map_err(|error| state.command_error(command, &InfraError::Json(error)))
}

async fn add_container(state: &AppState, args: Value) -> Result<Value, String> {
    let args: AddContainerArgs = parse_args(state, "add_container", args)?;
    respond(
        state,
        "add_container",
        add_container_impl(state, args.title, args.time).await,
    )
}

async fn add_task(state: &AppState, args: Value) -> Result<Value, String> {
    let args: AddTaskArgs = parse_args(state, "add_task", args)?;
    respond(
        state,
        "add_task",
        add_task_impl(state, args.container_id, args.text).await,
    )
}

async fn toggle_task(state: &AppState, args: Value) -> Result<Value, String> {
    let args: TaskIndexArgs = parse_args(state, "toggle_task", args)?;
    respond(
        state,
        "toggle_task",
        toggle_task_impl(state, args.container_id, args.index).await,
    )
}

async fn delete_task(state: &AppState, args: Value) -> Result<Value, String> {
    let args: TaskIndexArgs = parse_args(state, "delete_task", args)?;
    respond(
        state,
        "delete_task",
        delete_task_impl(state, args.container_id, args.index).await,
    )
}

async fn delete_container(state: &AppState, args: Value) -> Result<Value, String> {
    let args: ContainerArgs = parse_args(state, "delete_container", args)?;
    respond(
        state,
        "delete_container",
        delete_container_impl(state, args.container_id).await,
    )
}

/// Runs one JSON request line and returns the response envelope.
pub async fn dispatch(state: &AppState, line: &str) -> Value {
    let request: CommandRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => return json!({ "error": format!("invalid request: {error}") }),
    };

    let result = match request.command.as_str() {
        "ping" => Ok(json!("pong")),
        "add_container" => add_container(state, request.args).await,
        "add_task" => add_task(state, request.args).await,
        "toggle_task" => toggle_task(state, request.args).await,
        "delete_task" => delete_task(state, request.args).await,
        "delete_container" => delete_container(state, request.args).await,
        "start_timer" => respond(state, "start_timer", start_timer_impl(state)),
        "pause_timer" => respond(state, "pause_timer", pause_timer_impl(state)),
        "toggle_timer" => respond(state, "toggle_timer", toggle_timer_impl(state)),
        "get_timer_state" => respond(state, "get_timer_state", get_timer_state_impl(state)),
        "get_board" => respond(state, "get_board", get_board_impl(state)),
        other => Err(format!("unknown command: {other}")),
    };

    match result {
        Ok(value) => json!({ "ok": value }),
        Err(message) => json!({ "error": message }),
    }
}

/// Tracing goes to stderr; stdout carries the command protocol.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

/// Serves commands from stdin until EOF, then tears the session down.
pub async fn run(root: Option<String>) -> Result<(), InfraError> {
    init_tracing();

    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let state = AppState::new(workspace_root).await?;
    tracing::info!(mode = ?state.session().mode(), "focus planner ready");

    serve(
        &state,
        BufReader::new(tokio::io::stdin()),
        BufWriter::new(tokio::io::stdout()),
    )
    .await
}

/// Answers one response line per request line. The session is shut down
/// when input ends and when reading or writing fails.
pub async fn serve<R, W>(state: &AppState, input: R, output: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let served = answer_lines(state, input, output).await;
    match &served {
        Ok(()) => tracing::info!("input closed; shutting down"),
        Err(error) => tracing::warn!(%error, "command stream failed; shutting down"),
    }
    state.shutdown().await;
    served
}

async fn answer_lines<R, W>(state: &AppState, input: R, mut output: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(state, &line).await;
        output.write_all(response.to_string().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
