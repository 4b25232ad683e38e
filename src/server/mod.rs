//! HTTP front of a controller process.
//!
//! Both endpoints acknowledge as soon as the form is parsed and route the
//! task in a background tokio task, so the sender is never blocked on the
//! hops that follow.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::content::dag::START;
use crate::content::task::Task;
use crate::controller::{Action, Controller};
use crate::error::TaskError;
use crate::transport::{CONTROLLER_PROCESS_RETURN, CONTROLLER_SUBMIT_TASK};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    /// Remove blobs once no branch on this device needs them.
    pub delete_temp_files: bool,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, delete_temp_files: bool) -> Self {
        Self {
            controller,
            delete_temp_files,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("missing form field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(CONTROLLER_SUBMIT_TASK, post(submit_task_handler))
        .route(CONTROLLER_PROCESS_RETURN, post(process_return_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Controller listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Controller shutdown complete");
    Ok(())
}

/// POST /submit_task - task from the generator or another controller.
async fn submit_task_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (data, file) = read_form(multipart).await?;
    let task = Task::deserialize(&data)?;

    tokio::spawn(async move {
        submit_task_background(&state, task, file).await;
    });
    Ok(Json(json!({ "success": true })))
}

/// POST /process_return - task coming back from a local processor.
async fn process_return_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (data, _) = read_form(multipart).await?;
    let task = Task::deserialize(&data)?;

    tokio::spawn(async move {
        process_return_background(&state, task).await;
    });
    Ok(Json(json!({ "success": true })))
}

/// Store the blob, close the transmit ticket and route the task. The blob
/// is kept only while a processor on this device still needs it.
pub async fn submit_task_background(state: &AppState, mut task: Task, file: Option<Bytes>) -> Option<Action> {
    let controller = &state.controller;
    let file_path = task.file_path().map(str::to_string);

    if let (Some(file_path), Some(bytes)) = (file_path.as_deref(), file) {
        if let Err(e) = controller.files().save(file_path, &bytes).await {
            warn!(error = %e, "Failed to save task file");
        }
    }
    // root tasks are injected at `start` without a transmit ticket
    if task.flow_index() != START {
        Controller::record_transmit_ts(&mut task, true);
    }

    let action = match controller.submit_task(task).await {
        Ok(action) => Some(action),
        Err(e) => {
            error!(error = %e, "Submit task failed");
            None
        }
    };

    if state.delete_temp_files && !action.is_some_and(|a| a.keeps_file()) {
        if let Some(file_path) = &file_path {
            controller.files().remove(file_path).await;
        }
    }
    action
}

/// Close the execute ticket and advance the task past its finished stage.
/// The blob survives while any branch executes here or waits at a join.
pub async fn process_return_background(state: &AppState, mut task: Task) -> Option<Vec<Action>> {
    let controller = &state.controller;
    let file_path = task.file_path().map(str::to_string);
    Controller::record_execute_ts(&mut task, true);

    let actions = match controller.process_return(task).await {
        Ok(actions) => Some(actions),
        Err(e) => {
            error!(error = %e, "Process return failed");
            None
        }
    };

    let keep = actions.as_ref().is_some_and(|actions| actions.iter().any(Action::keeps_file));
    if state.delete_temp_files && !keep {
        if let Some(file_path) = &file_path {
            controller.files().remove(file_path).await;
        }
    }
    actions
}

async fn read_form(mut multipart: Multipart) -> Result<(String, Option<Bytes>), ServerError> {
    let mut data = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("data") => data = Some(field.text().await?),
            Some("file") => file = Some(field.bytes().await?),
            _ => {}
        }
    }
    Ok((data.ok_or(ServerError::MissingField("data"))?, file))
}
