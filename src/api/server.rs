//! API Server module
//!
//! This module provides the HTTP API for studyhub: the `/generate` proxy that
//! keeps the model credentials on the server, and JSON routes over the
//! interaction controller.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::api::gateway::{Gateway, GenerateRequest, GenerateResponse};
use crate::controller::{ActionError, Controller, Event};
use crate::models::{Filter, NewTask, Priority, TaskId, TaskPatch};
use crate::quiz::{QuizSession, SelectOutcome};

/// Request to add a new task
#[derive(Debug, Serialize, Deserialize)]
pub struct AddTaskRequest {
    pub title: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl From<AddTaskRequest> for NewTask {
    fn from(request: AddTaskRequest) -> Self {
        let mut new_task = NewTask::new(request.title).with_query(request.query);
        if let Some(image_ref) = request.image_ref {
            new_task = new_task.with_image_ref(image_ref);
        }
        if let Some(due_date) = request.due_date {
            new_task = new_task.with_due_date(due_date);
        }
        if let Some(priority) = request.priority {
            new_task = new_task.with_priority(priority);
        }
        new_task
    }
}

/// Query string of `GET /api/tasks`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddSubtaskRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuizRequest {
    pub topic: String,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: usize,
    pub option: String,
}

/// Outcome of an answer plus the quiz as it stands afterwards
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub outcome: SelectOutcome,
    pub quiz: Option<QuizSession>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PathRequest {
    pub course: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub image_ref: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_parts(self) -> (bool, Option<T>, Option<String>) {
        (self.success, self.data, self.error)
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    controller: Controller,
    gateway: Arc<dyn Gateway>,
}

fn status_for(error: &ActionError) -> StatusCode {
    match error {
        ActionError::EmptyInput | ActionError::NothingToSummarize => StatusCode::BAD_REQUEST,
        ActionError::UnknownTask(_) | ActionError::NoDraft | ActionError::Discarded => {
            StatusCode::NOT_FOUND
        }
        ActionError::Busy => StatusCode::CONFLICT,
        ActionError::Gateway(_) | ActionError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Helper function to map controller results to Axum responses
fn map_action_result<T: Serialize>(result: Result<T, ActionError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::<T>::error(format!("{} ({})", e.user_message(), e))),
        )
            .into_response(),
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    map_action_result::<T>(Ok(data))
}

/// Builds the application router
pub fn router(controller: Controller, gateway: Arc<dyn Gateway>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // --- Model proxy --- //
        .route("/generate", post(generate_handler))
        // --- Tasks --- //
        .route(
            "/api/tasks",
            get(list_tasks)
                .post(add_task)
                .delete(clear_completed),
        )
        .route("/api/tasks/:id", patch(update_task).delete(remove_task))
        .route("/api/tasks/:id/toggle", post(toggle_task))
        .route("/api/tasks/:id/subtasks", post(add_subtask))
        .route(
            "/api/tasks/:id/subtasks/:index/toggle",
            post(toggle_subtask),
        )
        .route("/api/tasks/:id/analyze", post(analyze_task))
        .route("/api/tasks/:id/summarize", post(summarize_task))
        .route("/api/tasks/:id/edit", post(begin_edit))
        .route(
            "/api/edit",
            get(get_draft).patch(edit_draft).delete(cancel_edit),
        )
        .route("/api/edit/save", post(save_edit))
        .route("/api/countdowns", get(countdowns))
        .route("/api/progress", get(progress))
        // --- Standalone generation --- //
        .route("/api/quiz", get(get_quiz).post(generate_quiz))
        .route("/api/quiz/answer", post(answer_quiz))
        .route("/api/path", post(generate_path))
        .route("/api/explain", post(explain_image))
        .route("/api/summarize", post(summarize_text))
        .route("/api/artifacts", get(artifacts))
        // --- Events --- //
        .route("/events", get(events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState {
            controller,
            gateway,
        })
}

/// Starts the API server
pub async fn serve(
    controller: Controller,
    gateway: Arc<dyn Gateway>,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let ticker = controller.spawn_ticker();
    let app = router(controller, gateway);

    // Start server
    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    let result = axum::serve(listener, app).await;
    ticker.abort();
    result?;

    Ok(())
}

// --- Model proxy --- //

async fn generate_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let prompt = serde_json::from_slice::<GenerateRequest>(&body)
        .map(|request| request.prompt)
        .unwrap_or_default();
    if prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(GenerateResponse::error("Missing prompt", None)),
        )
            .into_response();
    }

    let limit = state.controller.config().request_timeout;
    match state.gateway.submit_within(&prompt, limit).await {
        Ok(text) => (StatusCode::OK, Json(GenerateResponse::text(text))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Generation failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(GenerateResponse::error(
                    "Gemini request failed",
                    Some(e.to_string()),
                )),
            )
                .into_response()
        }
    }
}

// --- Task Handlers --- //

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Response {
    let store = state.controller.snapshot();
    let tasks: Vec<_> = store
        .filtered(
            query.filter.unwrap_or_default(),
            query.search.as_deref().unwrap_or(""),
        )
        .into_iter()
        .cloned()
        .collect();
    ok(tasks)
}

async fn add_task(State(state): State<AppState>, Json(payload): Json<AddTaskRequest>) -> Response {
    let result = state
        .controller
        .add_task(payload.into())
        .and_then(|id| state.controller.task(id).ok_or(ActionError::UnknownTask(id)));
    map_action_result(result)
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<TaskPatch>,
) -> Response {
    map_action_result(state.controller.update_task(TaskId::new(id), &patch))
}

async fn remove_task(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    let result = if state.controller.remove_task(id) {
        Ok(id)
    } else {
        Err(ActionError::UnknownTask(id))
    };
    map_action_result(result)
}

async fn clear_completed(State(state): State<AppState>) -> Response {
    ok(state.controller.clear_completed())
}

async fn toggle_task(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    map_action_result(state.controller.toggle_complete(TaskId::new(id)))
}

async fn add_subtask(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<AddSubtaskRequest>,
) -> Response {
    map_action_result(
        state
            .controller
            .add_subtask(TaskId::new(id), &payload.name),
    )
}

async fn toggle_subtask(
    State(state): State<AppState>,
    Path((id, index)): Path<(u64, usize)>,
) -> Response {
    map_action_result(state.controller.toggle_subtask(TaskId::new(id), index))
}

async fn analyze_task(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    let result = state.controller.analyze_task(id).await.and_then(|_| {
        state
            .controller
            .task(id)
            .ok_or(ActionError::UnknownTask(id))
    });
    map_action_result(result)
}

async fn summarize_task(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    let result = state.controller.summarize_task(id).await.and_then(|_| {
        state
            .controller
            .task(id)
            .ok_or(ActionError::UnknownTask(id))
    });
    map_action_result(result)
}

async fn begin_edit(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    map_action_result(state.controller.begin_edit(TaskId::new(id)))
}

async fn get_draft(State(state): State<AppState>) -> Response {
    map_action_result(state.controller.draft().ok_or(ActionError::NoDraft))
}

async fn edit_draft(State(state): State<AppState>, Json(patch): Json<TaskPatch>) -> Response {
    map_action_result(state.controller.edit_draft(patch))
}

async fn save_edit(State(state): State<AppState>) -> Response {
    map_action_result(state.controller.save_edit())
}

async fn cancel_edit(State(state): State<AppState>) -> Response {
    ok(state.controller.cancel_edit())
}

async fn countdowns(State(state): State<AppState>) -> Response {
    ok(state.controller.countdowns(Utc::now()))
}

async fn progress(State(state): State<AppState>) -> Response {
    ok(state.controller.progress())
}

// --- Standalone Handlers --- //

async fn get_quiz(State(state): State<AppState>) -> Response {
    ok(state.controller.quiz())
}

async fn generate_quiz(
    State(state): State<AppState>,
    Json(payload): Json<QuizRequest>,
) -> Response {
    map_action_result(
        state
            .controller
            .generate_quiz(&payload.topic, payload.count.unwrap_or_default())
            .await,
    )
}

async fn answer_quiz(
    State(state): State<AppState>,
    Json(payload): Json<AnswerRequest>,
) -> Response {
    let outcome = state
        .controller
        .answer_quiz(payload.question, &payload.option);
    ok(AnswerResponse {
        outcome,
        quiz: state.controller.quiz(),
    })
}

async fn generate_path(
    State(state): State<AppState>,
    Json(payload): Json<PathRequest>,
) -> Response {
    map_action_result(
        state
            .controller
            .generate_learning_path(&payload.course)
            .await,
    )
}

async fn explain_image(
    State(state): State<AppState>,
    Json(payload): Json<ExplainRequest>,
) -> Response {
    map_action_result(
        state
            .controller
            .explain_image(&payload.image_ref, payload.prompt.as_deref())
            .await,
    )
}

async fn summarize_text(
    State(state): State<AppState>,
    Json(payload): Json<SummarizeRequest>,
) -> Response {
    map_action_result(state.controller.summarize_text(&payload.text).await)
}

async fn artifacts(State(state): State<AppState>) -> Response {
    ok(state.controller.artifacts())
}

// --- Event Handlers --- //

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stream = event_stream(state.controller.subscribe());

    // Set headers for event stream
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

fn format_event(event: Event) -> String {
    let name = match event {
        Event::Changed => "changed",
        Event::Tick => "tick",
    };
    format!("event: {}\ndata: {}\n\n", name, name)
}

/// Server-sent events for every controller notification. A lagging receiver
/// reports a single change, since the client refetches state anyway.
fn event_stream(
    receiver: broadcast::Receiver<Event>,
) -> impl Stream<Item = Result<String, Infallible>> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => Event::Changed,
            Err(RecvError::Closed) => return None,
        };
        Some((Ok(format_event(event)), receiver))
    })
}
