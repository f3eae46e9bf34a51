//! Local JSON API over a shared [`Tracker`].
//!
//! Durable history lives under `/api/tasks`, the open working set under
//! `/api/today`. Successful responses wrap their payload in `{"data": ...}`;
//! failures are `{"error": message}` with 400, 404, 500, or 502.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::local_task::LocalTaskEdit;
use crate::core::task::{NewTask, TaskPatch, TaskStatus};
use crate::error::Error;
use crate::sync::{StoreError, TaskFilter};
use crate::tracker::Tracker;

pub struct DayrollServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl DayrollServer {
    pub async fn start(tracker: Tracker, config: &ServerConfig) -> crate::error::Result<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| Error::Config(format!("bind {} failed: {}", bind_addr, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Config(format!("failed to get local addr: {}", e)))?;

        log::info!("Listening on http://{}/api", addr);

        let app = router(tracker);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("Server error: {}", e);
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

pub fn router(tracker: Tracker) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/batch", post(create_tasks))
        .route("/api/tasks/{id}", patch(patch_task).delete(delete_history_task))
        .route("/api/carryover", post(carry_over))
        .route("/api/today", get(today).post(add_task))
        .route("/api/today/done", post(mark_done))
        .route("/api/today/{id}", patch(edit_task).delete(delete_task))
        .route(
            "/api/today/{id}/suggestions",
            post(add_suggestion).delete(remove_suggestion_at),
        )
        .route(
            "/api/today/{id}/suggestions/{suggestion_id}",
            delete(remove_suggestion),
        )
        .route("/api/upcoming", get(upcoming))
        .route("/api/week", get(week))
        .route("/api/history", get(history))
        .route("/api/ollama", post(ask_assistant))
        .with_state(tracker)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

// Extractor rejections become 400 validation errors carrying axum's message.
impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(Error::Validation(r.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        Self(Error::Validation(r.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        Self(Error::Validation(r.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            Error::Store(StoreError::Api {
                message,
                details,
                hint,
                code,
                ..
            }) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "details": details, "hint": hint, "code": code }),
            ),
            Error::Store(StoreError::Rejected(msg)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            Error::Store(e) => (StatusCode::BAD_GATEWAY, json!({ "error": e.to_string() })),
            Error::Assistant(e) => (StatusCode::BAD_GATEWAY, json!({ "error": e.to_string() })),
            e @ (Error::Cache(_) | Error::Config(_)) => {
                log::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

#[derive(Serialize)]
struct Data<T> {
    data: T,
}

fn data<T: Serialize>(value: T) -> ApiResult {
    Ok(Json(Data { data: value }).into_response())
}

// ---------------------------------------------------------------------------
// Durable history
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TasksQuery {
    date: Option<NaiveDate>,
    status: Option<String>,
}

async fn list_tasks(
    State(tracker): State<Tracker>,
    query: Result<Query<TasksQuery>, QueryRejection>,
) -> ApiResult {
    let Query(q) = query?;
    let filter = TaskFilter {
        id: None,
        created_date: q.date,
        statuses: q.status.as_deref().map(TaskStatus::parse_list).unwrap_or_default(),
    };
    data(tracker.list_tasks(&filter).await?)
}

#[derive(Debug, Deserialize)]
struct CreateTaskBody {
    #[serde(default)]
    title: String,
    description: Option<String>,
    status: Option<TaskStatus>,
    created_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
}

async fn create_task(
    State(tracker): State<Tracker>,
    body: Result<Json<CreateTaskBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let created_date = match body.created_date {
        Some(date) if !body.title.trim().is_empty() => date,
        _ => return Err(Error::Validation("Title and created_date are required".into()).into()),
    };
    let row = NewTask {
        title: body.title,
        description: body.description,
        status: body.status.unwrap_or(TaskStatus::Active),
        created_date,
        due_date: body.due_date,
    };
    data(tracker.create_task(row).await?)
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default)]
    tasks: Vec<NewTask>,
}

#[derive(Serialize)]
struct BatchCreated {
    count: usize,
    data: Vec<crate::core::task::Task>,
}

async fn create_tasks(
    State(tracker): State<Tracker>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let rows = tracker.create_tasks(body.tasks).await?;
    Ok(Json(BatchCreated {
        count: rows.len(),
        data: rows,
    })
    .into_response())
}

async fn patch_task(
    State(tracker): State<Tracker>,
    Path(id): Path<String>,
    patch: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult {
    let Json(patch) = patch?;
    data(tracker.patch_task(&id, &patch).await?)
}

async fn delete_history_task(State(tracker): State<Tracker>, Path(id): Path<String>) -> ApiResult {
    tracker.remove_history_task(&id).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    status: Option<String>,
}

async fn history(
    State(tracker): State<Tracker>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let Query(q) = query?;
    let statuses = q.status.as_deref().map(TaskStatus::parse_list).unwrap_or_default();
    data(tracker.history(&statuses).await?)
}

// ---------------------------------------------------------------------------
// Rollover and working set
// ---------------------------------------------------------------------------

async fn carry_over(State(tracker): State<Tracker>) -> ApiResult {
    data(tracker.carry_over().await?)
}

async fn today(State(tracker): State<Tracker>) -> ApiResult {
    data(tracker.today_tasks())
}

async fn upcoming(State(tracker): State<Tracker>) -> ApiResult {
    data(tracker.upcoming())
}

#[derive(Debug, Default, Deserialize)]
struct WeekQuery {
    date: Option<NaiveDate>,
}

async fn week(
    State(tracker): State<Tracker>,
    query: Result<Query<WeekQuery>, QueryRejection>,
) -> ApiResult {
    let Query(q) = query?;
    data(tracker.week_view(q.date))
}

#[derive(Debug, Deserialize)]
struct AddTaskBody {
    #[serde(default)]
    title: String,
    description: Option<String>,
    due_date: Option<NaiveDate>,
}

async fn add_task(
    State(tracker): State<Tracker>,
    body: Result<Json<AddTaskBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let task = tracker.add_task(&body.title, body.description, body.due_date)?;
    Ok((StatusCode::CREATED, Json(Data { data: task })).into_response())
}

async fn edit_task(
    State(tracker): State<Tracker>,
    Path(id): Path<String>,
    edit: Result<Json<LocalTaskEdit>, JsonRejection>,
) -> ApiResult {
    let Json(edit) = edit?;
    data(tracker.update_task(&id, &edit)?)
}

async fn delete_task(State(tracker): State<Tracker>, Path(id): Path<String>) -> ApiResult {
    tracker.delete_task(&id)?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[derive(Debug, Deserialize)]
struct DoneBody {
    #[serde(default)]
    ids: Vec<String>,
}

async fn mark_done(
    State(tracker): State<Tracker>,
    body: Result<Json<DoneBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    data(tracker.mark_done(&body.ids).await?)
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SuggestionBody {
    #[serde(default)]
    text: String,
}

async fn add_suggestion(
    State(tracker): State<Tracker>,
    Path(id): Path<String>,
    body: Result<Json<SuggestionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    match tracker.add_suggestion(&id, &body.text)? {
        Some(suggestion) => data(suggestion),
        None => Err(Error::NotFound(format!("task {}", id)).into()),
    }
}

async fn remove_suggestion(
    State(tracker): State<Tracker>,
    path: Result<Path<(String, Uuid)>, PathRejection>,
) -> ApiResult {
    let Path((id, suggestion_id)) = path?;
    match tracker.remove_suggestion(&id, suggestion_id)? {
        Some(removed) => data(removed),
        None => Err(Error::NotFound(format!("suggestion {}", suggestion_id)).into()),
    }
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    index: usize,
}

/// Positional removal. An index past the end is not an error.
async fn remove_suggestion_at(
    State(tracker): State<Tracker>,
    Path(id): Path<String>,
    query: Result<Query<IndexQuery>, QueryRejection>,
) -> ApiResult {
    let Query(q) = query?;
    data(tracker.remove_suggestion_at(&id, q.index)?)
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaskText {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantBody {
    task_id: Option<String>,
    task: Option<TaskText>,
}

async fn ask_assistant(
    State(tracker): State<Tracker>,
    body: Result<Json<AssistantBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let response = match (body.task_id, body.task) {
        (Some(id), _) => tracker.ask_assistant(&id).await?,
        (None, Some(task)) => tracker.ask_about(&task.title, task.description.as_deref()).await?,
        (None, None) => return Err(Error::Validation("Task data is required".into()).into()),
    };
    Ok(Json(json!({ "response": response })).into_response())
}
