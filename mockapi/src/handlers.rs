use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{Envelope, RemoteError, RemoteMeta, RemoteTask};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::MutexGuard;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::{AppState, MockConfig, MockTask, Outcome};

pub const API_KEY_HEADER: &str = "x-api-key";

type ApiResponse = (StatusCode, Json<Envelope<Value>>);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/task", post(create_task))
        .route("/api/v1/task/:id", get(get_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Crea una tarea nueva en estado "pending"
async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResponse {
    if let Some(rejected) = check_api_key(&state.config, &headers) {
        return rejected;
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let task_type = body["task_type"].as_str().unwrap_or_default().to_string();

    if model.is_empty() || task_type.is_empty() {
        return app_error(400, "model and task_type are required");
    }

    // el API real contesta HTTP 200 con code != 200
    if !state.config.accepts_model(&model) {
        warn!("modelo rechazado: {}", model);
        return app_error(500, "invalid model");
    }

    let id = uuid::Uuid::new_v4().to_string();
    let input = body.get("input").cloned().unwrap_or_else(|| json!({}));

    let task = MockTask {
        id: id.clone(),
        model,
        task_type,
        outcome: outcome_from_input(&id, &input),
        flaky_left: input["mock_flaky_polls"].as_u64().unwrap_or(0) as u32,
        input,
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
        polls: 0,
        progress: 0,
    };

    info!(
        "tarea creada: {} (model={}, task_type={}, outcome={:?})",
        task.id, task.model, task.task_type, task.outcome
    );

    let view = task_view(&task, "pending");
    lock_tasks(&state).insert(id, task);

    ok(view)
}

// Devuelve el estado actual y avanza la tarea un paso
async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResponse {
    if let Some(rejected) = check_api_key(&state.config, &headers) {
        return rejected;
    }

    let mut tasks = lock_tasks(&state);
    let Some(task) = tasks.get_mut(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(Envelope::error(404, "task not found")),
        );
    };

    task.polls += 1;

    if task.flaky_left > 0 {
        task.flaky_left -= 1;
        warn!("devolviendo 503 simulado para tarea {}", task.id);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope::error(503, "service temporarily unavailable")),
        );
    }

    task.progress += 1;
    let status = status_for(&state.config, task);

    let now = Utc::now();
    if status != "pending" && task.started_at.is_none() {
        task.started_at = Some(now);
    }
    if (status == "completed" || status == "failed") && task.ended_at.is_none() {
        task.ended_at = Some(now);
    }

    ok(task_view(task, status))
}

/* ---------------- helpers ---------------- */

fn lock_tasks(state: &AppState) -> MutexGuard<'_, HashMap<String, MockTask>> {
    // un panic en otro handler no debe tumbar el mock entero
    state.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_api_key(config: &MockConfig, headers: &HeaderMap) -> Option<ApiResponse> {
    let expected = config.api_key.as_deref()?;
    let given = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if given == expected {
        None
    } else {
        Some((
            StatusCode::UNAUTHORIZED,
            Json(Envelope::error(401, "unauthorized: invalid x-api-key")),
        ))
    }
}

fn ok(data: Value) -> ApiResponse {
    (StatusCode::OK, Json(Envelope::ok(data)))
}

fn app_error(code: i64, message: &str) -> ApiResponse {
    (StatusCode::OK, Json(Envelope::error(code, message)))
}

/// Directivas de prueba dentro de `input`:
/// - mock_outcome: "fail" | "stuck" (default: completa)
/// - mock_error: mensaje para "fail"
/// - mock_output: objeto a devolver como output
fn outcome_from_input(id: &str, input: &Value) -> Outcome {
    match input["mock_outcome"].as_str() {
        Some("fail") => Outcome::Fail(
            input["mock_error"]
                .as_str()
                .unwrap_or("mock failure")
                .to_string(),
        ),
        Some("stuck") => Outcome::Stuck,
        _ => Outcome::Complete(
            input
                .get("mock_output")
                .cloned()
                .unwrap_or_else(|| json!({ "url": format!("https://mock.piapi.local/{id}.png") })),
        ),
    }
}

/// pending -> processing -> terminal, según cuántos GETs "buenos" lleva.
fn status_for(config: &MockConfig, task: &MockTask) -> &'static str {
    let p = task.progress;
    if p <= config.pending_polls {
        return "pending";
    }
    if p <= config.pending_polls + config.processing_polls {
        return "processing";
    }
    match task.outcome {
        Outcome::Complete(_) => "completed",
        Outcome::Fail(_) => "failed",
        Outcome::Stuck => "processing",
    }
}

fn task_view(task: &MockTask, status: &str) -> Value {
    let (output, error) = match (&task.outcome, status) {
        (Outcome::Complete(out), "completed") => (Some(out.clone()), empty_error()),
        (Outcome::Fail(msg), "failed") => (
            None,
            RemoteError::Detailed {
                code: 10000,
                message: msg.clone(),
                raw_message: String::new(),
                detail: None,
            },
        ),
        _ => (None, empty_error()),
    };

    let remote = RemoteTask {
        task_id: task.id.clone(),
        model: task.model.clone(),
        task_type: task.task_type.clone(),
        status: status.to_string(),
        input: Some(task.input.clone()),
        output,
        error: Some(error),
        meta: Some(RemoteMeta {
            created_at: Some(task.created_at.to_rfc3339()),
            started_at: task.started_at.map(|t| t.to_rfc3339()),
            ended_at: task.ended_at.map(|t| t.to_rfc3339()),
        }),
    };

    serde_json::to_value(remote).unwrap_or_default()
}

// el API real manda esto incluso cuando todo salió bien
fn empty_error() -> RemoteError {
    RemoteError::Detailed {
        code: 0,
        message: String::new(),
        raw_message: String::new(),
        detail: None,
    }
}
