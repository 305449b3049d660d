use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use log::{error, info, warn};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::{AppConfig, StoragePaths};
use crate::environment::Environment;
use crate::error::StorageError;
use crate::record::FeedbackPayload;
use crate::store::{BackendFiles, BackendKind, FeedbackStore};

const THANK_YOU: &str = "Thank you for your valuable feedback! Your response has been recorded.";
const SAVE_FAILED: &str = "Sorry, we could not save your feedback right now. Please try again later.";

/// Shared state of the running server
pub struct AppState {
    store: Mutex<FeedbackStore>,
    files: BackendFiles,
    environment: Environment,
    started_at: Instant,
    port: u16,
}

impl AppState {
    pub fn new(store: FeedbackStore, environment: Environment, port: u16) -> Self {
        AppState {
            files: store.files(),
            store: Mutex::new(store),
            environment,
            started_at: Instant::now(),
            port,
        }
    }

    /// The store; a panic in an earlier request does not lock it forever.
    /// Only call this on the blocking pool, a save can hold it for seconds.
    fn store(&self) -> MutexGuard<'_, FeedbackStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let environment = Environment::detect(&config.marker_file);
    let paths = StoragePaths::resolve(&environment, &config.data_dir);

    info!(
        "Environment: {} (hosting: {})",
        environment.platform, environment.hosting
    );
    info!("Data directory: {}", paths.dir.display());

    let store = FeedbackStore::for_environment(&environment, &paths);
    store.prepare();

    let app_state = Arc::new(AppState::new(store, environment, config.port));
    let app = router(app_state, &config.static_dir);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on http://{}:{}", config.host, config.port);
    info!("Submit feedback at http://localhost:{}/", config.port);
    info!("View feedback at http://localhost:{}/view-feedback", config.port);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over an existing state
pub fn router(app_state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(serve_form))
        .route("/submit-feedback", post(submit_feedback))
        .route("/view-feedback", get(view_feedback))
        .route("/download-csv", get(download_csv))
        .route("/download-json", get(download_json))
        .route("/download-excel", get(download_excel))
        .route("/fix-excel", post(fix_excel))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn serve_form() -> Html<&'static str> {
    Html(include_str!("./static/feedback.html"))
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message.into(),
        })),
    )
        .into_response()
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = match parse_payload(&headers, &body) {
        Some(payload) => payload,
        None => {
            warn!("Rejected feedback body that is neither a JSON object nor a form");
            return json_error(StatusCode::BAD_REQUEST, "Invalid feedback submission.");
        }
    };
    info!("Received feedback submission");

    let worker_state = Arc::clone(&state);
    let outcome =
        match tokio::task::spawn_blocking(move || worker_state.store().save(&payload)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Save task failed: {}", e);
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED);
            }
        };

    if outcome.success {
        return Json(json!({
            "success": true,
            "message": THANK_YOU,
            "storage_methods": outcome.storage_methods,
        }))
        .into_response();
    }

    let mut body = json!({
        "success": false,
        "message": SAVE_FAILED,
    });
    // Backend errors carry file paths, so only local runs expose them
    if !state.environment.hosting {
        body["details"] = json!(outcome.details);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Decode a submission body, form-encoded or JSON
fn parse_payload(headers: &HeaderMap, body: &[u8]) -> Option<FeedbackPayload> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        return Some(FeedbackPayload::from_pairs(parse_form(body)));
    }

    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(FeedbackPayload::from_json)
}

/// Split an urlencoded body into decoded key/value pairs
fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    let decode = |raw: &str| {
        let spaced = raw.replace('+', " ");
        let decoded = urlencoding::decode(&spaced).map(|d| d.into_owned());
        decoded.unwrap_or(spaced)
    };

    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

async fn view_feedback(State(state): State<Arc<AppState>>) -> Response {
    match tokio::task::spawn_blocking(move || state.store().load_all()).await {
        Ok(view) => Json(json!({
            "success": true,
            "total": view.data.len(),
            "data": view.data,
            "source": view.source,
        }))
        .into_response(),
        Err(e) => {
            error!("Read task failed: {}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error reading feedback data: {}", e),
            )
        }
    }
}

async fn download_csv(State(state): State<Arc<AppState>>) -> Response {
    download(&state, BackendKind::Csv, "text/csv; charset=utf-8").await
}

async fn download_json(State(state): State<Arc<AppState>>) -> Response {
    download(&state, BackendKind::Json, "application/json").await
}

async fn download_excel(State(state): State<Arc<AppState>>) -> Response {
    download(
        &state,
        BackendKind::Excel,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    )
    .await
}

/// Send a backend's file as an attachment
async fn download(state: &AppState, kind: BackendKind, content_type: &'static str) -> Response {
    let path = state.files.path(kind).map(Path::to_path_buf);
    let not_found = || json_error(StatusCode::NOT_FOUND, format!("No {} feedback file found.", kind));

    let path = match path {
        Some(path) => path,
        None => return not_found(),
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(e) => {
            error!("Could not read {}: {}", path.display(), e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not read the feedback file.");
        }
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("feedback.{}", kind));

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from(bytes),
    )
        .into_response()
}

async fn fix_excel(State(state): State<Arc<AppState>>) -> Response {
    if state.environment.hosting {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Spreadsheet storage is not available in this environment.",
        );
    }

    let result = match tokio::task::spawn_blocking(move || state.store().repair()).await {
        Ok(result) => result,
        Err(e) => Err(StorageError::Join(e.to_string())),
    };

    match result {
        Ok(summary) => Json(json!({
            "success": true,
            "message": format!(
                "Spreadsheet repaired: {} unique rows kept, {} removed.",
                summary.unique_rows, summary.removed_rows
            ),
            "total_rows": summary.total_rows,
            "unique_rows": summary.unique_rows,
            "removed_rows": summary.removed_rows,
        }))
        .into_response(),
        Err(StorageError::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "No spreadsheet file found to repair.")
        }
        Err(StorageError::Unsupported(message)) => json_error(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            error!("Spreadsheet repair failed: {}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error repairing spreadsheet: {}", e),
            )
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let files = state.files.status();

    Json(json!({
        "status": "Server is running!",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.environment,
        "port": state.port,
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "files": files,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn form_bodies_decode_plus_and_percent() {
        let pairs = parse_form(b"name=Asha+K&liked_most=Design%20%26%20Craft&empty=&flag");
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "Asha K".to_string()),
                ("liked_most".to_string(), "Design & Craft".to_string()),
                ("empty".to_string(), String::new()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn content_type_selects_the_decoder() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        let payload = parse_payload(&headers, b"name=Ravi").unwrap();
        assert_eq!(payload.name, Some(Value::String("Ravi".to_string())));

        let payload = parse_payload(&HeaderMap::new(), br#"{"name":"Mira"}"#).unwrap();
        assert_eq!(payload.name, Some(Value::String("Mira".to_string())));

        assert!(parse_payload(&HeaderMap::new(), b"[1,2]").is_none());
        assert!(parse_payload(&HeaderMap::new(), b"not json").is_none());
    }

    #[tokio::test]
    async fn health_and_downloads_answer_while_a_save_holds_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::in_dir(dir.path());
        let store = FeedbackStore::for_environment(&Environment::hosted("render"), &paths);
        let state = Arc::new(AppState::new(store, Environment::hosted("render"), 8080));
        std::fs::write(&paths.csv, "Submission Date\n").unwrap();

        let _held = state.store();

        let Json(body) = health(State(Arc::clone(&state))).await;
        assert_eq!(body["files"]["csv"], true);
        assert_eq!(body["files"]["excel"], false);

        let response = download(&state, BackendKind::Csv, "text/csv").await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = download(&state, BackendKind::Excel, "application/octet-stream").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
