use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use leetboard_core::export::render_csv;
use leetboard_core::pins::PinStore;
use leetboard_core::snapshot::{load_snapshot, read_snapshot_raw};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Served before the first refresh cycle has produced a snapshot.
const EMPTY_SNAPSHOT: &str = "[]";

#[derive(Clone)]
pub struct AppState {
    snapshot_path: Arc<PathBuf>,
    pins: Arc<PinStore>,
}

impl AppState {
    pub fn new(snapshot_path: PathBuf, pins_path: PathBuf) -> Self {
        Self {
            snapshot_path: Arc::new(snapshot_path),
            pins: Arc::new(PinStore::new(pins_path)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CsvQuery {
    pub section: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data", get(get_data))
        .route("/data.csv", get(get_data_csv))
        .route("/pin/{roll}", post(toggle_pin))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener.local_addr().context("failed to read bound address")?;
    info!("listening on http://{local_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

pub async fn get_data(State(state): State<AppState>) -> Response {
    let path = Arc::clone(&state.snapshot_path);
    let result = tokio::task::spawn_blocking(move || read_snapshot_raw(&path)).await;
    match result {
        Ok(Ok(Some(content))) => json_body(content),
        Ok(Ok(None)) => json_body(EMPTY_SNAPSHOT.to_string()),
        Ok(Err(error)) => internal_error("failed to read snapshot", error),
        Err(error) => internal_error("snapshot reader panicked", error.into()),
    }
}

pub async fn get_data_csv(
    State(state): State<AppState>,
    Query(query): Query<CsvQuery>,
) -> Response {
    let path = Arc::clone(&state.snapshot_path);
    let section = query.section.filter(|section| !section.trim().is_empty());
    let result = tokio::task::spawn_blocking(move || {
        let records = load_snapshot(&path)?.unwrap_or_default();
        render_csv(&records, section.as_deref())
    })
    .await;
    match result {
        Ok(Ok(csv)) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"leaderboard.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Ok(Err(error)) => internal_error("failed to export snapshot", error),
        Err(error) => internal_error("CSV export panicked", error.into()),
    }
}

pub async fn toggle_pin(State(state): State<AppState>, Path(roll): Path<String>) -> Response {
    let pins = Arc::clone(&state.pins);
    let toggled_roll = roll.clone();
    let result = tokio::task::spawn_blocking(move || pins.toggle(&toggled_roll)).await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => Err(anyhow::Error::from(error).context("pin toggle panicked")),
    };
    match outcome {
        Ok(toggle) => Json(PinResponse {
            success: true,
            message: toggle.message(roll.trim()),
        })
        .into_response(),
        Err(error) => {
            let message = format!("{error:#}");
            error!(%roll, error = %message, "pin toggle failed");
            let status = if roll.trim().is_empty() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(PinResponse {
                    success: false,
                    message,
                }),
            )
                .into_response()
        }
    }
}

fn json_body(content: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], content).into_response()
}

fn internal_error(context: &str, error: anyhow::Error) -> Response {
    let message = format!("{context}: {error:#}");
    error!(error = %message, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::to_bytes;
    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;

    fn state(dir: &std::path::Path) -> AppState {
        AppState::new(dir.join("data.json"), dir.join("pinned.json"))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn data_is_an_empty_array_before_the_first_cycle() {
        let temp = tempdir().expect("tempdir");
        let response = get_data(State(state(temp.path()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn data_serves_the_snapshot_verbatim() {
        let temp = tempdir().expect("tempdir");
        let snapshot = "[\n  {\n    \"roll\": \"1\"\n  }\n]";
        fs::write(temp.path().join("data.json"), snapshot).expect("write");

        let response = get_data(State(state(temp.path()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, snapshot);
    }

    #[tokio::test]
    async fn pin_endpoint_toggles_and_reports() {
        let temp = tempdir().expect("tempdir");
        let state = state(temp.path());

        let first = toggle_pin(State(state.clone()), Path("21".to_string())).await;
        assert_eq!(first.status(), StatusCode::OK);
        let first: PinResponse =
            serde_json::from_str(&body_text(first).await).expect("json");
        assert_eq!(
            first,
            PinResponse {
                success: true,
                message: "Student 21 pinned.".to_string(),
            }
        );
        assert!(PinStore::new(temp.path().join("pinned.json")).read().contains("21"));

        let second = toggle_pin(State(state), Path("21".to_string())).await;
        let second: PinResponse =
            serde_json::from_str(&body_text(second).await).expect("json");
        assert_eq!(second.message, "Student 21 unpinned.");
        assert!(PinStore::new(temp.path().join("pinned.json")).read().is_empty());
    }

    #[tokio::test]
    async fn pin_endpoint_rejects_blank_rolls() {
        let temp = tempdir().expect("tempdir");
        let response = toggle_pin(State(state(temp.path())), Path(" ".to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn csv_export_filters_by_section() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("data.json"),
            r#"[
  {"roll": "1", "name": "A", "url": "u1", "section": "S1", "pinned": false},
  {"roll": "2", "name": "B", "url": "u2", "section": "S2", "pinned": false,
   "username": "b", "totalSolved": 3, "easySolved": 1, "mediumSolved": 1, "hardSolved": 1}
]"#,
        )
        .expect("write");

        let response = get_data_csv(
            State(state(temp.path())),
            Query(CsvQuery {
                section: Some("S2".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        let lines = body.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1,2,B,S2,3,1,1,1,u2");
    }

    #[tokio::test]
    async fn csv_export_reports_corrupt_snapshots() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("data.json"), "{").expect("write");
        let response = get_data_csv(State(state(temp.path())), Query(CsvQuery::default())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn responses_allow_any_origin() {
        let response = allow_any_origin(StatusCode::OK.into_response()).await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
