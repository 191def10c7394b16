//! REST surface for the reading store, plus the inline dashboard page.
//! Every store fault is caught here and mapped to a status; nothing panics
//! the process.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use telemetry_core::ReadingPatch;

use crate::AppState;
use crate::store::StoreError;
use crate::ui;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/data", post(post_reading).get(get_reading))
        .route("/dashboard", get(ui::dashboard))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn welcome() -> impl IntoResponse {
    Json(json!({
        "message": "Sensor data server is working. Use /data to interact with the API."
    }))
}

async fn post_reading(
    State(state): State<AppState>,
    Json(patch): Json<ReadingPatch>,
) -> Response {
    match state.store.put_reading(&patch).await {
        Ok(stored) => Json(json!({
            "message": "Data created/updated successfully.",
            "data": stored,
        }))
        .into_response(),
        Err(err) => error_response(err, "Failed to update data."),
    }
}

async fn get_reading(State(state): State<AppState>) -> Response {
    match state.store.latest_reading().await {
        Ok(stored) => Json(json!({
            "message": "Data fetched successfully.",
            "data": stored,
        }))
        .into_response(),
        Err(err) => error_response(err, "Failed to fetch data."),
    }
}

fn error_response(err: StoreError, failure_message: &str) -> Response {
    match err {
        StoreError::EmptyUpdate => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Request body cannot be empty." })),
        )
            .into_response(),
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No data found. Please POST data to create an entry." })),
        )
            .into_response(),
        StoreError::Unavailable(source) => {
            tracing::error!(%source, "store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": failure_message,
                    "error": source.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReadingStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header::CONTENT_TYPE};
    use tower::ServiceExt;

    fn test_app() -> Router {
        router(AppState {
            store: ReadingStore::in_memory(),
        })
    }

    #[tokio::test]
    async fn welcome_route_responds() {
        let res = test_app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_body_is_a_bad_request() {
        let res = test_app()
            .oneshot(
                Request::post("/data")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn data_lifecycle_over_http() {
        let app = test_app();

        // Nothing written yet.
        let res = app
            .clone()
            .oneshot(Request::get("/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        // Partial update creates the document.
        let res = app
            .clone()
            .oneshot(
                Request::post("/data")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"panelTemp": 45.2, "power": 350.5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        // Fetch returns the merged document with schema defaults.
        let res = app
            .oneshot(Request::get("/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Data fetched successfully.");
        assert_eq!(body["data"]["panelTemp"], 45.2);
        assert_eq!(body["data"]["power"], 350.5);
        assert_eq!(body["data"]["panelDirection"], "South");
        assert_eq!(body["data"]["sensorHealth"], "OK");
        assert!(body["data"]["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn dashboard_serves_html() {
        let res = test_app()
            .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
