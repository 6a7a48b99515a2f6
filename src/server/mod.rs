//! HTTP upload endpoint.
//!
//! Accepts an ORU batch as a multipart upload and answers with the flagged
//! results as a JSON array.

mod error;
mod handlers;

pub use error::AppError;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::engine::BatchEvaluator;

#[derive(Debug, Clone)]
pub struct AppState {
    pub evaluator: BatchEvaluator,
    /// Multipart part carrying the ORU file
    pub upload_field: String,
}

/// Build the service router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/upload", post(handlers::upload))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::Gender;
    use crate::reference::{Condition, MetricDefinition, ReferenceTable};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use indexmap::IndexSet;
    use tower::ServiceExt;

    const BOUNDARY: &str = "oru-risk-test-boundary";
    const UPLOAD: &str = "MSH|^~\\&|LAB|SONIC|EVERLAB|EVERLAB|20240101||ORU^R01|1|P|2.5\r\
PID|1||12345||DOE^JANE||19900615|F\r\
OBX|1|NM|Glucose^GLU||150|mg/dL\n";

    fn app(max_upload_bytes: usize) -> Router {
        let table = ReferenceTable::new(
            vec![MetricDefinition {
                name: "glucose".to_string(),
                sonic_codes: IndexSet::from(["GLU".to_string()]),
                sonic_units: IndexSet::from(["mg/dL".to_string()]),
                min_age: None,
                max_age: None,
                gender: Gender::Any,
                everlab_lower: Some("70".to_string()),
                everlab_higher: Some("99".to_string()),
                standard_lower: None,
                standard_higher: None,
            }],
            vec![Condition {
                name: "Diabetes".to_string(),
                diagnostic_metric: "glucose".to_string(),
            }],
        );
        let state = AppState {
            evaluator: BatchEvaluator::new(Arc::new(table)),
            upload_field: "oruFile".to_string(),
        };
        router(state, max_upload_bytes)
    }

    fn multipart_request(field: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"batch.oru\"\r\n\
Content-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = field,
            c = contents
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_returns_flagged_results() {
        let response = app(1024 * 1024)
            .oneshot(multipart_request("oruFile", UPLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["condition"], "Diabetes");
        assert_eq!(json[0]["testName"], "Glucose");
        assert_eq!(json[0]["observedValue"], "150");
        assert_eq!(json[0]["everlabRange"], "70 - 99");
        assert_eq!(json[0]["standardRange"], "N/A - N/A");
    }

    #[tokio::test]
    async fn upload_with_nothing_flagged_returns_empty_array() {
        let within = UPLOAD.replace("||150|", "||85|");
        let response = app(1024 * 1024)
            .oneshot(multipart_request("oruFile", &within))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_file_part_is_rejected() {
        let response = app(1024 * 1024)
            .oneshot(multipart_request("otherFile", UPLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn non_multipart_body_gets_json_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .body(Body::from(UPLOAD))
            .unwrap();
        let response = app(1024 * 1024).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let response = app(1024 * 1024)
            .oneshot(multipart_request("oruFile", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let large = UPLOAD.repeat(200);
        let response = app(1024)
            .oneshot(multipart_request("oruFile", &large))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let app = app(1024);

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_body(health).await["status"], "healthy");

        let ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(ready).await;
        assert_eq!(json["metrics"], 1);
        assert_eq!(json["conditions"], 1);
        assert_eq!(json["scope"], "first");
    }
}
