use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use itemupdate_core::load_config_from_str;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let config = load_config_from_str(
            r#"
[storage]
connection_string = "AccountName=acct;AccountKey=c2VjcmV0"

[institution_api]
endpoint = "https://institutions.example/api"
api_key = "static-secret"
"#,
        )
        .unwrap();
        Arc::new(AppState::new(config, None))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(create_router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["worker"].is_null());
    }

    #[tokio::test]
    async fn test_config_hides_secrets() {
        let (status, body) = get(create_router(test_state()), "/config").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("static-secret"));
        assert!(!body.contains("c2VjcmV0"));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["institution_api"]["api_key_configured"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(test_state());
        // Hit a route first so the HTTP counters have a sample.
        get(router.clone(), "/health").await;

        let (status, body) = get(router, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("itemupdate_http_requests_total"));
        assert!(body.contains("itemupdate_worker_running"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = get(create_router(test_state()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
