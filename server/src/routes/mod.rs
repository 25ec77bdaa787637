//! Route definitions for the oracle fleet API

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::handlers::*;

pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

pub fn oracle_routes() -> Router<AppState> {
    Router::new()
        .route("/api", get(api_info))
        .route("/api/oracles", get(list_oracles))
}

pub fn app(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .merge(status_routes())
        .merge(oracle_routes())
        .fallback(not_found)
        .layer(build_cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed_origins = allowed_origins
        .iter()
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::health::FleetHealth;
    use crate::ledger::mock::{account, MockLedger};
    use crate::models::OracleIdentity;
    use crate::services::{IdentityRegistry, IndexAssignmentCache};

    fn state() -> AppState {
        let ledger = Arc::new(
            MockLedger::new()
                .with_indexes(account(1), [1, 2, 3])
                .with_indexes(account(2), [4, 5, 6]),
        );
        let registry = Arc::new(IdentityRegistry::from_identities(vec![
            OracleIdentity::new(account(1)),
            OracleIdentity::new(account(2)),
        ]));
        AppState::new(
            registry,
            Arc::new(IndexAssignmentCache::new(ledger)),
            Arc::new(FleetHealth::new()),
        )
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_tracks_listener() {
        let state = state();
        let origins = vec!["http://localhost:3000".to_string()];

        let (status, body) = get_json(app(state.clone(), &origins), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["listener_connected"], false);
        assert_eq!(body["registered_oracles"], 2);

        state.health.set_listener_connected(true);
        state.health.record_submission(true);
        let (status, body) = get_json(app(state, &origins), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["submissions_accepted"], 1);
    }

    #[tokio::test]
    async fn test_oracles_show_cached_indexes_only() {
        let state = state();
        state.cache.indexes_of(account(2)).await.unwrap();

        let (status, body) = get_json(app(state, &[]), "/api/oracles").await;

        assert_eq!(status, StatusCode::OK);
        let oracles = body["data"].as_array().unwrap();
        assert_eq!(oracles.len(), 2);
        assert_eq!(oracles[0]["account"], serde_json::to_value(account(1)).unwrap());
        assert!(oracles[0]["indexes"].is_null());
        assert_eq!(oracles[1]["indexes"], serde_json::json!([4, 5, 6]));
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, body) = get_json(app(state(), &[]), "/api/flights").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "route not found");
    }

    #[tokio::test]
    async fn test_api_probe() {
        let (status, body) = get_json(app(state(), &[]), "/api").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "An API for use with your Dapp!");
    }
}
