use super::handlers::{self, AppState};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Replication admin
        .route("/replication/status", get(handlers::replication_status))
        .route("/replication/controls", get(handlers::replication_controls))
        .route(
            "/replication/control/{name}",
            post(handlers::replication_control),
        )
        // Read path, answered only while in sync with the master
        .route("/kv/get/{key}", get(handlers::kv_get))
        .route("/kv/stats", get(handlers::kv_stats))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KVConfig, KVStore, Store};
    use crate::replication::{BackoffConfig, RecoveryAction, ReplicationConfig, ReplicationSlave};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    /// Slave pointed at a port nobody listens on, so it never serves
    async fn test_state() -> (AppState, Arc<KVStore>) {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let kv_store = Arc::new(KVStore::new(KVConfig::default()));
        let replication = ReplicationConfig {
            master_host: "127.0.0.1".to_string(),
            master_port: port,
            ..Default::default()
        };
        let backoff = BackoffConfig {
            initial_timeout_ms: 60_000,
            ..Default::default()
        };
        let actions: Vec<Arc<dyn RecoveryAction>> = Vec::new();
        let slave =
            ReplicationSlave::start_with_actions(kv_store.clone(), replication, backoff, actions)
                .unwrap();

        (
            AppState {
                slave,
                kv_store: kv_store.clone(),
            },
            kv_store,
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_kv_get_refused_while_not_serving() {
        let (state, kv_store) = test_state().await;
        kv_store.set("a", b"1".to_vec(), 0, 0).unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(Request::get("/kv/get/a").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_and_controls() {
        let (state, _) = test_state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::get("/replication/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["serving"], false);
        assert_eq!(json["given_up"], false);

        let response = app
            .oneshot(
                Request::get("/replication/controls")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["failover-reset", "new-master"]);
    }

    #[tokio::test]
    async fn test_control_errors_are_bad_requests() {
        let (state, _) = test_state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::post("/replication/control/new-master")
                    .body(Body::from("only-a-host"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::post("/replication/control/promote")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_new_master_control() {
        let (state, _) = test_state().await;
        let slave = state.slave.clone();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::post("/replication/control/new-master")
                    .body(Body::from("db-7 16001"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["result"].as_str().unwrap().contains("db-7:16001"));
        assert_eq!(slave.status().master, "db-7:16001");
    }
}
