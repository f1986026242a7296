//! REST observation server: exposes the tunnel data store's read and
//! close-by-id interfaces over HTTP for an external collaborator.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tunnel_proto::store::DataStore;

fn build_router(store: DataStore) -> Router {
    Router::new()
        .route("/tunnels", get(get_all_tunnels))
        .route("/tunnels/{id}", get(get_one_tunnel))
        .route("/tunnels/{id}/close_tunnel", put(close_tunnel))
        .with_state(store)
}

async fn get_all_tunnels(State(store): State<DataStore>) -> impl IntoResponse {
    let snapshots = store.load_all();
    tracing::debug!("GET /tunnels -> {} entries", snapshots.len());
    Json(snapshots)
}

async fn get_one_tunnel(State(store): State<DataStore>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match store.load_one(id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => {
            tracing::debug!("GET /tunnels/{} -> not found", id);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn close_tunnel(State(store): State<DataStore>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if store.close(id) {
        tracing::info!("PUT /tunnels/{}/close_tunnel -> closed", id);
        StatusCode::OK
    } else {
        tracing::debug!("PUT /tunnels/{}/close_tunnel -> not found", id);
        StatusCode::NOT_FOUND
    }
}

/// Binds `listen_addr` and serves the observation API until `cancel` fires.
pub async fn run(listen_addr: SocketAddr, store: DataStore, cancel: CancellationToken) -> eyre::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("rest observation server listening on {}", listen_addr);

    let app = build_router(store);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower::ServiceExt;

    use super::*;
    use tunnel_proto::{store::TunnelHandle, tunnel::Role};

    struct NoopHandle;
    impl TunnelHandle for NoopHandle {
        fn close(&self) {}
    }

    fn snapshot(id: Uuid) -> tunnel_proto::store::TunnelSnapshot {
        tunnel_proto::store::TunnelSnapshot {
            id,
            stream_id: 0,
            endpoint_role: Role::Client,
            client_app_addr: Some("127.0.0.1:1".into()),
            server_app_addr: None,
            remote_endpoint_addr: "127.0.0.1:2".into(),
            created_at: "now".into(),
            send_total: 0,
            recv_total: 0,
            protocol: None,
            protocol_properties: None,
        }
    }

    #[tokio::test]
    async fn get_all_tunnels_reflects_store_contents() {
        let store = DataStore::new();
        let id = Uuid::new_v4();
        store.store(id, snapshot(id), Arc::new(NoopHandle));

        let router = build_router(store);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tunnels")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_one_tunnel_returns_404_for_unknown_id() {
        let store = DataStore::new();
        let router = build_router(store);

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/tunnels/{}", Uuid::new_v4()))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn close_tunnel_is_idempotent_after_first_success() {
        let store = DataStore::new();
        let id = Uuid::new_v4();
        store.store(id, snapshot(id), Arc::new(NoopHandle));

        let router = build_router(store.clone());
        let first = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("PUT")
                    .uri(format!("/tunnels/{id}/close_tunnel"))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        store.delete(id);

        let second = router
            .oneshot(
                axum::http::Request::builder()
                    .method("PUT")
                    .uri(format!("/tunnels/{id}/close_tunnel"))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }
}
