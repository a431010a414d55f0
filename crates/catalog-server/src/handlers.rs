use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Catalog Server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once every manager is built and the upload spool is writable.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let dir = state.spool_dir.as_ref().clone();
    // Anonymous file; the OS reclaims it when dropped.
    let writable = tokio::task::spawn_blocking(move || tempfile::tempfile_in(&dir).is_ok())
        .await
        .unwrap_or(false);

    if writable {
        return (StatusCode::OK, Json(HealthResponse { status: "ready" }));
    }
    tracing::warn!(path = %state.spool_dir.display(), "upload directory unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse { status: "unavailable" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio_test::block_on;

    use crate::assets::MemoryAssetStore;
    use crate::config::AppConfig;
    use crate::resources::Catalog;

    fn state(spool_dir: PathBuf) -> AppState {
        let catalog = block_on(Catalog::build(
            catalog_db_memory::create_store(),
            Arc::new(MemoryAssetStore::new()),
            &AppConfig::default(),
        ))
        .unwrap();
        AppState {
            catalog: Arc::new(catalog),
            spool_dir: Arc::new(spool_dir),
        }
    }

    #[test]
    fn health_endpoints_answer_ok() {
        assert_eq!(block_on(root()).into_response().status(), StatusCode::OK);
        assert_eq!(block_on(healthz()).into_response().status(), StatusCode::OK);
    }

    #[test]
    fn readiness_tracks_upload_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ready = block_on(readyz(State(state(dir.path().to_path_buf()))));
        assert_eq!(ready.into_response().status(), StatusCode::OK);

        let missing = dir.path().join("gone");
        let unready = block_on(readyz(State(state(missing))));
        assert_eq!(unready.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readiness_requires_a_writable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("spool");
        std::fs::write(&not_a_dir, b"occupied").unwrap();

        let catalog = Catalog::build(
            catalog_db_memory::create_store(),
            Arc::new(MemoryAssetStore::new()),
            &AppConfig::default(),
        )
        .await
        .unwrap();
        let state = AppState {
            catalog: Arc::new(catalog),
            spool_dir: Arc::new(not_a_dir),
        };
        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
