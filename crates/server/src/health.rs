use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use saralytics_core::data::TabularDataSource;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    data_source: Arc<dyn TabularDataSource>,
    manager_enabled: bool,
}

impl HealthState {
    pub fn new(data_source: Arc<dyn TabularDataSource>, manager_enabled: bool) -> Self {
        Self { data_source, manager_enabled }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub manager: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The data store decides readiness. A disabled manager only degrades agent chat,
/// so it is reported but does not fail the check.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.data_source.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "data store query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("data store query failed: {error}") }
        }
    };
    let manager = if state.manager_enabled {
        HealthCheck { status: "ready", detail: "manager classifier configured".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "manager api key not configured".to_string() }
    };
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "saralytics-server runtime initialized".to_string(),
        },
        database,
        manager,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use saralytics_db::{connect_writable, migrations, SqliteDataSource};
    use tempfile::TempDir;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_data_store_is_reachable() {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("sales.db").display());
        let pool = connect_writable(&url, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool.close().await;

        let source = Arc::new(SqliteDataSource::new(&url, 5).expect("source"));
        let (status, Json(payload)) = health(State(HealthState::new(source, false))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.manager.status, "disabled");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_data_file_is_absent() {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("absent.db").display());
        let source = Arc::new(SqliteDataSource::new(&url, 5).expect("source"));

        let (status, Json(payload)) = health(State(HealthState::new(source, true))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.manager.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }
}
