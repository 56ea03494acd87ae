use std::sync::Arc;

use saralytics_agent::AgentRuntime;
use saralytics_core::config::AppConfig;
use saralytics_core::data::TabularDataSource;
use saralytics_db::{database_file, SqliteDataSource};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub data_source: Arc<dyn TabularDataSource>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid database url: {0}")]
    DatabaseUrl(#[source] sqlx::Error),
}

/// Builds the process-wide collaborators once. Nothing here touches the network;
/// a missing data file or manager key degrades features instead of failing startup.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let data_source: Arc<dyn TabularDataSource> = Arc::new(
        SqliteDataSource::new(&config.database.url, config.database.timeout_secs)
            .map_err(BootstrapError::DatabaseUrl)?,
    );
    if let Some(path) = database_file(&config.database.url).filter(|path| !path.exists()) {
        warn!(
            event_name = "system.bootstrap.database_missing",
            correlation_id = "bootstrap",
            path = %path.display(),
            "database file not found; data endpoints will report no data"
        );
    }

    let runtime = Arc::new(AgentRuntime::from_config(&config, data_source.clone()));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        manager_enabled = runtime.manager_enabled(),
        specialist_model = %config.specialist.model,
        "application bootstrap complete"
    );

    Ok(Application { config, data_source, runtime })
}
