use std::path::PathBuf;

use async_trait::async_trait;
use saralytics_core::data::{Row, ScalarValue, TabularDataSource};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, Sqlite, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{error, warn};

use crate::connection::{database_file, read_only_options};

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("database file not found at `{0}`")]
    MissingDatabase(PathBuf),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only SQLite view of the sales dataset.
///
/// Every query opens its own connection and closes it before returning, so a
/// store that disappears between requests is detected on the next call.
#[derive(Clone, Debug)]
pub struct SqliteDataSource {
    options: SqliteConnectOptions,
    database_file: Option<PathBuf>,
}

impl SqliteDataSource {
    pub fn new(database_url: &str, timeout_secs: u64) -> Result<Self, sqlx::Error> {
        Ok(Self {
            options: read_only_options(database_url, timeout_secs)?,
            database_file: database_file(database_url),
        })
    }

    pub async fn try_query(
        &self,
        sql: &str,
        params: &[ScalarValue],
    ) -> Result<Vec<Row>, DataSourceError> {
        self.ensure_file()?;

        let mut query = sqlx::query::<Sqlite>(sql);
        for param in params {
            query = match param {
                ScalarValue::Null => query.bind(None::<String>),
                ScalarValue::Integer(value) => query.bind(*value),
                ScalarValue::Real(value) => query.bind(*value),
                ScalarValue::Text(value) => query.bind(value.clone()),
            };
        }

        let mut connection = self.options.connect().await?;
        let fetched = query.fetch_all(&mut connection).await;
        if let Err(close_error) = connection.close().await {
            warn!(
                event_name = "data_source.connection.close_failed",
                error = %close_error,
                "failed to close data source connection cleanly"
            );
        }

        fetched?.iter().map(decode_row).collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn ensure_file(&self) -> Result<(), DataSourceError> {
        match &self.database_file {
            Some(path) if !path.exists() => Err(DataSourceError::MissingDatabase(path.clone())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TabularDataSource for SqliteDataSource {
    async fn query(&self, sql: &str, params: &[ScalarValue]) -> Vec<Row> {
        match self.try_query(sql, params).await {
            Ok(rows) => rows,
            Err(error) => {
                error!(
                    event_name = "data_source.query.failed",
                    error = %error,
                    "data source query failed; returning empty result"
                );
                Vec::new()
            }
        }
    }

    async fn ping(&self) -> Result<(), String> {
        self.try_query("SELECT 1 AS ok", &[]).await.map(|_| ()).map_err(|error| error.to_string())
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, sqlx::Error> {
    row.columns()
        .iter()
        .map(|column| Ok((column.name().to_string(), decode_cell(row, column.ordinal())?)))
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map(Row::new)
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<ScalarValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(ScalarValue::Null);
    }

    let type_name = raw.type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "INTEGER" | "INT8" | "BIGINT" | "BOOLEAN" => {
            row.try_get_unchecked::<i64, _>(index).map(ScalarValue::Integer)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get_unchecked::<f64, _>(index).map(ScalarValue::Real)
        }
        _ => row.try_get_unchecked::<String, _>(index).map(ScalarValue::Text),
    }
}
