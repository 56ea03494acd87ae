//! Tabular data model shared by the data store adapter, the tools and the agents.
//!
//! The business dataset is a single read-only sales table. Everything above the
//! store sees it through [`TabularDataSource`], which always answers with rows and
//! absorbs store failures into an empty result.

use std::fmt;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Upper bound on rows embedded in a specialist prompt.
pub const SAMPLE_ROW_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Null | Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

/// One result row. Column order follows the query's projection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, ScalarValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, ScalarValue)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &ScalarValue> {
        self.cells.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>, V: Into<ScalarValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[async_trait]
pub trait TabularDataSource: Send + Sync {
    /// Runs `sql` with `params` bound positionally. Store failures are logged by the
    /// implementation and reported as an empty result.
    async fn query(&self, sql: &str, params: &[ScalarValue]) -> Vec<Row>;

    /// Reports whether the store can currently be reached.
    async fn ping(&self) -> Result<(), String>;
}

/// Random, bounded subset of a query result used to ground a prompt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSample {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl DataSample {
    pub fn draw(rows: Vec<Row>, limit: usize) -> Self {
        Self::draw_with(rows, limit, &mut rand::thread_rng())
    }

    pub fn draw_with<R: Rng + ?Sized>(mut rows: Vec<Row>, limit: usize, rng: &mut R) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().map(str::to_string).collect())
            .unwrap_or_default();
        if rows.len() > limit {
            rows.shuffle(rng);
            rows.truncate(limit);
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pipe table with a header row, one line per sampled row.
    pub fn to_markdown(&self) -> String {
        if self.columns.is_empty() {
            return "(no rows available)".to_string();
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(format!("| {} |", self.columns.join(" | ")));
        lines.push(format!("|{}|", vec!["---"; self.columns.len()].join("|")));
        for row in &self.rows {
            let cells = self
                .columns
                .iter()
                .map(|column| {
                    row.get(column).map(|value| value.to_string().replace('|', "\\|")).unwrap_or_default()
                })
                .collect::<Vec<_>>();
            lines.push(format!("| {} |", cells.join(" | ")));
        }
        lines.join("\n")
    }
}
