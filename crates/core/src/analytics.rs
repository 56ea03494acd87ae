//! Aggregations behind the dashboard charts.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::data::Row;

pub const SALES_OVER_TIME_QUERY: &str = "SELECT DOCDT, TOTALITEMVALUE FROM SALEINVOICE";
pub const SALES_BY_ITEM_QUERY: &str = "SELECT ITEMNAME, TOTALITEMVALUE FROM SALEINVOICE";
pub const QUANTITY_BY_SIZE_QUERY: &str = "SELECT ITEMSIZE, QUANTITY FROM SALEINVOICE";

pub const TOP_N: usize = 15;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Monthly revenue totals labelled `YYYY-MM`. Months without sales between the
/// first and last sale are reported as zero. Rows with an unreadable date are skipped.
pub fn monthly_totals(rows: &[Row], date_column: &str, value_column: &str) -> ChartSeries {
    let mut totals = BTreeMap::<(i32, u32), f64>::new();
    for row in rows {
        let Some(date) = row.get(date_column).and_then(|value| value.as_text()).and_then(parse_date)
        else {
            continue;
        };
        let value = row.get(value_column).and_then(|value| value.as_f64()).unwrap_or(0.0);
        *totals.entry((date.year(), date.month())).or_default() += value;
    }

    let (Some(&first), Some(&last)) = (totals.keys().next(), totals.keys().next_back()) else {
        return ChartSeries::default();
    };

    let mut series = ChartSeries::default();
    let mut cursor = first;
    while cursor <= last {
        series.labels.push(format!("{:04}-{:02}", cursor.0, cursor.1));
        series.data.push(totals.get(&cursor).copied().unwrap_or(0.0));
        cursor = if cursor.1 == 12 { (cursor.0 + 1, 1) } else { (cursor.0, cursor.1 + 1) };
    }
    series
}

/// Sums `value_column` per distinct `label_column`, largest first, truncated to `limit`.
/// Ties keep the label that appeared first in the input.
pub fn top_totals(rows: &[Row], label_column: &str, value_column: &str, limit: usize) -> ChartSeries {
    let mut order = Vec::<String>::new();
    let mut totals = HashMap::<String, f64>::new();
    for row in rows {
        let Some(label) = row.get(label_column).filter(|value| !value.is_null()) else {
            continue;
        };
        let label = label.to_string();
        let value = row.get(value_column).and_then(|value| value.as_f64()).unwrap_or(0.0);
        if !totals.contains_key(&label) {
            order.push(label.clone());
        }
        *totals.entry(label).or_default() += value;
    }

    let mut ranked =
        order.into_iter().map(|label| (totals[&label], label)).collect::<Vec<(f64, String)>>();
    ranked.sort_by(|left, right| right.0.total_cmp(&left.0));
    ranked.truncate(limit);

    ChartSeries {
        labels: ranked.iter().map(|(_, label)| label.clone()).collect(),
        data: ranked.iter().map(|(total, _)| *total).collect(),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().map(|dt| dt.date()))
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok().map(|dt| dt.date()))
}
