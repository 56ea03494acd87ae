use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use saralytics_core::analytics::{
    monthly_totals, top_totals, ChartSeries, QUANTITY_BY_SIZE_QUERY, SALES_BY_ITEM_QUERY,
    SALES_OVER_TIME_QUERY, TOP_N,
};
use saralytics_core::data::TabularDataSource;
use serde_json::json;
use tracing::info;

pub const DATA_NOT_AVAILABLE: &str = "Data not available.";

#[derive(Clone)]
pub struct DashboardState {
    data_source: Arc<dyn TabularDataSource>,
}

pub fn router(data_source: Arc<dyn TabularDataSource>) -> Router {
    Router::new()
        .route("/api/sales_over_time/", get(sales_over_time))
        .route("/api/sales_by_item/", get(sales_by_item))
        .route("/api/quantity_by_size/", get(quantity_by_size))
        .with_state(DashboardState { data_source })
}

async fn sales_over_time(State(state): State<DashboardState>) -> impl IntoResponse {
    let rows = state.data_source.query(SALES_OVER_TIME_QUERY, &[]).await;
    chart_response("sales_over_time", monthly_totals(&rows, "DOCDT", "TOTALITEMVALUE"))
}

async fn sales_by_item(State(state): State<DashboardState>) -> impl IntoResponse {
    let rows = state.data_source.query(SALES_BY_ITEM_QUERY, &[]).await;
    chart_response("sales_by_item", top_totals(&rows, "ITEMNAME", "TOTALITEMVALUE", TOP_N))
}

async fn quantity_by_size(State(state): State<DashboardState>) -> impl IntoResponse {
    let rows = state.data_source.query(QUANTITY_BY_SIZE_QUERY, &[]).await;
    chart_response("quantity_by_size", top_totals(&rows, "ITEMSIZE", "QUANTITY", TOP_N))
}

/// An empty series is still a 200: the dashboard renders the message in place of
/// the chart.
fn chart_response(chart: &'static str, series: ChartSeries) -> Response {
    if series.is_empty() {
        info!(event_name = "http.dashboard.no_data", chart, "chart has no data");
        return Json(json!({ "error": DATA_NOT_AVAILABLE })).into_response();
    }
    Json(series).into_response()
}
