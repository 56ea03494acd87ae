use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use saralytics_core::data::{ScalarValue, TabularDataSource};
use saralytics_core::domain::tool::{ToolInvocationRequest, ToolResult, PROFIT_ANALYSIS_TOOL};
use serde_json::{json, Map, Value};
use tracing::info;

pub const PROFIT_ANALYSIS_QUERY: &str =
    "SELECT TOTALITEMVALUE, MCODE FROM SALEINVOICE WHERE ITEMNAME = ?";

/// A deterministic function a specialist may call instead of guessing a figure.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn required_parameters(&self) -> &'static [&'static str];

    /// Called only after the registry checked `required_parameters`.
    async fn execute(&self, parameters: &Map<String, Value>) -> ToolResult;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    /// True when the request names a registered tool and carries every required
    /// parameter.
    pub fn accepts(&self, request: &ToolInvocationRequest) -> bool {
        self.tools.get(&request.tool_name).is_some_and(|tool| {
            missing_parameter(tool.required_parameters(), &request.parameters).is_none()
        })
    }

    /// Never fails: unknown tools and missing parameters come back as error-shaped
    /// results.
    pub async fn invoke(&self, tool_name: &str, parameters: &Map<String, Value>) -> ToolResult {
        let Some(tool) = self.tools.get(tool_name) else {
            return ToolResult::error(tool_name, format!("unknown tool `{tool_name}`"));
        };
        if let Some(parameter) = missing_parameter(tool.required_parameters(), parameters) {
            return ToolResult::error(
                tool_name,
                format!("missing required parameter `{parameter}`"),
            );
        }

        let result = tool.execute(parameters).await;
        info!(
            event_name = "agent.tool.invoked",
            tool_name,
            status = ?result.status,
            "tool invocation completed"
        );
        result
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn missing_parameter<'a>(
    required: &'a [&'a str],
    parameters: &Map<String, Value>,
) -> Option<&'a str> {
    required.iter().copied().find(|name| match parameters.get(*name) {
        None | Some(Value::Null) => true,
        Some(Value::String(value)) => value.trim().is_empty(),
        Some(_) => false,
    })
}

/// Exact revenue and profit totals for one item, matched by name.
pub struct ProfitAnalysisTool {
    data_source: Arc<dyn TabularDataSource>,
}

impl ProfitAnalysisTool {
    pub fn new(data_source: Arc<dyn TabularDataSource>) -> Self {
        Self { data_source }
    }
}

#[async_trait]
impl Tool for ProfitAnalysisTool {
    fn name(&self) -> &'static str {
        PROFIT_ANALYSIS_TOOL
    }

    fn required_parameters(&self) -> &'static [&'static str] {
        &["item_name"]
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> ToolResult {
        let Some(item_name) = parameters.get("item_name").and_then(Value::as_str) else {
            return ToolResult::error(PROFIT_ANALYSIS_TOOL, "`item_name` must be a string");
        };

        let rows = self
            .data_source
            .query(PROFIT_ANALYSIS_QUERY, &[ScalarValue::from(item_name)])
            .await;
        if rows.is_empty() {
            return ToolResult::no_data(
                PROFIT_ANALYSIS_TOOL,
                format!("No data found for item '{item_name}'."),
            );
        }

        let column_total = |column: &str| -> f64 {
            rows.iter().filter_map(|row| row.get(column).and_then(ScalarValue::as_f64)).sum()
        };
        let total_revenue = column_total("TOTALITEMVALUE");
        let total_profit = column_total("MCODE");
        let margin = profit_margin(total_revenue, total_profit);

        ToolResult::success(
            PROFIT_ANALYSIS_TOOL,
            json!({
                "item_name": item_name,
                "currency": "INR",
                "number_of_sales": rows.len(),
                "total_revenue": total_revenue,
                "total_profit": total_profit,
                "profit_margin_percent": margin,
                "formatted": {
                    "total_revenue": format_rupees(total_revenue),
                    "total_profit": format_rupees(total_profit),
                    "profit_margin": format!("{margin:.2}%"),
                },
            }),
        )
    }
}

/// Percentage of revenue kept as profit; zero revenue yields a zero margin.
pub fn profit_margin(revenue: f64, profit: f64) -> f64 {
    if revenue == 0.0 {
        0.0
    } else {
        profit * 100.0 / revenue
    }
}

/// `1234567.5` → `₹1,234,567.50`.
pub fn format_rupees(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}₹{grouped}.{fraction}")
}
