use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROFIT_ANALYSIS_TOOL: &str = "get_profit_analysis_for_item";

/// A tool call requested by a model through structured output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolInvocationRequest {
    /// Returns `None` for anything that is not a JSON object carrying a `tool_name`.
    /// Callers treat that as a direct answer.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = strip_code_fence(raw.trim());
        let request = serde_json::from_str::<Self>(body).ok()?;
        (!request.tool_name.trim().is_empty()).then_some(request)
    }

    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    NoData,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, data: Value) -> Self {
        Self { tool_name: tool_name.into(), status: ToolStatus::Success, data: Some(data), message: None }
    }

    pub fn no_data(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::NoData,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}
