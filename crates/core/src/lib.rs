//! Shared domain model for the Saralytics analytics assistant: configuration,
//! error taxonomy, specialist profiles, tool contracts and the tabular data model.

pub mod analytics;
pub mod config;
pub mod data;
pub mod domain;
pub mod errors;

pub use data::{DataSample, Row, ScalarValue, TabularDataSource, SAMPLE_ROW_LIMIT};
pub use domain::conversation::{ConversationTurn, Role};
pub use domain::specialist::{SpecialistCatalog, SpecialistId, SpecialistProfile};
pub use domain::tool::{ToolInvocationRequest, ToolResult, ToolStatus, PROFIT_ANALYSIS_TOOL};
pub use errors::{ApplicationError, InterfaceError};
