use std::fmt;

use serde::Serialize;

pub mod email;
pub use email::SendEmailTool;

/// Outcome of a tool call, serialized as the content of the tool
/// message fed back to the model.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            error: None,
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", serde_json::json!(self))
    }
}
