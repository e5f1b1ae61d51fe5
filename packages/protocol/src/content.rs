// ABOUTME: Result shape returned by every in-container RPC method
// ABOUTME: A list of text content blocks plus free-form metadata

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(default)]
    pub metadata: Value,
}

impl ToolResult {
    pub fn text(text: impl Into<String>, metadata: Value) -> Self {
        Self {
            content: vec![Content::text(text)],
            metadata,
        }
    }

    /// Text of the first content block, or an empty string
    pub fn first_text(&self) -> &str {
        self.content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default()
    }
}
