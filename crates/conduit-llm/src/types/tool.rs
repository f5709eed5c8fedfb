use serde::{Deserialize, Serialize};

use super::schema::Schema;

/// Definition of a tool the model can call
///
/// Only the description of the tool lives here; executing it is up to the
/// caller, who feeds the output back as a [`ToolResult`](super::ToolResult).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Parameter schema; its `properties` describe the arguments
    #[serde(default)]
    pub schema: Schema,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}
