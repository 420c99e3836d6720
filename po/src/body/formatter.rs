//! Formatter capability
//!
//! The inverse of perception: turns raw tool output into cell values and
//! wraps values back into perceptual signs when an inference emits one.

use serde_json::Value;

use super::error::ToolError;
use crate::reference::{CellValue, PerceptualSign, SignNorm};

/// Parsing/wrapping helpers shared by paradigm steps
#[derive(Debug, Clone, Default)]
pub struct Formatter;

impl Formatter {
    pub fn new() -> Self {
        Self
    }

    /// Parse text as JSON; bare scalars that fail to parse become strings
    pub fn parse_json(&self, text: &str) -> Result<Value, ToolError> {
        let trimmed = text.trim();
        match serde_json::from_str(trimmed) {
            Ok(v) => Ok(v),
            Err(_) => Ok(Value::String(trimmed.to_string())),
        }
    }

    /// Strict JSON parse; malformed input is a formatter error
    pub fn parse_json_strict(&self, text: &str) -> Result<Value, ToolError> {
        serde_json::from_str(text.trim()).map_err(|e| ToolError::Formatter(format!("bad JSON: {e}")))
    }

    /// Wrap a value into a perceptual sign of the given norm
    pub fn wrap(&self, value: &Value, norm: SignNorm) -> PerceptualSign {
        let payload = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        PerceptualSign::new(norm, "", payload)
    }

    /// Select a key out of a JSON object
    pub fn get(&self, dict: &Value, key: &str) -> Result<Value, ToolError> {
        dict.get(key)
            .cloned()
            .ok_or_else(|| ToolError::Formatter(format!("key {key} not present")))
    }

    /// Decode a boolean out of loose model output ("true", "yes", JSON bool)
    pub fn parse_truth(&self, text: &str) -> Result<bool, ToolError> {
        let normalized = text.trim().trim_matches('"').to_ascii_lowercase();
        match normalized.as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(ToolError::Formatter(format!("not a truth value: {other}"))),
        }
    }

    /// Shape raw text per an output collection type from a paradigm name
    pub fn shape_output(&self, text: &str, collection: &str) -> Result<Vec<CellValue>, ToolError> {
        match collection {
            "Str" | "String" | "Text" => Ok(vec![CellValue::string(text.trim())]),
            "Json" | "Value" => Ok(vec![CellValue::from_leaf(self.parse_json(text)?)]),
            "Bool" | "TruthValue" => {
                let truth = self.parse_truth(text)?;
                Ok(vec![CellValue::Sign(PerceptualSign::truth(truth))])
            }
            "List" | "Array" => {
                let parsed = self.parse_json_strict(text)?;
                match parsed {
                    Value::Array(items) => Ok(items.into_iter().map(CellValue::from_leaf).collect()),
                    other => Ok(vec![CellValue::from_leaf(other)]),
                }
            }
            other => Err(ToolError::Formatter(format!("unknown output collection: {other}"))),
        }
    }
}
