//! Prompt-template capability

use std::collections::BTreeMap;
use std::path::Path;

use handlebars::Handlebars;

use super::error::ToolError;
use super::fs::FileSystem;

/// Reads prompt templates from provisions and renders them with handlebars
#[derive(Clone)]
pub struct PromptTool {
    fs: FileSystem,
}

impl PromptTool {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    /// Load a template from a prompt location
    pub async fn read(&self, path: &Path) -> Result<String, ToolError> {
        self.fs.read(path).await
    }

    /// Render a template with string variables
    pub fn render(&self, template: &str, vars: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .render_template(template, vars)
            .map_err(|e| ToolError::Formatter(format!("template render: {e}")))
    }
}
