//! Paradigm registry
//!
//! A paradigm describes how to assemble the callable `instruction_fn` for an
//! imperative or judgement out of Body affordances. Named paradigms follow
//! the grammar `[v_<VNorm>-]h_<HNorm>-c_<Action>-o_<OutCollectionType>`.
//! When a JSON spec file exists under `provisions/paradigms/` it is executed
//! step by step, ending in a `composition_tool.compose` call; otherwise the
//! name alone selects a builtin assembly (LLM prompt call or script binding).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::Body;
use super::compose::ComposeStep;
use super::error::ToolError;
use super::llm::GenerateOptions;
use crate::reference::{Callable, CellValue};

/// Parsed paradigm name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParadigmName {
    pub vertical: Option<String>,
    pub horizontal: String,
    pub action: String,
    pub output: String,
}

impl ParadigmName {
    pub fn parse(name: &str) -> Result<Self, ToolError> {
        let mut vertical = None;
        let mut horizontal = None;
        let mut action = None;
        let mut output = None;

        for part in name.split('-') {
            if let Some(v) = part.strip_prefix("v_") {
                vertical = Some(v.to_string());
            } else if let Some(h) = part.strip_prefix("h_") {
                horizontal = Some(h.to_string());
            } else if let Some(c) = part.strip_prefix("c_") {
                action = Some(c.to_string());
            } else if let Some(o) = part.strip_prefix("o_") {
                output = Some(o.to_string());
            } else {
                return Err(ToolError::BadParadigm {
                    name: name.to_string(),
                    message: format!("unparsable segment {part}"),
                });
            }
        }

        match (horizontal, action, output) {
            (Some(horizontal), Some(action), Some(output)) => Ok(Self {
                vertical,
                horizontal,
                action,
                output,
            }),
            _ => Err(ToolError::BadParadigm {
                name: name.to_string(),
                message: "expected [v_*-]h_*-c_*-o_* segments".into(),
            }),
        }
    }
}

/// JSON paradigm record
#[derive(Debug, Clone, Deserialize)]
pub struct ParadigmSpec {
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub env_spec: Value,
    pub sequence_spec: SequenceSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceSpec {
    pub steps: Vec<SpecStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecStep {
    pub step_index: u64,
    pub affordance: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    pub result_key: String,
}

/// Everything function perception knows when building an instruction
#[derive(Debug, Clone, Default)]
pub struct InstructionContext {
    /// The function concept's instruction text
    pub instruction: String,
    pub prompt_path: Option<String>,
    pub script_path: Option<String>,
    pub with_thinking: bool,
}

/// Catalog of paradigm specs loaded from a provisions directory
#[derive(Debug, Default)]
pub struct ParadigmRegistry {
    specs: BTreeMap<String, ParadigmSpec>,
}

impl ParadigmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` spec in a directory, keyed by file stem
    pub fn load_dir(dir: &Path) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        if !dir.exists() {
            return Ok(registry);
        }
        for entry in std::fs::read_dir(dir).map_err(|e| ToolError::FileIo {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })? {
            let entry = entry.map_err(|e| ToolError::FileIo {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content = std::fs::read_to_string(&path).map_err(|e| ToolError::FileIo {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let spec: ParadigmSpec = serde_json::from_str(&content).map_err(|e| ToolError::BadParadigm {
                name: name.clone(),
                message: e.to_string(),
            })?;
            registry.specs.insert(name, spec);
        }
        debug!(specs = registry.specs.len(), "Loaded paradigm registry");
        Ok(registry)
    }

    pub fn has_spec(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Build the `instruction_fn` for a paradigm name
    pub async fn build(&self, name: &str, ctx: &InstructionContext, body: &Body) -> Result<Callable, ToolError> {
        if let Some(spec) = self.specs.get(name) {
            return execute_spec(name, spec, ctx, body).await;
        }
        let parsed = ParadigmName::parse(name)?;
        builtin(name, &parsed, ctx, body).await
    }
}

/// Builtin assembly for paradigms without a JSON spec
async fn builtin(
    name: &str,
    parsed: &ParadigmName,
    ctx: &InstructionContext,
    body: &Body,
) -> Result<Callable, ToolError> {
    if parsed.action == "script" {
        let script_path = ctx.script_path.clone().ok_or_else(|| ToolError::BadParadigm {
            name: name.to_string(),
            message: "script paradigm without script_location".into(),
        })?;
        let source = body.file_system.read(&PathBuf::from(&script_path)).await?;
        let entrypoint = entrypoint_from_instruction(&ctx.instruction);
        return body.script_runner.create_function_executor(&source, &entrypoint).await;
    }

    // LLM assembly: load the template at build time so invocation is pure
    let template = match &ctx.prompt_path {
        Some(path) => Some(body.prompt_tool.read(&PathBuf::from(path)).await?),
        None => None,
    };

    let instruction = ctx.instruction.clone();
    let output = parsed.output.clone();
    let body = body.clone();
    let options = GenerateOptions {
        model: None,
        thinking: ctx.with_thinking,
    };

    Ok(Callable::new(name.to_string(), move |args| {
        let instruction = instruction.clone();
        let template = template.clone();
        let output = output.clone();
        let body = body.clone();
        let options = options.clone();
        Box::pin(async move {
            let prompt = match &template {
                Some(template) => {
                    let mut vars: BTreeMap<String, String> = args
                        .iter()
                        .map(|(k, v)| (k.clone(), cell_to_prompt_text(v)))
                        .collect();
                    vars.insert("instruction".to_string(), instruction.clone());
                    body.prompt_tool.render(template, &vars)?
                }
                None => {
                    let mut prompt = instruction.clone();
                    if !args.is_empty() {
                        prompt.push_str("\n\nInputs:\n");
                        for (key, value) in &args {
                            prompt.push_str(&format!("- {key}: {}\n", cell_to_prompt_text(value)));
                        }
                    }
                    prompt
                }
            };
            let text = body.guarded_generate(&prompt, &options).await?;
            body.formatter.shape_output(&text, &output)
        })
    }))
}

/// Render a cell into prompt text deterministically
fn cell_to_prompt_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Literal(Value::String(s)) => s.clone(),
        CellValue::Literal(other) => other.to_string(),
        CellValue::Sign(sign) => sign.payload.clone(),
        CellValue::Dict(dict) => {
            let parts: Vec<String> = dict.iter().map(|(k, v)| format!("{k}={}", cell_to_prompt_text(v))).collect();
            parts.join(", ")
        }
        CellValue::Reference(r) => r
            .to_nested_json()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "<reference>".to_string()),
        CellValue::Callable(c) => format!("<callable {}>", c.name()),
    }
}

/// Script entrypoints default to `main` unless the instruction is an identifier
fn entrypoint_from_instruction(instruction: &str) -> String {
    let trimmed = instruction.trim();
    let is_ident = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !trimmed.chars().next().unwrap_or('0').is_ascii_digit();
    if is_ident { trimmed.to_string() } else { "main".to_string() }
}

/// Execute a JSON paradigm spec; the last step must compose
async fn execute_spec(
    name: &str,
    spec: &ParadigmSpec,
    ctx: &InstructionContext,
    body: &Body,
) -> Result<Callable, ToolError> {
    let mut steps = spec.sequence_spec.steps.clone();
    steps.sort_by_key(|s| s.step_index);

    let mut scope: BTreeMap<String, CellValue> = BTreeMap::new();
    scope.insert("instruction".into(), CellValue::string(&ctx.instruction));
    if let Some(p) = &ctx.prompt_path {
        scope.insert("prompt_location".into(), CellValue::string(p));
    }
    if let Some(p) = &ctx.script_path {
        scope.insert("script_location".into(), CellValue::string(p));
    }

    let last_index = steps.len().saturating_sub(1);
    for (i, step) in steps.iter().enumerate() {
        let is_last = i == last_index;
        if is_last && step.affordance != "composition_tool.compose" {
            return Err(ToolError::BadParadigm {
                name: name.to_string(),
                message: "last step must be composition_tool.compose".into(),
            });
        }

        if is_last {
            let plan_value = resolve_param(step.params.get("plan"), &scope)
                .ok_or_else(|| ToolError::BadParadigm {
                    name: name.to_string(),
                    message: "compose step missing plan".into(),
                })?;
            let plan: Vec<ComposeStep> =
                serde_json::from_value(plan_value).map_err(|e| ToolError::BadParadigm {
                    name: name.to_string(),
                    message: format!("bad compose plan: {e}"),
                })?;
            let options = GenerateOptions {
                model: None,
                thinking: ctx.with_thinking,
            };
            return Ok(body.composer.compose(name.to_string(), plan, scope, options));
        }

        let result = run_spec_step(name, step, &scope, body).await?;
        scope.insert(step.result_key.clone(), result);
    }

    Err(ToolError::BadParadigm {
        name: name.to_string(),
        message: "empty sequence_spec".into(),
    })
}

/// Resolve a param value: `"$key"` strings pull from scope, others are literal
fn resolve_param(param: Option<&Value>, scope: &BTreeMap<String, CellValue>) -> Option<Value> {
    let param = param?;
    if let Value::String(s) = param {
        if let Some(key) = s.strip_prefix('$') {
            let cell = scope.get(key)?;
            return match cell {
                CellValue::Literal(v) => Some(v.clone()),
                CellValue::Sign(sign) => Some(Value::String(sign.payload.clone())),
                other => other.to_json().ok(),
            };
        }
    }
    Some(param.clone())
}

async fn run_spec_step(
    name: &str,
    step: &SpecStep,
    scope: &BTreeMap<String, CellValue>,
    body: &Body,
) -> Result<CellValue, ToolError> {
    let param = |key: &str| -> Result<String, ToolError> {
        match resolve_param(step.params.get(key), scope) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Ok(other.to_string()),
            None => Err(ToolError::BadParadigm {
                name: name.to_string(),
                message: format!("step {} missing param {key}", step.affordance),
            }),
        }
    };

    match step.affordance.as_str() {
        "prompt_tool.read" => {
            let path = param("path")?;
            Ok(CellValue::string(body.prompt_tool.read(&PathBuf::from(path)).await?))
        }
        "file_system.read" => {
            let path = param("path")?;
            Ok(CellValue::string(body.file_system.read(&PathBuf::from(path)).await?))
        }
        "python_interpreter.create_function_executor" => {
            let source = param("source")?;
            let entrypoint = param("entrypoint")?;
            let callable = body.script_runner.create_function_executor(&source, &entrypoint).await?;
            Ok(CellValue::Callable(callable))
        }
        "formatter_tool.parse_json" => {
            let text = param("text")?;
            Ok(CellValue::from_leaf(body.formatter.parse_json(&text)?))
        }
        other => Err(ToolError::UnknownAffordance(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyBuilder;
    use crate::body::llm::MockLlmClient;
    use crate::reference::CallableArgs;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_name_grammar() {
        let p = ParadigmName::parse("v_prompt_location-h_Literal[instruction]-c_generate-o_Str").unwrap();
        assert_eq!(p.vertical.as_deref(), Some("prompt_location"));
        assert_eq!(p.horizontal, "Literal[instruction]");
        assert_eq!(p.action, "generate");
        assert_eq!(p.output, "Str");

        let p = ParadigmName::parse("h_Literal[instruction]-c_judge-o_Bool").unwrap();
        assert!(p.vertical.is_none());

        assert!(ParadigmName::parse("c_generate").is_err());
        assert!(ParadigmName::parse("x_bad-h_a-c_b-o_c").is_err());
    }

    #[tokio::test]
    async fn test_builtin_llm_paradigm() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path())
            .with_llm(MockLlmClient::new().with_rule("Add the digits", "9").into_arc())
            .build();

        let ctx = InstructionContext {
            instruction: "Add the digits".into(),
            ..Default::default()
        };
        let callable = body
            .paradigms
            .build("h_Literal[instruction]-c_generate-o_Str", &ctx, &body)
            .await
            .unwrap();

        let mut args = CallableArgs::new();
        args.insert("input_1".into(), CellValue::string("4"));
        args.insert("input_2".into(), CellValue::string("5"));
        let out = callable.invoke(args).await.unwrap();
        assert_eq!(out[0].as_str(), Some("9"));
    }

    #[tokio::test]
    async fn test_builtin_prompt_template_paradigm() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("add.hbs"), "{{instruction}}: {{input_1}}+{{input_2}}").unwrap();
        let body = BodyBuilder::mock(temp.path())
            .with_llm(MockLlmClient::new().with_exact("sum: 4+5", "9").into_arc())
            .build();

        let ctx = InstructionContext {
            instruction: "sum".into(),
            prompt_path: Some("add.hbs".into()),
            ..Default::default()
        };
        let callable = body
            .paradigms
            .build("v_prompt_location-h_Literal[instruction]-c_generate-o_Str", &ctx, &body)
            .await
            .unwrap();

        let mut args = CallableArgs::new();
        args.insert("input_1".into(), CellValue::string("4"));
        args.insert("input_2".into(), CellValue::string("5"));
        let out = callable.invoke(args).await.unwrap();
        assert_eq!(out[0].as_str(), Some("9"));
    }

    #[tokio::test]
    async fn test_spec_paradigm_composes() {
        let temp = tempdir().unwrap();
        let paradigm_dir = temp.path().join("paradigms");
        std::fs::create_dir_all(&paradigm_dir).unwrap();
        std::fs::write(
            paradigm_dir.join("custom").with_extension("json"),
            serde_json::to_string(&json!({
                "metadata": {"inputs": {"vertical": null, "horizontal": "instruction"}, "outputs": "text"},
                "env_spec": {"tools": [{"tool_name": "llm", "affordances": [{"affordance_name": "generate", "call_code": "llm.generate"}]}]},
                "sequence_spec": {"steps": [
                    {"step_index": 1, "affordance": "composition_tool.compose", "result_key": "instruction_fn",
                     "params": {"plan": [
                        {"output_key": "text", "function": "llm.generate",
                         "params": {"prompt": "input_1"}, "return_key": "text"}
                     ]}}
                ]}
            }))
            .unwrap(),
        )
        .unwrap();

        let body = BodyBuilder::mock(temp.path())
            .with_paradigm_dir(&paradigm_dir)
            .with_llm(MockLlmClient::new().with_exact("ping", "pong").into_arc())
            .build();

        let callable = body
            .paradigms
            .build("custom", &InstructionContext::default(), &body)
            .await
            .unwrap();

        let mut args = CallableArgs::new();
        args.insert("input_1".into(), CellValue::string("ping"));
        let out = callable.invoke(args).await.unwrap();
        assert_eq!(out[0].as_str(), Some("pong"));
    }

    #[test]
    fn test_entrypoint_heuristic() {
        assert_eq!(entrypoint_from_instruction("add_digits"), "add_digits");
        assert_eq!(entrypoint_from_instruction("Add the digits"), "main");
        assert_eq!(entrypoint_from_instruction(""), "main");
    }
}
