//! Composition tool
//!
//! Composes a linear DAG of sub-callables into one callable per a plan
//! record. Each plan step names a function (an earlier result key holding a
//! callable, or a builtin affordance), maps its parameters onto values in
//! scope, and stores its output under a key; the step holding `return_key`
//! yields the composed callable's result.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::ToolError;
use super::formatter::Formatter;
use super::llm::{GenerateOptions, LlmClient};
use crate::reference::{Callable, CallableArgs, CellValue, SignNorm};

/// One step of a compose plan
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeStep {
    pub output_key: String,
    /// Earlier result key holding a callable, or a builtin affordance name
    pub function: String,
    /// Target param name -> key in scope (invocation args or prior outputs)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub literal_params: BTreeMap<String, Value>,
    /// Skip the step when the scope value at this key is absent or falsy
    #[serde(default)]
    pub condition: Option<String>,
    /// Marks the step whose output is the composed result
    #[serde(default)]
    pub return_key: Option<String>,
}

/// Builds composed callables over the Body's invocation-time affordances
#[derive(Clone)]
pub struct Composer {
    llm: Arc<dyn LlmClient>,
    formatter: Formatter,
}

impl Composer {
    pub fn new(llm: Arc<dyn LlmClient>, formatter: Formatter) -> Self {
        Self { llm, formatter }
    }

    /// Compose a plan over an environment of perceived values and callables
    pub fn compose(
        &self,
        name: impl Into<String>,
        plan: Vec<ComposeStep>,
        env: BTreeMap<String, CellValue>,
        options: GenerateOptions,
    ) -> Callable {
        let name = name.into();
        let llm = Arc::clone(&self.llm);
        let formatter = self.formatter.clone();

        Callable::new(name.clone(), move |args: CallableArgs| {
            let name = name.clone();
            let plan = plan.clone();
            let env = env.clone();
            let llm = Arc::clone(&llm);
            let formatter = formatter.clone();
            let options = options.clone();
            Box::pin(async move {
                let mut scope: BTreeMap<String, CellValue> = env;
                for (key, value) in args {
                    scope.insert(key, value);
                }

                let mut result: Option<Vec<CellValue>> = None;
                for step in &plan {
                    if let Some(condition) = &step.condition {
                        if !truthy(scope.get(condition)) {
                            debug!(step = %step.output_key, condition, "Compose step skipped");
                            continue;
                        }
                    }

                    let mut step_args = CallableArgs::new();
                    for (param, source) in &step.params {
                        let value = scope.get(source).cloned().ok_or_else(|| {
                            ToolError::Formatter(format!("compose {name}: missing scope key {source}"))
                        })?;
                        step_args.insert(param.clone(), value);
                    }
                    for (param, literal) in &step.literal_params {
                        step_args.insert(param.clone(), CellValue::from_leaf(literal.clone()));
                    }

                    let values =
                        invoke_function(&step.function, step_args, &scope, &llm, &formatter, &options).await?;

                    let stored = match values.as_slice() {
                        [single] => single.clone(),
                        _ => CellValue::Dict(
                            values
                                .iter()
                                .enumerate()
                                .map(|(i, v)| (i.to_string(), v.clone()))
                                .collect(),
                        ),
                    };
                    scope.insert(step.output_key.clone(), stored);

                    if step.return_key.as_deref() == Some(step.output_key.as_str()) || step.return_key.is_none() {
                        result = Some(values);
                    }
                }

                result.ok_or_else(|| ToolError::Formatter(format!("compose {name}: empty plan")))
            })
        })
    }
}

async fn invoke_function(
    function: &str,
    args: CallableArgs,
    scope: &BTreeMap<String, CellValue>,
    llm: &Arc<dyn LlmClient>,
    formatter: &Formatter,
    options: &GenerateOptions,
) -> Result<Vec<CellValue>, ToolError> {
    // A scope entry holding a callable wins over builtin affordances
    if let Some(CellValue::Callable(callable)) = scope.get(function) {
        return callable.invoke(args).await;
    }

    match function {
        "llm.generate" => {
            let prompt = string_arg(&args, "prompt")?;
            let text = llm.generate(&prompt, options).await?;
            Ok(vec![CellValue::string(text)])
        }
        "formatter_tool.parse_json" => {
            let text = string_arg(&args, "text")?;
            Ok(vec![CellValue::from_leaf(formatter.parse_json(&text)?)])
        }
        "formatter_tool.wrap" => {
            let value = args
                .get("value")
                .and_then(CellValue::as_literal)
                .cloned()
                .unwrap_or(Value::Null);
            let norm = string_arg(&args, "norm")?;
            let norm = SignNorm::parse(&norm).map_err(|e| ToolError::Formatter(e.to_string()))?;
            Ok(vec![CellValue::Sign(formatter.wrap(&value, norm))])
        }
        "formatter_tool.get" => {
            let dict = args
                .get("dict")
                .and_then(CellValue::as_literal)
                .cloned()
                .unwrap_or(Value::Null);
            let key = string_arg(&args, "key")?;
            Ok(vec![CellValue::from_leaf(formatter.get(&dict, &key)?)])
        }
        other => Err(ToolError::UnknownAffordance(other.to_string())),
    }
}

fn string_arg(args: &CallableArgs, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(CellValue::Literal(Value::String(s))) => Ok(s.clone()),
        Some(CellValue::Literal(other)) => Ok(other.to_string()),
        Some(CellValue::Sign(sign)) => Ok(sign.payload.clone()),
        _ => Err(ToolError::Formatter(format!("missing string argument {key}"))),
    }
}

fn truthy(value: Option<&CellValue>) -> bool {
    match value {
        None => false,
        Some(CellValue::Literal(Value::Bool(b))) => *b,
        Some(CellValue::Literal(Value::Null)) => false,
        Some(CellValue::Sign(sign)) => sign.as_truth().unwrap_or(true),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::llm::MockLlmClient;
    use serde_json::json;

    fn composer(mock: MockLlmClient) -> Composer {
        Composer::new(Arc::new(mock), Formatter::new())
    }

    #[tokio::test]
    async fn test_two_step_compose() {
        let composer = composer(MockLlmClient::new().with_rule("count", "{\"n\": 3}"));
        let plan: Vec<ComposeStep> = serde_json::from_value(json!([
            {"output_key": "raw", "function": "llm.generate", "params": {"prompt": "prompt"}},
            {"output_key": "parsed", "function": "formatter_tool.parse_json",
             "params": {"text": "raw"}, "return_key": "parsed"}
        ]))
        .unwrap();

        let callable = composer.compose("test", plan, BTreeMap::new(), GenerateOptions::default());
        let mut args = CallableArgs::new();
        args.insert("prompt".into(), CellValue::string("count the items"));

        let out = callable.invoke(args).await.unwrap();
        assert_eq!(out[0].as_literal(), Some(&json!({"n": 3})));
    }

    #[tokio::test]
    async fn test_condition_skips_step() {
        let composer = composer(MockLlmClient::new());
        let plan: Vec<ComposeStep> = serde_json::from_value(json!([
            {"output_key": "a", "function": "formatter_tool.parse_json",
             "literal_params": {"text": "1"}, "return_key": "a"},
            {"output_key": "b", "function": "llm.generate",
             "params": {"prompt": "prompt"}, "condition": "never_set"}
        ]))
        .unwrap();

        let callable = composer.compose("test", plan, BTreeMap::new(), GenerateOptions::default());
        let out = callable.invoke(CallableArgs::new()).await.unwrap();
        // Step b skipped; result stays with the return_key step
        assert_eq!(out[0].as_literal(), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_env_callable_takes_precedence() {
        let composer = composer(MockLlmClient::new());
        let double = Callable::from_sync("double", |args| {
            let n = args["n"].as_literal().and_then(Value::as_i64).unwrap_or(0);
            Ok(vec![CellValue::Literal(json!(n * 2))])
        });
        let env = BTreeMap::from([("doubler".to_string(), CellValue::Callable(double))]);

        let plan: Vec<ComposeStep> = serde_json::from_value(json!([
            {"output_key": "out", "function": "doubler", "params": {"n": "n"}, "return_key": "out"}
        ]))
        .unwrap();

        let callable = composer.compose("test", plan, env, GenerateOptions::default());
        let mut args = CallableArgs::new();
        args.insert("n".into(), CellValue::Literal(json!(5)));
        let out = callable.invoke(args).await.unwrap();
        assert_eq!(out[0].as_literal(), Some(&json!(10)));
    }

    #[tokio::test]
    async fn test_unknown_affordance() {
        let composer = composer(MockLlmClient::new());
        let plan: Vec<ComposeStep> = serde_json::from_value(json!([
            {"output_key": "x", "function": "mystery.tool"}
        ]))
        .unwrap();
        let callable = composer.compose("test", plan, BTreeMap::new(), GenerateOptions::default());
        assert!(matches!(
            callable.invoke(CallableArgs::new()).await,
            Err(ToolError::UnknownAffordance(_))
        ));
    }
}
