//! Perception router
//!
//! The bijection between perceptual signs and in-memory content. Perceiving a
//! cell decodes its sign through the matching capability: file locations are
//! read, prompt/script locations load their source, memorized parameters are
//! looked up, truth values become booleans. Literal-marked signs pass through
//! unperceived; the actuation step decides what to do with them.

use std::path::PathBuf;

use tracing::debug;

use super::Body;
use super::error::ToolError;
use crate::reference::{CellValue, Reference, SignNorm};

/// Decode one cell; non-sign cells recurse structurally
pub async fn perceive(cell: &CellValue, body: &Body) -> Result<CellValue, ToolError> {
    match cell {
        CellValue::Sign(sign) => {
            debug!(norm = %sign.norm.name(), payload = %sign.payload, "Perceiving sign");
            match &sign.norm {
                SignNorm::FileLocation => {
                    let content = body.file_system.read(&PathBuf::from(&sign.payload)).await?;
                    Ok(CellValue::string(content))
                }
                SignNorm::PromptLocation => {
                    let template = body.prompt_tool.read(&PathBuf::from(&sign.payload)).await?;
                    Ok(CellValue::string(template))
                }
                SignNorm::ScriptLocation => {
                    let source = body.file_system.read(&PathBuf::from(&sign.payload)).await?;
                    Ok(CellValue::string(source))
                }
                SignNorm::MemorizedParameter => {
                    let value = body.file_system.read_memorized_value(&sign.payload).await?;
                    Ok(CellValue::from_leaf(body.formatter.parse_json(&value)?))
                }
                SignNorm::TruthValue => {
                    let truth = sign
                        .as_truth()
                        .ok_or_else(|| ToolError::Perception(format!("bad truth payload: {}", sign.payload)))?;
                    Ok(CellValue::Literal(serde_json::Value::Bool(truth)))
                }
                // Save paths are output-side; literals pass through unperceived
                SignNorm::SavePath | SignNorm::Literal { .. } => Ok(cell.clone()),
            }
        }
        CellValue::Dict(dict) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, value) in dict {
                out.insert(key.clone(), Box::pin(perceive(value, body)).await?);
            }
            Ok(CellValue::Dict(out))
        }
        CellValue::Reference(inner) => Ok(CellValue::Reference(Box::new(
            Box::pin(perceive_reference(inner, body)).await?,
        ))),
        CellValue::Literal(_) | CellValue::Callable(_) => Ok(cell.clone()),
    }
}

/// Apply the router pointwise across a reference
pub async fn perceive_reference(reference: &Reference, body: &Body) -> Result<Reference, ToolError> {
    let mut out = reference.clone();
    let coords: Vec<_> = reference.cells().map(|(coord, _)| coord.clone()).collect();
    for coord in coords {
        let cell = reference.get_at(&coord).cloned().unwrap_or_else(CellValue::null);
        let perceived = perceive(&cell, body).await?;
        let kwargs: Vec<(&str, usize)> = reference
            .axes()
            .iter()
            .zip(&coord)
            .map(|(axis, index)| (axis.name.as_str(), *index))
            .collect();
        out.set(&kwargs, perceived)
            .map_err(|e| ToolError::Perception(e.to_string()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyBuilder;
    use crate::reference::PerceptualSign;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_location_reads_content() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("doc.txt"), "contents here").unwrap();
        let body = BodyBuilder::mock(temp.path()).build();

        let sign = CellValue::Sign(PerceptualSign::parse("%{file_location}(doc.txt)").unwrap());
        let out = perceive(&sign, &body).await.unwrap();
        assert_eq!(out.as_str(), Some("contents here"));
    }

    #[tokio::test]
    async fn test_truth_value_decodes() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path()).build();

        let sign = CellValue::Sign(PerceptualSign::truth(true));
        let out = perceive(&sign, &body).await.unwrap();
        assert_eq!(out.as_literal(), Some(&serde_json::Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_literal_sign_passes_through() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path()).build();

        let sign = CellValue::Sign(PerceptualSign::parse("%{literal<file_path>}(out/a.md)").unwrap());
        let out = perceive(&sign, &body).await.unwrap();
        assert_eq!(out, sign);
    }

    #[tokio::test]
    async fn test_dict_recursion() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("f.txt"), "inner").unwrap();
        let body = BodyBuilder::mock(temp.path()).build();

        let mut dict = std::collections::BTreeMap::new();
        dict.insert(
            "input_1".to_string(),
            CellValue::Sign(PerceptualSign::parse("%{file_location}(f.txt)").unwrap()),
        );
        dict.insert("input_2".to_string(), CellValue::string("plain"));

        let out = perceive(&CellValue::Dict(dict), &body).await.unwrap();
        let dict = out.as_dict().unwrap();
        assert_eq!(dict["input_1"].as_str(), Some("inner"));
        assert_eq!(dict["input_2"].as_str(), Some("plain"));
    }

    #[tokio::test]
    async fn test_perceive_reference_pointwise() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path()).build();

        let data = serde_json::json!(["%{truth_value}(false)", "keep"]);
        let r = Reference::from_nested_json(&data, &["a".into()]).unwrap();
        let out = perceive_reference(&r, &body).await.unwrap();
        assert_eq!(
            out.get(&[("a", 0)]).unwrap().as_literal(),
            Some(&serde_json::Value::Bool(false))
        );
        assert_eq!(out.get(&[("a", 1)]).unwrap().as_str(), Some("keep"));
    }
}
