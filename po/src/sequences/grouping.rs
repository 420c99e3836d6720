//! Grouping sequence: IWI-IR-GR-OR-OWI
//!
//! `across` reinterprets one input as a relation over its axis - identity in
//! value, reinterpretation in type. `in` combines N separately-supplied
//! values into one relation keyed by positional index. The group axis is
//! always the declared axis name of the inferred concept.

use async_trait::async_trait;
use serde_json::json;

use crate::plan::ConceptType;
use crate::reference::Reference;

use super::steps::{as_single_cell, collect_inputs};
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

pub struct GroupingHandler;

impl GroupingHandler {
    /// Marker from the interpretation, falling back to the operator tag
    fn marker(ctx: &SequenceContext<'_>) -> Result<String, SequenceError> {
        if let Some(marker) = &ctx.inference.interpretation.syntax.marker {
            return Ok(marker.clone());
        }
        let function = ctx
            .inference
            .function_concept
            .as_deref()
            .and_then(|fid| ctx.plan.concepts.get(fid));
        match function.map(|c| c.ctype) {
            Some(ConceptType::OpAcross) => Ok("across".to_string()),
            Some(ConceptType::OpIn) => Ok("in".to_string()),
            _ => Err(SequenceError::Interpretation {
                inference: ctx.inference.id.clone(),
                what: "syntax.marker (across/in)".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SequenceHandler for GroupingHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let marker = Self::marker(ctx)?;
        let concept = ctx
            .plan
            .concepts
            .get(&inference.concept_to_infer)
            .ok_or_else(|| SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: inference.concept_to_infer.clone(),
            })?;
        let group_axis = concept.axis_name.clone();
        let inputs = collect_inputs(ctx)?;

        let reference = match marker.as_str() {
            "across" => {
                let (_, mut reference) = inputs.into_iter().next().ok_or_else(|| SequenceError::Readiness {
                    inference: inference.id.clone(),
                    missing: "<group base>".to_string(),
                })?;

                let grouped_axis = match &inference.interpretation.syntax.by_axis_concepts {
                    Some(by_axis) if reference.has_axis(by_axis) => Some(by_axis.clone()),
                    _ => reference.axes().last().map(|a| a.name.clone()),
                };
                match grouped_axis {
                    Some(axis) if axis != group_axis && !reference.has_axis(&group_axis) => {
                        reference.rename_axis(&axis, &group_axis)?;
                    }
                    Some(_) => {}
                    None => {
                        // A bare singleton groups into a one-element relation
                        reference.append_axis(&group_axis, 1)?;
                    }
                }
                reference
            }
            "in" => {
                let mut reference = Reference::with_axes(&[group_axis.as_str()])?;
                for (k, (_, input)) in inputs.iter().enumerate() {
                    reference.append_cell(&group_axis, k, as_single_cell(input))?;
                }
                reference
            }
            other => {
                return Err(SequenceError::Interpretation {
                    inference: inference.id.clone(),
                    what: format!("unknown grouping marker {other}"),
                });
            }
        };

        Ok(SequenceOutput::complete(
            vec![Commit::WriteReference {
                cid: inference.concept_to_infer.clone(),
                reference,
            }],
            json!({"steps": ["IWI", "IR", "GR", "OR", "OWI"], "marker": marker}),
        ))
    }
}
