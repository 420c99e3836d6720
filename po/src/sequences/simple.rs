//! Simple sequence: IWI-IR-OR-OWI passthrough copy

use async_trait::async_trait;
use serde_json::json;

use super::steps::{collect_inputs, conform_output};
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

/// Copies an input reference to the inferred concept
pub struct SimpleHandler;

#[async_trait]
impl SequenceHandler for SimpleHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let inputs = collect_inputs(ctx)?;
        let (source, reference) = inputs.into_iter().next().ok_or_else(|| SequenceError::Readiness {
            inference: inference.id.clone(),
            missing: "<any value concept>".to_string(),
        })?;

        let concept = ctx
            .plan
            .concepts
            .get(&inference.concept_to_infer)
            .ok_or_else(|| SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: inference.concept_to_infer.clone(),
            })?;
        let reference = conform_output(
            reference,
            concept,
            inference.interpretation.is_relation_output,
            &inference.id,
        )?;

        Ok(SequenceOutput::complete(
            vec![Commit::WriteReference {
                cid: inference.concept_to_infer.clone(),
                reference,
            }],
            json!({"steps": ["IWI", "IR", "OR", "OWI"], "copied_from": source}),
        ))
    }
}
