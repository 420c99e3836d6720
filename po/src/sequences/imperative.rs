//! Imperative / judgement sequence: IWI-IR-MFP-MVP-TVA-TIP-MIA-OR-OWI
//!
//! The only pipeline that actuates tools. Function perception (MFP) turns
//! the function concept into an executable callable via the paradigm
//! registry; value perception (MVP) decodes input signs; actuation (TVA)
//! cross-applies the callable over the arg-dict reference, growing a result
//! axis named after the inferred concept. Judgements share every step and
//! additionally wrap the result as truth-value signs (TIP).

use async_trait::async_trait;
use serde_json::json;

use crate::body::perception::perceive_reference;
use crate::reference::{CellValue, PerceptualSign};

use super::steps::{build_arg_dict, collect_inputs, conform_output, instruction_from_function, transform_cells};
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

/// Shared pipeline; `judgement` adds truth-value injection
pub struct ImperativeHandler {
    pub judgement: bool,
}

impl ImperativeHandler {
    fn default_paradigm(&self) -> &'static str {
        if self.judgement {
            "h_Literal[instruction]-c_judge-o_Bool"
        } else {
            "h_Literal[instruction]-c_generate-o_Str"
        }
    }
}

#[async_trait]
impl SequenceHandler for ImperativeHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let concept = ctx
            .plan
            .concepts
            .get(&inference.concept_to_infer)
            .ok_or_else(|| SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: inference.concept_to_infer.clone(),
            })?;

        // IWI + IR
        let inputs = collect_inputs(ctx)?;
        let arg_dict = build_arg_dict(&inputs)?;

        // MFP
        let instruction = instruction_from_function(ctx)?;
        let paradigm = inference
            .interpretation
            .norm_input
            .clone()
            .unwrap_or_else(|| self.default_paradigm().to_string());
        let callable = ctx.body.paradigms.build(&paradigm, &instruction, ctx.body).await?;

        // MVP
        let perceived = perceive_reference(&arg_dict, ctx.body).await?;

        // TVA
        let mut result = perceived.cross_action(&callable, &concept.axis_name).await?;

        // TIP
        if self.judgement {
            result = transform_cells(&result, |cell| match cell {
                CellValue::Sign(sign) if sign.as_truth().is_some() => Ok(cell.clone()),
                CellValue::Literal(serde_json::Value::Bool(b)) => Ok(CellValue::Sign(PerceptualSign::truth(*b))),
                CellValue::Literal(serde_json::Value::String(s)) => {
                    let truth = ctx.body.formatter.parse_truth(s)?;
                    Ok(CellValue::Sign(PerceptualSign::truth(truth)))
                }
                other => Err(SequenceError::OutputShape {
                    inference: inference.id.clone(),
                    detail: format!("judgement produced non-boolean cell {other:?}"),
                }),
            })?;
        }

        // MIA + OR
        let result = conform_output(result, concept, inference.interpretation.is_relation_output, &inference.id)?;

        let steps = if self.judgement {
            json!(["IWI", "IR", "MFP", "MVP", "TVA", "TIP", "MIA", "OR", "OWI"])
        } else {
            json!(["IWI", "IR", "MFP", "MVP", "TVA", "MIA", "OR", "OWI"])
        };
        Ok(SequenceOutput::complete(
            vec![Commit::WriteReference {
                cid: inference.concept_to_infer.clone(),
                reference: result,
            }],
            json!({"steps": steps, "paradigm": paradigm, "inputs": inputs.len()}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyBuilder, MockLlmClient};
    use crate::sequences::testutil::{plan_from, seeded_board};
    use serde_json::json;

    #[tokio::test]
    async fn test_imperative_llm_roundtrip() {
        let (_dir, plan) = plan_from(
            json!([
                {"id": "a", "concept_name": "{a}", "type": "{}", "is_ground_concept": true,
                 "reference_data": "4", "reference_axis_names": []},
                {"id": "b", "concept_name": "{b}", "type": "{}", "is_ground_concept": true,
                 "reference_data": "7", "reference_axis_names": []},
                {"id": "sum", "concept_name": "{sum}", "type": "{}", "axis_name": "sum",
                 "reference_axis_names": []},
                {"id": "fn1", "concept_name": "::(add)", "type": "::()", "is_ground_concept": true,
                 "reference_data": "Add the two inputs", "reference_axis_names": []}
            ]),
            json!([
                {"id": "i1", "inference_sequence": "imperative", "concept_to_infer": "sum",
                 "function_concept": "fn1", "value_concepts": ["a", "b"],
                 "working_interpretation": {"value_order": {"a": 1, "b": 2}},
                 "flow_info": {"flow_index": "1"}}
            ]),
        );
        let board = seeded_board(&plan);
        let tmp = tempfile::tempdir().unwrap();
        let body = BodyBuilder::mock(tmp.path())
            .with_llm(MockLlmClient::new().with_rule("Add the two inputs", "11").into_arc())
            .build();
        let ctx = SequenceContext {
            inference: plan.inferences.get("i1").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = ImperativeHandler { judgement: false }.execute(&ctx).await.unwrap();
        let Commit::WriteReference { cid, reference } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(cid, "sum");
        // Singleton axes collapsed to a bare value
        assert_eq!(reference.sole().unwrap().as_str(), Some("11"));
    }

    #[tokio::test]
    async fn test_judgement_wraps_truth() {
        let (_dir, plan) = plan_from(
            json!([
                {"id": "score", "concept_name": "{score}", "type": "{}", "is_ground_concept": true,
                 "reference_data": "0.9", "reference_axis_names": []},
                {"id": "verdict", "concept_name": "<verdict>", "type": "<>", "axis_name": "verdict",
                 "reference_axis_names": []},
                {"id": "fn1", "concept_name": "<{judge}>", "type": "<{}>", "is_ground_concept": true,
                 "reference_data": "Does the score surpass the threshold?", "reference_axis_names": []}
            ]),
            json!([
                {"id": "j1", "inference_sequence": "judgement", "concept_to_infer": "verdict",
                 "function_concept": "fn1", "value_concepts": ["score"],
                 "flow_info": {"flow_index": "1"}}
            ]),
        );
        let board = seeded_board(&plan);
        let tmp = tempfile::tempdir().unwrap();
        let body = BodyBuilder::mock(tmp.path())
            .with_llm(MockLlmClient::new().with_rule("surpass", "true").into_arc())
            .build();
        let ctx = SequenceContext {
            inference: plan.inferences.get("j1").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = ImperativeHandler { judgement: true }.execute(&ctx).await.unwrap();
        let Commit::WriteReference { reference, .. } = &out.commits[0] else {
            panic!("expected write");
        };
        let sign = reference.sole().unwrap().as_sign().unwrap().clone();
        assert_eq!(sign.as_truth(), Some(true));
    }

    #[tokio::test]
    async fn test_missing_input_is_readiness_error() {
        let (_dir, plan) = plan_from(
            json!([
                {"id": "a", "concept_name": "{a}", "type": "{}", "reference_axis_names": []},
                {"id": "out", "concept_name": "{out}", "type": "{}", "reference_axis_names": []},
                {"id": "fn1", "concept_name": "::(f)", "type": "::()", "is_ground_concept": true,
                 "reference_data": "f", "reference_axis_names": []}
            ]),
            json!([
                {"id": "i1", "inference_sequence": "imperative", "concept_to_infer": "out",
                 "function_concept": "fn1", "value_concepts": ["a"],
                 "flow_info": {"flow_index": "1"}}
            ]),
        );
        let board = seeded_board(&plan); // "a" never written
        let tmp = tempfile::tempdir().unwrap();
        let body = BodyBuilder::mock(tmp.path()).build();
        let ctx = SequenceContext {
            inference: plan.inferences.get("i1").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let err = ImperativeHandler { judgement: false }.execute(&ctx).await.unwrap_err();
        assert!(err.is_fatal_for_run());
    }
}
