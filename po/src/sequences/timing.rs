//! Timing sequence: IWI-T-OWI
//!
//! `if`/`if!` read a proposition's truth-value cell and either let the gated
//! subtree run or skip it wholesale: every inference strictly inside the
//! gate's flow prefix completes with the skipped sentinel and a null
//! reference, so downstream siblings become ready without any Body call.
//! `after` is pure serialization: wait for the referenced concept, then pass
//! through.

use async_trait::async_trait;
use serde_json::json;

use crate::plan::ConceptType;
use crate::reference::{CellValue, Reference};

use super::steps::collect_inputs;
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

pub struct TimingHandler;

impl TimingHandler {
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
            Some(ConceptType::OpIf) => Ok("if".to_string()),
            Some(ConceptType::OpIfNot) => Ok("if!".to_string()),
            Some(ConceptType::OpAfter) => Ok("after".to_string()),
            _ => Err(SequenceError::Interpretation {
                inference: ctx.inference.id.clone(),
                what: "syntax.marker (if/if!/after)".to_string(),
            }),
        }
    }

    /// Decode the gate out of the condition concept's reference
    fn gate_value(reference: &Reference, inference: &str) -> Result<bool, SequenceError> {
        for (_, cell) in reference.cells() {
            match cell {
                CellValue::Sign(sign) => {
                    if let Some(truth) = sign.as_truth() {
                        return Ok(truth);
                    }
                }
                CellValue::Literal(serde_json::Value::Bool(b)) => return Ok(*b),
                _ => {}
            }
        }
        Err(SequenceError::Interpretation {
            inference: inference.to_string(),
            what: "condition reference carries no truth value".to_string(),
        })
    }
}

#[async_trait]
impl SequenceHandler for TimingHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let marker = Self::marker(ctx)?;

        if marker == "after" {
            // Pure serialize: readiness already waited on the condition
            let inputs = collect_inputs(ctx)?;
            let reference = inputs
                .into_iter()
                .next()
                .map(|(_, r)| r)
                .unwrap_or_else(|| Reference::singleton(CellValue::null()));
            return Ok(SequenceOutput::complete(
                vec![Commit::WriteReference {
                    cid: inference.concept_to_infer.clone(),
                    reference,
                }],
                json!({"steps": ["IWI", "T", "OWI"], "marker": "after"}),
            ));
        }

        let condition = inference
            .interpretation
            .syntax
            .condition
            .as_deref()
            .ok_or_else(|| SequenceError::Interpretation {
                inference: inference.id.clone(),
                what: "syntax.condition".to_string(),
            })?;

        let condition_ref = if ctx.board.concept_complete(condition) {
            ctx.board.get_reference(condition)?
        } else if inference.start_flags.start_with_support_reference_only {
            ctx.board
                .latest_reference(condition)
                .ok_or_else(|| SequenceError::Readiness {
                    inference: inference.id.clone(),
                    missing: condition.to_string(),
                })?
        } else {
            return Err(SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: condition.to_string(),
            });
        };

        let gate = Self::gate_value(condition_ref, &inference.id)?;
        let pass = match marker.as_str() {
            "if" => gate,
            "if!" => !gate,
            other => {
                return Err(SequenceError::Interpretation {
                    inference: inference.id.clone(),
                    what: format!("unknown timing marker {other}"),
                });
            }
        };

        let mut commits = vec![Commit::WriteReference {
            cid: inference.concept_to_infer.clone(),
            reference: Reference::singleton(CellValue::Literal(serde_json::Value::Bool(pass))),
        }];
        if !pass {
            commits.push(Commit::SkipSubtree {
                prefix: inference.flow_index.clone(),
            });
        }

        Ok(SequenceOutput::complete(
            commits,
            json!({"steps": ["IWI", "T", "OWI"], "marker": marker, "gate": gate, "pass": pass}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequences::testutil::{mock_body, plan_from, seeded_board};
    use serde_json::json;

    fn gate_plan(marker: &str, truth: &str) -> (tempfile::TempDir, crate::plan::Plan) {
        plan_from(
            json!([
                {"id": "cond", "concept_name": "<cond>", "type": "<>", "is_ground_concept": true,
                 "reference_data": format!("%{{truth_value}}({truth})"), "reference_axis_names": []},
                {"id": "gate_out", "concept_name": "{gate}", "type": "{}", "reference_axis_names": []},
                {"id": "child_out", "concept_name": "{child}", "type": "{}", "reference_axis_names": []},
                {"id": "op", "concept_name": marker, "type": marker},
                {"id": "fn1", "concept_name": "::(f)", "type": "::()", "is_ground_concept": true,
                 "reference_data": "do it", "reference_axis_names": []}
            ]),
            json!([
                {"id": "gate", "inference_sequence": "timing", "concept_to_infer": "gate_out",
                 "function_concept": "op",
                 "working_interpretation": {"syntax": {"marker": marker.trim_start_matches('@'), "condition": "cond"}},
                 "flow_info": {"flow_index": "2"}},
                {"id": "child", "inference_sequence": "imperative", "concept_to_infer": "child_out",
                 "function_concept": "fn1", "value_concepts": [],
                 "flow_info": {"flow_index": "2.1"}}
            ]),
        )
    }

    #[tokio::test]
    async fn test_if_true_passes() {
        let (_dir, plan) = gate_plan("@if", "true");
        let board = seeded_board(&plan);
        let (_tmp, body) = mock_body();
        let ctx = SequenceContext {
            inference: plan.inferences.get("gate").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = TimingHandler.execute(&ctx).await.unwrap();
        assert_eq!(out.commits.len(), 1);
        assert!(matches!(&out.commits[0], Commit::WriteReference { cid, .. } if cid == "gate_out"));
    }

    #[tokio::test]
    async fn test_if_false_skips_subtree() {
        let (_dir, plan) = gate_plan("@if", "false");
        let board = seeded_board(&plan);
        let (_tmp, body) = mock_body();
        let ctx = SequenceContext {
            inference: plan.inferences.get("gate").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = TimingHandler.execute(&ctx).await.unwrap();
        assert!(
            out.commits
                .iter()
                .any(|c| matches!(c, Commit::SkipSubtree { prefix } if prefix.to_string() == "2"))
        );
    }

    #[tokio::test]
    async fn test_if_not_inverts() {
        let (_dir, plan) = gate_plan("@if!", "true");
        let board = seeded_board(&plan);
        let (_tmp, body) = mock_body();
        let ctx = SequenceContext {
            inference: plan.inferences.get("gate").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = TimingHandler.execute(&ctx).await.unwrap();
        // Gate true under if! means skip
        assert!(out.commits.iter().any(|c| matches!(c, Commit::SkipSubtree { .. })));
    }

    #[tokio::test]
    async fn test_after_passes_through() {
        let (_dir, plan) = plan_from(
            json!([
                {"id": "upstream", "concept_name": "{u}", "type": "{}", "is_ground_concept": true,
                 "reference_data": "done", "reference_axis_names": []},
                {"id": "out", "concept_name": "{out}", "type": "{}", "reference_axis_names": []},
                {"id": "op", "concept_name": "@after", "type": "@after"}
            ]),
            json!([
                {"id": "t1", "inference_sequence": "timing", "concept_to_infer": "out",
                 "function_concept": "op", "value_concepts": ["upstream"],
                 "working_interpretation": {"syntax": {"marker": "after", "condition": "upstream"}},
                 "flow_info": {"flow_index": "1"}}
            ]),
        );
        let board = seeded_board(&plan);
        let (_tmp, body) = mock_body();
        let ctx = SequenceContext {
            inference: plan.inferences.get("t1").unwrap(),
            plan: &plan,
            board: &board,
            body: &body,
        };

        let out = TimingHandler.execute(&ctx).await.unwrap();
        let Commit::WriteReference { reference, .. } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(reference.sole().unwrap().as_str(), Some("done"));
    }
}
