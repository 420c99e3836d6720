//! Assigning sequence: IWI-IR-AR-OR-OWI
//!
//! Marker semantics: `.` copies under a shape constraint, `+` appends along
//! the destination's primary axis, `-` selects a sub-reference via
//! derelation, `=` binds identity (same version, no copy), `%` abstracts the
//! source into a literal instance list.

use async_trait::async_trait;
use serde_json::json;

use crate::plan::ConceptType;
use crate::reference::{CellValue, Reference};

use super::steps::{as_single_cell, collect_inputs, conform_output};
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

pub struct AssigningHandler;

impl AssigningHandler {
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
            Some(ConceptType::OpSpecify) => Ok(".".to_string()),
            Some(ConceptType::OpContinuation) => Ok("+".to_string()),
            Some(ConceptType::OpSelect) => Ok("-".to_string()),
            Some(ConceptType::OpIdentity) => Ok("=".to_string()),
            Some(ConceptType::OpAbstraction) => Ok("%".to_string()),
            _ => Err(SequenceError::Interpretation {
                inference: ctx.inference.id.clone(),
                what: "syntax.marker (./+/-/=/%)".to_string(),
            }),
        }
    }

    fn source_id(ctx: &SequenceContext<'_>) -> Result<String, SequenceError> {
        if let Some(source) = &ctx.inference.interpretation.syntax.assign_source {
            return Ok(source.clone());
        }
        ctx.inference
            .value_concepts
            .first()
            .cloned()
            .ok_or_else(|| SequenceError::Interpretation {
                inference: ctx.inference.id.clone(),
                what: "assign_source or a value concept".to_string(),
            })
    }
}

#[async_trait]
impl SequenceHandler for AssigningHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let marker = Self::marker(ctx)?;
        let source_id = Self::source_id(ctx)?;
        let dest_id = inference.concept_to_infer.clone();
        let dest_concept = ctx
            .plan
            .concepts
            .get(&dest_id)
            .ok_or_else(|| SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: dest_id.clone(),
            })?;

        let log = json!({"steps": ["IWI", "IR", "AR", "OR", "OWI"], "marker": marker, "source": source_id});

        // Identity never materializes the source
        if marker == "=" {
            return Ok(SequenceOutput::complete(
                vec![Commit::AliasReference {
                    dst: dest_id,
                    src: source_id,
                }],
                log,
            ));
        }

        let source_ref = ctx.board.get_reference(&source_id)?.clone();

        let reference = match marker.as_str() {
            "." => conform_output(source_ref, dest_concept, inference.interpretation.is_relation_output, &inference.id)?,
            "+" => {
                let mut dest_ref = if ctx.board.concept_complete(&dest_id) {
                    ctx.board.get_reference(&dest_id)?.clone()
                } else {
                    Reference::with_axes(&[dest_concept.axis_name.as_str()])?
                };
                let axis = dest_ref
                    .axes()
                    .first()
                    .map(|a| a.name.clone())
                    .ok_or_else(|| SequenceError::OutputShape {
                        inference: inference.id.clone(),
                        detail: format!("continuation destination {dest_id} has no primary axis"),
                    })?;
                let mut next = dest_ref.axis_size(&axis)?;
                for (_, cell) in source_ref.cells() {
                    dest_ref.append_cell(&axis, next, cell.clone())?;
                    next += 1;
                }
                dest_ref
            }
            "-" => {
                let selector = inference
                    .interpretation
                    .value_selectors
                    .values()
                    .find(|s| s.source_concept == source_id)
                    .or_else(|| inference.interpretation.value_selectors.values().next())
                    .ok_or_else(|| SequenceError::Interpretation {
                        inference: inference.id.clone(),
                        what: "value_selectors entry for select marker".to_string(),
                    })?;
                source_ref.derelation(None, selector.index, &selector.key)?
            }
            "%" => {
                let mut out = Reference::with_axes(&[dest_concept.axis_name.as_str()])?;
                for (k, (_, cell)) in source_ref.cells().enumerate() {
                    let literal = match cell {
                        CellValue::Reference(inner) => as_single_cell(inner),
                        other => other.clone(),
                    };
                    out.append_cell(&dest_concept.axis_name, k, literal)?;
                }
                out
            }
            other => {
                return Err(SequenceError::Interpretation {
                    inference: inference.id.clone(),
                    what: format!("unknown assigning marker {other}"),
                });
            }
        };

        Ok(SequenceOutput::complete(
            vec![Commit::WriteReference {
                cid: dest_id,
                reference,
            }],
            log,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequences::testutil::{mock_body, plan_from, seeded_board};
    use serde_json::json;

    fn assign_plan(marker: &str, op_tag: &str, extra_wi: serde_json::Value) -> (tempfile::TempDir, crate::plan::Plan) {
        let mut wi = json!({"syntax": {"marker": marker}});
        if let Some(obj) = extra_wi.as_object() {
            for (k, v) in obj {
                wi[k] = v.clone();
            }
        }
        plan_from(
            json!([
                {"id": "src", "concept_name": "{src}", "type": "{}", "is_ground_concept": true,
                 "reference_data": ["a", "b"], "reference_axis_names": ["items"]},
                {"id": "dst", "concept_name": "{dst}", "type": "{}", "axis_name": "items",
                 "reference_axis_names": ["items"]},
                {"id": "op", "concept_name": op_tag, "type": op_tag}
            ]),
            json!([
                {"id": "a1", "inference_sequence": "assigning", "concept_to_infer": "dst",
                 "function_concept": "op", "value_concepts": ["src"],
                 "working_interpretation": wi,
                 "flow_info": {"flow_index": "1"}}
            ]),
        )
    }

    async fn run_assign(
        plan: &crate::plan::Plan,
        board: &crate::blackboard::Blackboard,
    ) -> SequenceOutput {
        let (_tmp, body) = mock_body();
        let ctx = SequenceContext {
            inference: plan.inferences.get("a1").unwrap(),
            plan,
            board,
            body: &body,
        };
        AssigningHandler.execute(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_specify_copies() {
        let (_dir, plan) = assign_plan(".", "$.", json!({}));
        let board = seeded_board(&plan);
        let out = run_assign(&plan, &board).await;

        let Commit::WriteReference { cid, reference } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(cid, "dst");
        assert_eq!(reference.axis_size("items").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_continuation_appends() {
        let (_dir, plan) = assign_plan("+", "$+", json!({}));
        let mut board = seeded_board(&plan);
        // Destination already holds one element
        let mut existing = Reference::with_axes(&["items"]).unwrap();
        existing.append_cell("items", 0, CellValue::string("z")).unwrap();
        board.set_reference("dst", existing, None).unwrap();

        let out = run_assign(&plan, &board).await;
        let Commit::WriteReference { reference, .. } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(reference.axis_size("items").unwrap(), 3);
        assert_eq!(reference.get(&[("items", 0)]).unwrap().as_str(), Some("z"));
        assert_eq!(reference.get(&[("items", 2)]).unwrap().as_str(), Some("b"));
    }

    #[tokio::test]
    async fn test_identity_aliases() {
        let (_dir, plan) = assign_plan("=", "$=", json!({}));
        let board = seeded_board(&plan);
        let out = run_assign(&plan, &board).await;
        assert!(matches!(
            &out.commits[0],
            Commit::AliasReference { dst, src } if dst == "dst" && src == "src"
        ));
    }

    #[tokio::test]
    async fn test_select_derelates() {
        let (_dir, plan) = plan_from(
            json!([
                {"id": "src", "concept_name": "{src}", "type": "[]", "is_ground_concept": true,
                 "reference_data": [{"name": "x"}, {"name": "y"}], "reference_axis_names": ["entries"]},
                {"id": "dst", "concept_name": "{dst}", "type": "{}", "reference_axis_names": []},
                {"id": "op", "concept_name": "$-", "type": "$-"}
            ]),
            json!([
                {"id": "a1", "inference_sequence": "assigning", "concept_to_infer": "dst",
                 "function_concept": "op", "value_concepts": ["src"],
                 "working_interpretation": {
                     "syntax": {"marker": "-"},
                     "value_selectors": {"dst": {"source_concept": "src", "index": 1, "key": "name"}}
                 },
                 "flow_info": {"flow_index": "1"}}
            ]),
        );
        let board = seeded_board(&plan);
        let out = run_assign(&plan, &board).await;
        let Commit::WriteReference { reference, .. } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(reference.sole().unwrap().as_str(), Some("y"));
    }

    #[tokio::test]
    async fn test_abstraction_lists_instances() {
        let (_dir, plan) = assign_plan("%", "$%", json!({}));
        let board = seeded_board(&plan);
        let out = run_assign(&plan, &board).await;
        let Commit::WriteReference { reference, .. } = &out.commits[0] else {
            panic!("expected write");
        };
        assert_eq!(reference.axis_size("items").unwrap(), 2);
        assert_eq!(reference.get(&[("items", 1)]).unwrap().as_str(), Some("b"));
    }
}
