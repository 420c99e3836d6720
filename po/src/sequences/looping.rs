//! Looping sequence: IWI-IR-GR-QR-OR-OWI (operator `*every`)
//!
//! The loop inference fires once per iteration boundary. The first firing
//! binds the loop-scoped base slice, resets the body subtree and yields; the
//! orchestrator re-fires it when every body inference has completed, at
//! which point the handler harvests the iteration's outputs into its
//! accumulators, records iteration history, and either starts the next
//! iteration or finalizes the accumulated relations.
//!
//! Statuses are never rewritten globally: each iteration is a fresh
//! execution context keyed by (flow prefix, iteration), and prior values
//! survive in the blackboard's iteration history.

use async_trait::async_trait;
use serde_json::json;

use crate::blackboard::LoopState;
use crate::reference::Reference;

use super::steps::as_single_cell;
use super::{Commit, SequenceContext, SequenceError, SequenceHandler, SequenceOutput};

pub struct LoopingHandler;

struct LoopShape {
    base_id: String,
    base: Reference,
    /// Loop axis name; `None` for a zero-axis base (single iteration)
    axis: Option<String>,
    total: u64,
    outputs: Vec<String>,
    body_inferences: Vec<String>,
    concepts_to_reset: Vec<String>,
}

impl LoopingHandler {
    fn shape(ctx: &SequenceContext<'_>) -> Result<LoopShape, SequenceError> {
        let inference = ctx.inference;
        let syntax = &inference.interpretation.syntax;

        let base_id = syntax
            .loop_base_concept
            .clone()
            .or_else(|| inference.value_concepts.first().cloned())
            .ok_or_else(|| SequenceError::Interpretation {
                inference: inference.id.clone(),
                what: "syntax.LoopBaseConcept or a value concept".to_string(),
            })?;
        let base = ctx.board.get_reference(&base_id)?.clone();

        // Iterate the base concept's declared axis when present, else the first
        let declared_axis = ctx.plan.concepts.get(&base_id).map(|c| c.axis_name.clone());
        let axis = declared_axis
            .filter(|name| base.has_axis(name))
            .or_else(|| base.axes().first().map(|a| a.name.clone()));
        let total = match &axis {
            Some(name) => base.axis_size(name)? as u64,
            None if base.is_empty() => 0,
            None => 1,
        };

        let body: Vec<&crate::plan::Inference> = ctx.plan.inferences.in_subtree(&inference.flow_index);
        let body_inferences: Vec<String> = body.iter().map(|i| i.id.clone()).collect();
        let concepts_to_reset: Vec<String> = body
            .iter()
            .map(|i| i.concept_to_infer.clone())
            .filter(|cid| {
                let invariant = ctx.plan.concepts.get(cid).map(|c| c.is_invariant).unwrap_or(false);
                let carried = syntax.in_loop_concepts.contains_key(cid);
                !invariant && !carried
            })
            .collect();

        Ok(LoopShape {
            base_id,
            base,
            axis,
            total,
            outputs: syntax.concept_to_infer.clone(),
            body_inferences,
            concepts_to_reset,
        })
    }

    fn slice(shape: &LoopShape, index: u64) -> Result<Reference, SequenceError> {
        match &shape.axis {
            Some(axis) => Ok(shape.base.select(axis, index as usize)?),
            None => Ok(shape.base.clone()),
        }
    }

    fn output_axis(ctx: &SequenceContext<'_>, cid: &str) -> String {
        ctx.plan
            .concepts
            .get(cid)
            .map(|c| c.axis_name.clone())
            .unwrap_or_else(|| cid.to_string())
    }

    fn fresh_accumulators(ctx: &SequenceContext<'_>, shape: &LoopShape) -> Result<LoopState, SequenceError> {
        let mut state = LoopState {
            iteration: 0,
            total: shape.total,
            accumulators: Default::default(),
        };
        for cid in &shape.outputs {
            let axis = Self::output_axis(ctx, cid);
            state
                .accumulators
                .insert(cid.clone(), Reference::with_axes(&[axis.as_str()])?);
        }
        Ok(state)
    }

    /// Write the accumulated relations plus the final carrier values
    fn finalize(
        ctx: &SequenceContext<'_>,
        shape: &LoopShape,
        state: &LoopState,
        commits: &mut Vec<Commit>,
    ) -> Result<(), SequenceError> {
        let inference = ctx.inference;
        let syntax = &inference.interpretation.syntax;

        for (cid, accumulator) in &state.accumulators {
            let axis = Self::output_axis(ctx, cid);
            let mut reference = accumulator.clone();
            if !inference.interpretation.is_relation_output && reference.axis_size(&axis)? <= 1 {
                reference.collapse(&axis)?;
            }
            commits.push(Commit::WriteReference {
                cid: cid.clone(),
                reference,
            });
        }

        for (carrier, source) in &syntax.in_loop_concepts {
            if ctx.board.concept_complete(source) {
                commits.push(Commit::WriteReference {
                    cid: carrier.clone(),
                    reference: ctx.board.get_reference(source)?.clone(),
                });
            }
        }

        let own = &inference.concept_to_infer;
        let own_written = state.accumulators.contains_key(own) || syntax.in_loop_concepts.contains_key(own);
        if !own_written {
            let reference = state
                .accumulators
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| shape.base.clone());
            commits.push(Commit::WriteReference {
                cid: own.clone(),
                reference,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SequenceHandler for LoopingHandler {
    async fn execute(&self, ctx: &SequenceContext<'_>) -> Result<SequenceOutput, SequenceError> {
        let inference = ctx.inference;
        let syntax = &inference.interpretation.syntax;
        let shape = Self::shape(ctx)?;
        let prefix = inference.flow_index.clone();

        let Some(state) = ctx.board.loop_state(&inference.id) else {
            // First firing: open iteration 0 or finish an empty loop outright
            let mut commits = Vec::new();
            let state = Self::fresh_accumulators(ctx, &shape)?;

            if shape.total == 0 {
                Self::finalize(ctx, &shape, &state, &mut commits)?;
                commits.push(Commit::SetLoopState {
                    inference: inference.id.clone(),
                    state,
                });
                return Ok(SequenceOutput::complete(
                    commits,
                    json!({"steps": ["IWI", "IR", "GR", "QR", "OR", "OWI"], "base": shape.base_id, "iterations": 0}),
                ));
            }

            commits.push(Commit::BeginIteration {
                prefix: prefix.clone(),
                concepts_to_reset: shape.concepts_to_reset.clone(),
                body_inferences: shape.body_inferences.clone(),
            });
            if let Some(current) = &syntax.current_loop_base_concept {
                commits.push(Commit::WriteReference {
                    cid: current.clone(),
                    reference: Self::slice(&shape, 0)?,
                });
            }
            commits.push(Commit::SetLoopState {
                inference: inference.id.clone(),
                state,
            });
            return Ok(SequenceOutput::yielded(
                commits,
                json!({"steps": ["IWI", "IR", "GR", "QR"], "base": shape.base_id, "iteration": 0, "of": shape.total}),
            ));
        };

        // A body iteration just completed: harvest it
        let mut state = state.clone();
        let i = state.iteration;
        let mut commits = Vec::new();

        for cid in &shape.outputs {
            let out_ref = ctx.board.get_reference(cid)?.clone();
            let axis = Self::output_axis(ctx, cid);
            let accumulator = state.accumulators.entry(cid.clone()).or_default();
            if !accumulator.has_axis(&axis) {
                accumulator.append_axis(&axis, 0)?;
            }
            accumulator.append_cell(&axis, i as usize, as_single_cell(&out_ref))?;
            commits.push(Commit::PushIterationSnapshot {
                prefix: prefix.clone(),
                cid: cid.clone(),
                reference: out_ref,
            });
        }

        // Carrier history records the value flowing into the next iteration
        let mut carried_next: Vec<(String, Reference)> = Vec::new();
        for (carrier, source) in &syntax.in_loop_concepts {
            let next_value = ctx.board.get_reference(source)?.clone();
            commits.push(Commit::PushIterationSnapshot {
                prefix: prefix.clone(),
                cid: carrier.clone(),
                reference: next_value.clone(),
            });
            carried_next.push((carrier.clone(), next_value));
        }

        let next = i + 1;
        if next < shape.total {
            commits.push(Commit::BeginIteration {
                prefix: prefix.clone(),
                concepts_to_reset: shape.concepts_to_reset.clone(),
                body_inferences: shape.body_inferences.clone(),
            });
            for (carrier, value) in carried_next {
                commits.push(Commit::WriteReference {
                    cid: carrier,
                    reference: value,
                });
            }
            if let Some(current) = &syntax.current_loop_base_concept {
                commits.push(Commit::WriteReference {
                    cid: current.clone(),
                    reference: Self::slice(&shape, next)?,
                });
            }
            state.iteration = next;
            commits.push(Commit::SetLoopState {
                inference: inference.id.clone(),
                state,
            });
            Ok(SequenceOutput::yielded(
                commits,
                json!({"steps": ["GR", "QR"], "iteration": next, "of": shape.total}),
            ))
        } else {
            state.iteration = shape.total;
            Self::finalize(ctx, &shape, &state, &mut commits)?;
            commits.push(Commit::SetLoopState {
                inference: inference.id.clone(),
                state,
            });
            Ok(SequenceOutput::complete(
                commits,
                json!({"steps": ["GR", "QR", "OR", "OWI"], "iterations": shape.total}),
            ))
        }
    }
}
