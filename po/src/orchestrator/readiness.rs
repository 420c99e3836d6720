//! Readiness rules
//!
//! Readiness is decided purely by blackboard state; the waitlist only fixes
//! the scan order. Start flags relax which inputs must be complete; the
//! support-only flag asks merely that some version of each input exists.

use crate::blackboard::{Blackboard, InferenceStatus};
use crate::plan::{Inference, Plan, SequenceKind};

/// Concept ids whose completeness blocks this inference right now.
/// Empty means the default rule is satisfied (status is checked separately).
pub fn missing_inputs(inference: &Inference, board: &Blackboard, plan: &Plan) -> Vec<String> {
    let flags = &inference.start_flags;
    let mut missing = Vec::new();

    // In-flight loops wait on their body, not on their declared inputs
    if inference.sequence == SequenceKind::Looping {
        if let Some(state) = board.loop_state(&inference.id) {
            if state.iteration < state.total {
                for body in plan.inferences.in_subtree(&inference.flow_index) {
                    if board.inference_status(&body.id) != Some(InferenceStatus::Complete) {
                        missing.push(body.concept_to_infer.clone());
                    }
                }
                return missing;
            }
        }
    }

    if flags.start_with_support_reference_only {
        for cid in inference.input_concepts() {
            if !board.has_any_version(cid) {
                missing.push(cid.to_string());
            }
        }
        return missing;
    }

    let skip_value = flags.start_without_value && !board.has_fired(&inference.id)
        || flags.start_without_value_only_once && !board.has_fired_once(&inference.id);
    let skip_function = flags.start_without_function && !board.has_fired(&inference.id)
        || flags.start_without_function_only_once && !board.has_fired_once(&inference.id);

    if !skip_value {
        for cid in &inference.value_concepts {
            if !board.concept_complete(cid) {
                missing.push(cid.clone());
            }
        }
    }
    for cid in &inference.context_concepts {
        if !board.concept_complete(cid) {
            missing.push(cid.clone());
        }
    }
    if !skip_function {
        if let Some(fid) = &inference.function_concept {
            if !board.concept_complete(fid) {
                missing.push(fid.clone());
            }
        }
    }

    // Timing gates additionally wait on their condition concept
    if inference.sequence == SequenceKind::Timing {
        if let Some(condition) = &inference.interpretation.syntax.condition {
            if !board.concept_complete(condition) && !missing.contains(condition) {
                missing.push(condition.clone());
            }
        }
    }

    missing
}

/// The admission check the cycle scan applies per inference
pub fn is_ready(inference: &Inference, board: &Blackboard, plan: &Plan) -> bool {
    board.inference_status(&inference.id) == Some(InferenceStatus::Pending)
        && missing_inputs(inference, board, plan).is_empty()
}
