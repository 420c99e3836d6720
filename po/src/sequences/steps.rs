//! Shared pipeline steps
//!
//! The input-intake (IWI), argument assembly (IR), function perception
//! helpers (part of MFP) and output conformance (MIA/OR) used by more than
//! one sequence live here; the per-kind semantics stay in their own files.

use std::collections::BTreeMap;

use crate::body::InstructionContext;
use crate::plan::Concept;
use crate::reference::{CellValue, Reference, SignNorm};

use super::{SequenceContext, SequenceError};

/// IWI: collect input references in `value_order`, applying value selectors.
///
/// Under `start_without_value` (or support-only) an incomplete value concept
/// is silently absent instead of a readiness violation.
pub fn collect_inputs(ctx: &SequenceContext<'_>) -> Result<Vec<(String, Reference)>, SequenceError> {
    let inference = ctx.inference;
    let flags = &inference.start_flags;
    let lenient = flags.start_without_value
        || flags.start_without_value_only_once
        || flags.start_with_support_reference_only;

    let mut ordered: Vec<&String> = inference.value_concepts.iter().collect();
    let order = &inference.interpretation.value_order;
    if !order.is_empty() {
        ordered.sort_by_key(|cid| order.get(*cid).copied().unwrap_or(usize::MAX));
    }

    let mut inputs = Vec::with_capacity(ordered.len());
    for cid in ordered {
        let reference = if ctx.board.concept_complete(cid) {
            ctx.board.get_reference(cid)?.clone()
        } else if flags.start_with_support_reference_only {
            match ctx.board.latest_reference(cid) {
                Some(r) => r.clone(),
                None if lenient => continue,
                None => {
                    return Err(SequenceError::Readiness {
                        inference: inference.id.clone(),
                        missing: cid.clone(),
                    });
                }
            }
        } else if lenient {
            continue;
        } else {
            return Err(SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: cid.clone(),
            });
        };

        let reference = match inference.interpretation.value_selectors.get(cid) {
            Some(selector) => {
                let source = if &selector.source_concept == cid {
                    reference
                } else {
                    ctx.board.get_reference(&selector.source_concept)?.clone()
                };
                source.derelation(None, selector.index, &selector.key)?
            }
            None => reference,
        };
        inputs.push((cid.clone(), reference));
    }
    Ok(inputs)
}

/// IR: assemble the single arg-dict reference `{ input_1: r1, ... }`
pub fn build_arg_dict(inputs: &[(String, Reference)]) -> Result<Reference, SequenceError> {
    let refs: Vec<&Reference> = inputs.iter().map(|(_, r)| r).collect();
    let arg_dict = Reference::element_action(
        |cells| {
            let dict: BTreeMap<String, CellValue> = cells
                .iter()
                .enumerate()
                .map(|(i, cell)| (format!("input_{}", i + 1), (*cell).clone()))
                .collect();
            CellValue::Dict(dict)
        },
        &refs,
    )?;
    Ok(arg_dict)
}

/// MFP (front half): extract the instruction context out of the function
/// concept's reference cells. Literal strings become the instruction text;
/// prompt/script-location signs become the vertical inputs, unless the
/// working interpretation already pins them.
pub fn instruction_from_function(ctx: &SequenceContext<'_>) -> Result<InstructionContext, SequenceError> {
    let inference = ctx.inference;
    let mut instruction_parts: Vec<String> = Vec::new();
    let mut prompt_path = inference.interpretation.prompt_location.clone();
    let mut script_path = inference.interpretation.script_location.clone();

    if let Some(fid) = &inference.function_concept {
        if ctx.board.concept_complete(fid) {
            let function_ref = ctx.board.get_reference(fid)?;
            for (_, cell) in function_ref.cells() {
                match cell {
                    CellValue::Literal(serde_json::Value::String(s)) => instruction_parts.push(s.clone()),
                    CellValue::Sign(sign) => match &sign.norm {
                        SignNorm::PromptLocation if prompt_path.is_none() => {
                            prompt_path = Some(sign.payload.clone());
                        }
                        SignNorm::ScriptLocation if script_path.is_none() => {
                            script_path = Some(sign.payload.clone());
                        }
                        _ => instruction_parts.push(sign.payload.clone()),
                    },
                    _ => {}
                }
            }
        } else if !(inference.start_flags.start_without_function
            || inference.start_flags.start_without_function_only_once
            || inference.start_flags.start_with_support_reference_only)
        {
            return Err(SequenceError::Readiness {
                inference: inference.id.clone(),
                missing: fid.clone(),
            });
        }
    }

    Ok(InstructionContext {
        instruction: instruction_parts.join("\n"),
        prompt_path,
        script_path,
        with_thinking: inference.interpretation.with_thinking,
    })
}

/// MIA/OR: make the result's axes exactly match the concept's declaration.
///
/// Singleton axes outside the declared set collapse away; when the axis
/// count then matches, axes rename positionally onto the declared names.
/// Relation outputs keep their axes even when the declaration is narrower.
pub fn conform_output(
    mut reference: Reference,
    concept: &Concept,
    is_relation_output: bool,
    inference_id: &str,
) -> Result<Reference, SequenceError> {
    let declared = &concept.reference_axis_names;

    if !is_relation_output {
        for name in reference.axis_names() {
            if !declared.contains(&name) && reference.axis_size(&name)? <= 1 {
                reference.collapse(&name)?;
            }
        }
    }

    if reference.axes().len() == declared.len() {
        let current = reference.axis_names();
        for (cur, want) in current.iter().zip(declared) {
            if cur != want {
                reference.rename_axis(cur, want)?;
            }
        }
        return Ok(reference);
    }

    if is_relation_output {
        return Ok(reference);
    }

    Err(SequenceError::OutputShape {
        inference: inference_id.to_string(),
        detail: format!(
            "axes {:?} do not conform to declared {:?} for concept {}",
            reference.axis_names(),
            declared,
            concept.id
        ),
    })
}

/// Rebuild a reference by transforming every cell
pub fn transform_cells<F>(reference: &Reference, f: F) -> Result<Reference, SequenceError>
where
    F: Fn(&CellValue) -> Result<CellValue, SequenceError>,
{
    let mut out = reference.clone();
    let coords: Vec<_> = reference.cells().map(|(coord, _)| coord.clone()).collect();
    for coord in coords {
        let cell = reference.get_at(&coord).cloned().unwrap_or_else(CellValue::null);
        let transformed = f(&cell)?;
        let kwargs: Vec<(&str, usize)> = reference
            .axes()
            .iter()
            .zip(&coord)
            .map(|(axis, index)| (axis.name.as_str(), *index))
            .collect();
        out.set(&kwargs, transformed)?;
    }
    Ok(out)
}

/// Reduce a reference to one cell for relation assembly: singletons donate
/// their sole value, anything larger nests.
pub fn as_single_cell(reference: &Reference) -> CellValue {
    match reference.sole() {
        Ok(cell) => cell.clone(),
        Err(_) => CellValue::Reference(Box::new(reference.clone())),
    }
}
