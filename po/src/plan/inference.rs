//! Inference records
//!
//! The `working_interpretation` is a configuration record that makes implicit
//! plan syntax explicit. Its key set is closed: unrecognized keys are a load
//! error so stale compiler output cannot silently change runtime behavior.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::LoadError;
use super::flow::FlowIndex;

/// Execution pipeline selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Imperative,
    Judgement,
    Grouping,
    Looping,
    Assigning,
    Timing,
    Simple,
}

impl SequenceKind {
    pub fn parse(tag: &str, inference: &str) -> Result<Self, LoadError> {
        match tag {
            "imperative" => Ok(Self::Imperative),
            "judgement" => Ok(Self::Judgement),
            "grouping" => Ok(Self::Grouping),
            "looping" => Ok(Self::Looping),
            "assigning" => Ok(Self::Assigning),
            "timing" => Ok(Self::Timing),
            "simple" => Ok(Self::Simple),
            other => Err(LoadError::UnknownSequence {
                tag: other.to_string(),
                inference: inference.to_string(),
            }),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Imperative => "imperative",
            Self::Judgement => "judgement",
            Self::Grouping => "grouping",
            Self::Looping => "looping",
            Self::Assigning => "assigning",
            Self::Timing => "timing",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Sub-reference selection out of a relation-valued concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSelector {
    pub source_concept: String,
    pub index: usize,
    pub key: String,
}

/// Operator syntax details (loop topology, markers, gates)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntaxInfo {
    /// Marker for grouping/assigning/timing/looping operators
    pub marker: Option<String>,
    pub loop_base_concept: Option<String>,
    pub current_loop_base_concept: Option<String>,
    pub group_base: Option<String>,
    pub quantifier_index: Option<u64>,
    /// Loop-carried concepts: carrier id -> body concept producing next value
    pub in_loop_concepts: BTreeMap<String, String>,
    /// Loop outputs whose per-iteration values accumulate on the output axes
    pub concept_to_infer: Vec<String>,
    /// Proposition gating a timing inference
    pub condition: Option<String>,
    pub by_axis_concepts: Option<String>,
    pub assign_source: Option<String>,
    pub assign_destination: Option<String>,
}

/// The working-interpretation record (closed schema, §3.3 keys)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingInterpretation {
    /// Concept id -> positional index (1..N) for callable binding
    pub value_order: BTreeMap<String, usize>,
    /// Per-value sub-reference selectors
    pub value_selectors: BTreeMap<String, ValueSelector>,
    pub prompt_location: Option<String>,
    pub script_location: Option<String>,
    pub is_relation_output: bool,
    pub with_thinking: bool,
    /// Paradigm name (`[v_*-]h_*-c_*-o_*`) for function perception
    pub norm_input: Option<String>,
    pub syntax: SyntaxInfo,
}

impl WorkingInterpretation {
    /// Parse and validate against the closed key set
    pub fn from_value(value: &Value, inference: &str) -> Result<Self, LoadError> {
        let mut wi = WorkingInterpretation::default();
        let Some(map) = value.as_object() else {
            return Ok(wi);
        };

        for (key, val) in map {
            match key.as_str() {
                "value_order" => {
                    if let Some(obj) = val.as_object() {
                        for (cid, idx) in obj {
                            wi.value_order
                                .insert(cid.clone(), idx.as_u64().unwrap_or(0) as usize);
                        }
                    }
                }
                "value_selectors" => {
                    if let Some(obj) = val.as_object() {
                        for (k, sel) in obj {
                            let selector: ValueSelector =
                                serde_json::from_value(sel.clone()).map_err(|source| LoadError::PackageJson {
                                    file: format!("working_interpretation of {inference}"),
                                    source,
                                })?;
                            wi.value_selectors.insert(k.clone(), selector);
                        }
                    }
                }
                "prompt_location" => wi.prompt_location = val.as_str().map(String::from),
                "script_location" => wi.script_location = val.as_str().map(String::from),
                "is_relation_output" => wi.is_relation_output = val.as_bool().unwrap_or(false),
                "with_thinking" => wi.with_thinking = val.as_bool().unwrap_or(false),
                "norm_input" => wi.norm_input = val.as_str().map(String::from),
                "syntax" => wi.syntax = Self::parse_syntax(val, inference)?,
                other => {
                    return Err(LoadError::UnknownInterpretationKey {
                        key: other.to_string(),
                        inference: inference.to_string(),
                    });
                }
            }
        }
        Ok(wi)
    }

    fn parse_syntax(value: &Value, inference: &str) -> Result<SyntaxInfo, LoadError> {
        let mut syntax = SyntaxInfo::default();
        let Some(map) = value.as_object() else {
            return Ok(syntax);
        };

        for (key, val) in map {
            match key.as_str() {
                "marker" => syntax.marker = val.as_str().map(String::from),
                "LoopBaseConcept" => syntax.loop_base_concept = val.as_str().map(String::from),
                "CurrentLoopBaseConcept" => {
                    syntax.current_loop_base_concept = val.as_str().map(String::from);
                }
                "group_base" => syntax.group_base = val.as_str().map(String::from),
                "quantifier_index" => syntax.quantifier_index = val.as_u64(),
                "InLoopConcept" => {
                    if let Some(obj) = val.as_object() {
                        for (carrier, source) in obj {
                            syntax
                                .in_loop_concepts
                                .insert(carrier.clone(), source.as_str().unwrap_or_default().to_string());
                        }
                    }
                }
                "ConceptToInfer" => {
                    if let Some(arr) = val.as_array() {
                        syntax.concept_to_infer =
                            arr.iter().filter_map(|v| v.as_str().map(String::from)).collect();
                    } else if let Some(s) = val.as_str() {
                        syntax.concept_to_infer = vec![s.to_string()];
                    }
                }
                "condition" => syntax.condition = val.as_str().map(String::from),
                "by_axis_concepts" => syntax.by_axis_concepts = val.as_str().map(String::from),
                "assign_source" => syntax.assign_source = val.as_str().map(String::from),
                "assign_destination" => syntax.assign_destination = val.as_str().map(String::from),
                other => {
                    return Err(LoadError::UnknownInterpretationKey {
                        key: format!("syntax.{other}"),
                        inference: inference.to_string(),
                    });
                }
            }
        }
        Ok(syntax)
    }

    /// Concept references held anywhere in this record, for load-time
    /// resolution against the concept repo (mutable so names rewrite to ids)
    pub fn concept_refs_mut(&mut self) -> Vec<&mut String> {
        let mut refs: Vec<&mut String> = Vec::new();
        for selector in self.value_selectors.values_mut() {
            refs.push(&mut selector.source_concept);
        }
        let s = &mut self.syntax;
        refs.extend(s.loop_base_concept.iter_mut());
        refs.extend(s.current_loop_base_concept.iter_mut());
        refs.extend(s.group_base.iter_mut());
        refs.extend(s.condition.iter_mut());
        refs.extend(s.assign_source.iter_mut());
        refs.extend(s.assign_destination.iter_mut());
        refs.extend(s.concept_to_infer.iter_mut());
        refs
    }
}

/// Readiness-rule modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartFlags {
    #[serde(default)]
    pub start_without_value: bool,
    #[serde(default)]
    pub start_without_value_only_once: bool,
    #[serde(default)]
    pub start_without_function: bool,
    #[serde(default)]
    pub start_without_function_only_once: bool,
    #[serde(default)]
    pub start_with_support_reference_only: bool,
}

/// Raw inference entry as deserialized from `inference_repo.json`
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceEntry {
    pub id: String,
    pub inference_sequence: String,
    pub concept_to_infer: String,
    #[serde(default)]
    pub function_concept: Option<String>,
    #[serde(default)]
    pub value_concepts: Vec<String>,
    #[serde(default)]
    pub context_concepts: Vec<String>,
    #[serde(default)]
    pub working_interpretation: Value,
    #[serde(flatten)]
    pub start_flags: StartFlags,
    pub flow_info: FlowInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInfo {
    pub flow_index: FlowIndex,
}

/// A validated inference
#[derive(Debug, Clone)]
pub struct Inference {
    pub id: String,
    pub sequence: SequenceKind,
    pub concept_to_infer: String,
    pub function_concept: Option<String>,
    pub value_concepts: Vec<String>,
    pub context_concepts: Vec<String>,
    pub interpretation: WorkingInterpretation,
    pub start_flags: StartFlags,
    pub flow_index: FlowIndex,
}

impl Inference {
    pub fn from_entry(entry: InferenceEntry) -> Result<Self, LoadError> {
        let sequence = SequenceKind::parse(&entry.inference_sequence, &entry.id)?;
        let interpretation = WorkingInterpretation::from_value(&entry.working_interpretation, &entry.id)?;
        Ok(Self {
            id: entry.id,
            sequence,
            concept_to_infer: entry.concept_to_infer,
            function_concept: entry.function_concept,
            value_concepts: entry.value_concepts,
            context_concepts: entry.context_concepts,
            interpretation,
            start_flags: entry.start_flags,
            flow_index: entry.flow_info.flow_index,
        })
    }

    /// Every concept id this inference reads under the default readiness rule
    pub fn input_concepts(&self) -> Vec<&str> {
        let mut inputs: Vec<&str> = Vec::new();
        inputs.extend(self.value_concepts.iter().map(String::as_str));
        inputs.extend(self.context_concepts.iter().map(String::as_str));
        if let Some(f) = &self.function_concept {
            inputs.push(f);
        }
        inputs
    }
}
