//! Blackboard - per-run runtime state
//!
//! Holds concept references, concept/inference statuses, the support graph
//! and loop iteration history. Created at run start, mutated only by the
//! orchestrator applying sequence commits, destroyed when the run is deleted.
//!
//! Status transitions follow a strict state machine; the only back-transition
//! out of `complete` is a loop iteration, which archives the previous values
//! into `iteration_history` instead of rewriting them.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::plan::FlowIndex;
use crate::reference::{Reference, ReferenceError};

/// Concept lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptStatus {
    Pending,
    InProgress,
    Complete,
}

/// Inference lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl InferenceStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Errors raised by blackboard operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Concept {0} is not complete")]
    NotComplete(String),

    #[error("Unknown concept {0}")]
    UnknownConcept(String),

    #[error("Unknown inference {0}")]
    UnknownInference(String),

    #[error("Illegal inference transition {from} -> {to} for {id}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Bad snapshot: {0}")]
    BadSnapshot(String),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// A versioned concept write
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenReference {
    pub reference: Reference,
    pub version: u64,
    /// Writer inference id; `None` for ground seeds
    pub writer: Option<String>,
}

/// Per-loop bookkeeping held between iterations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopState {
    pub iteration: u64,
    pub total: u64,
    /// Output concept id -> accumulated reference
    pub accumulators: BTreeMap<String, Reference>,
}

/// Per-run, in-memory store of everything the orchestrator decides on
#[derive(Debug, Default, PartialEq)]
pub struct Blackboard {
    concept_status: BTreeMap<String, ConceptStatus>,
    inference_status: BTreeMap<String, InferenceStatus>,
    concept_reference: BTreeMap<String, WrittenReference>,
    /// Inference id -> concept versions it consumed
    support: BTreeMap<String, BTreeSet<(String, u64)>>,
    /// (flow prefix, concept id) -> prior iteration references, in order
    iteration_history: BTreeMap<(String, String), Vec<Reference>>,
    /// Inferences that fired at least once in the current iteration scope
    /// (cleared for body inferences when a loop iteration begins)
    fired: BTreeSet<String>,
    /// Inferences that already consumed a `*_only_once` start flag
    fired_once: BTreeSet<String>,
    /// Inferences completed as skipped by a timing gate
    skipped: BTreeSet<String>,
    /// Loop inference id -> loop state
    loop_state: BTreeMap<String, LoopState>,
    retry_counts: BTreeMap<String, u32>,
    next_version: u64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept; ground concepts arrive complete with a reference
    pub fn register_concept(&mut self, cid: &str, ground: Option<Reference>) {
        match ground {
            Some(reference) => {
                self.next_version += 1;
                self.concept_reference.insert(
                    cid.to_string(),
                    WrittenReference {
                        reference,
                        version: self.next_version,
                        writer: None,
                    },
                );
                self.concept_status.insert(cid.to_string(), ConceptStatus::Complete);
            }
            None => {
                self.concept_status.insert(cid.to_string(), ConceptStatus::Pending);
            }
        }
    }

    /// Register an inference as pending
    pub fn register_inference(&mut self, iid: &str) {
        self.inference_status
            .insert(iid.to_string(), InferenceStatus::Pending);
    }

    // === Concepts ===

    pub fn concept_status(&self, cid: &str) -> Option<ConceptStatus> {
        self.concept_status.get(cid).copied()
    }

    pub fn concept_complete(&self, cid: &str) -> bool {
        self.concept_status(cid) == Some(ConceptStatus::Complete)
    }

    /// The reference of a complete concept
    pub fn get_reference(&self, cid: &str) -> Result<&Reference, StateError> {
        match self.concept_status.get(cid) {
            None => Err(StateError::UnknownConcept(cid.to_string())),
            Some(ConceptStatus::Complete) => Ok(&self.concept_reference[cid].reference),
            Some(_) => Err(StateError::NotComplete(cid.to_string())),
        }
    }

    /// Current version of a concept, if it was ever written
    pub fn version_of(&self, cid: &str) -> Option<u64> {
        self.concept_reference.get(cid).map(|w| w.version)
    }

    /// Most recent reference regardless of status (support-only readiness)
    pub fn latest_reference(&self, cid: &str) -> Option<&Reference> {
        self.concept_reference.get(cid).map(|w| &w.reference)
    }

    /// True once any version of the concept exists (support-only readiness)
    pub fn has_any_version(&self, cid: &str) -> bool {
        self.concept_reference.contains_key(cid)
    }

    /// Atomic write: stores the reference, bumps the version, flips the
    /// concept to complete and records the writer.
    pub fn set_reference(&mut self, cid: &str, reference: Reference, writer: Option<&str>) -> Result<u64, StateError> {
        if !self.concept_status.contains_key(cid) {
            return Err(StateError::UnknownConcept(cid.to_string()));
        }
        self.next_version += 1;
        let version = self.next_version;
        self.concept_reference.insert(
            cid.to_string(),
            WrittenReference {
                reference,
                version,
                writer: writer.map(String::from),
            },
        );
        self.concept_status.insert(cid.to_string(), ConceptStatus::Complete);
        debug!(cid, version, ?writer, "Reference written");
        Ok(version)
    }

    // === Inferences ===

    pub fn inference_status(&self, iid: &str) -> Option<InferenceStatus> {
        self.inference_status.get(iid).copied()
    }

    /// Transition an inference through the state machine
    pub fn mark_inference(&mut self, iid: &str, to: InferenceStatus) -> Result<(), StateError> {
        let from = self
            .inference_status
            .get(iid)
            .copied()
            .ok_or_else(|| StateError::UnknownInference(iid.to_string()))?;

        use InferenceStatus::*;
        // in_progress -> pending is the loop yield between iterations
        let legal = matches!(
            (from, to),
            (Pending, InProgress)
                | (InProgress, Complete)
                | (InProgress, Failed)
                | (InProgress, Pending)
                | (Failed, Pending)
        );
        if !legal {
            return Err(StateError::IllegalTransition {
                id: iid.to_string(),
                from: from.tag(),
                to: to.tag(),
            });
        }
        self.inference_status.insert(iid.to_string(), to);
        Ok(())
    }

    /// Mark an inference complete with the skipped sentinel (timing gates)
    pub fn skip_inference(&mut self, iid: &str) -> Result<(), StateError> {
        if !self.inference_status.contains_key(iid) {
            return Err(StateError::UnknownInference(iid.to_string()));
        }
        self.inference_status
            .insert(iid.to_string(), InferenceStatus::Complete);
        self.skipped.insert(iid.to_string());
        Ok(())
    }

    pub fn was_skipped(&self, iid: &str) -> bool {
        self.skipped.contains(iid)
    }

    /// Record a consumed (concept, version) support edge
    pub fn record_support(&mut self, iid: &str, cid: &str, version: u64) {
        self.support
            .entry(iid.to_string())
            .or_default()
            .insert((cid.to_string(), version));
    }

    pub fn support_of(&self, iid: &str) -> Option<&BTreeSet<(String, u64)>> {
        self.support.get(iid)
    }

    /// Bind `dst` to `src`'s reference: same version, no copy semantics
    pub fn alias_reference(&mut self, dst: &str, src: &str) -> Result<u64, StateError> {
        if !self.concept_status.contains_key(dst) {
            return Err(StateError::UnknownConcept(dst.to_string()));
        }
        let written = self
            .concept_reference
            .get(src)
            .cloned()
            .ok_or_else(|| StateError::NotComplete(src.to_string()))?;
        let version = written.version;
        self.concept_reference.insert(dst.to_string(), written);
        self.concept_status.insert(dst.to_string(), ConceptStatus::Complete);
        Ok(version)
    }

    // === Start-flag bookkeeping ===

    pub fn note_fired(&mut self, iid: &str) {
        self.fired.insert(iid.to_string());
    }

    pub fn has_fired(&self, iid: &str) -> bool {
        self.fired.contains(iid)
    }

    pub fn note_fired_once(&mut self, iid: &str) {
        self.fired_once.insert(iid.to_string());
    }

    pub fn has_fired_once(&self, iid: &str) -> bool {
        self.fired_once.contains(iid)
    }

    // === Retry bookkeeping ===

    pub fn retry_count(&self, iid: &str) -> u32 {
        self.retry_counts.get(iid).copied().unwrap_or(0)
    }

    pub fn bump_retry(&mut self, iid: &str) -> u32 {
        let count = self.retry_counts.entry(iid.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    // === Loops ===

    pub fn loop_state(&self, iid: &str) -> Option<&LoopState> {
        self.loop_state.get(iid)
    }

    pub fn set_loop_state(&mut self, iid: &str, state: LoopState) {
        self.loop_state.insert(iid.to_string(), state);
    }

    /// Begin a new loop iteration: reset the listed concepts and body
    /// inferences to pending. The loop driver records the outgoing values
    /// via [`push_iteration_snapshot`] first, so each iteration is a new
    /// history row, never a rewrite.
    pub fn begin_iteration(
        &mut self,
        prefix: &FlowIndex,
        concepts_to_reset: &[String],
        body_inferences: &[String],
    ) {
        let prefix_key = prefix.to_string();
        for cid in concepts_to_reset {
            self.concept_reference.remove(cid);
            if self.concept_status.contains_key(cid) {
                self.concept_status.insert(cid.clone(), ConceptStatus::Pending);
            }
        }
        for iid in body_inferences {
            if self.inference_status.contains_key(iid) {
                self.inference_status.insert(iid.clone(), InferenceStatus::Pending);
                self.skipped.remove(iid);
                self.fired.remove(iid);
            }
        }
        debug!(prefix = %prefix_key, reset = concepts_to_reset.len(), "Loop iteration began");
    }

    /// Record a concept value into iteration history without resetting it
    pub fn push_iteration_snapshot(&mut self, prefix: &FlowIndex, cid: &str, reference: Reference) {
        self.iteration_history
            .entry((prefix.to_string(), cid.to_string()))
            .or_default()
            .push(reference);
    }

    pub fn iteration_history(&self, prefix: &FlowIndex, cid: &str) -> &[Reference] {
        self.iteration_history
            .get(&(prefix.to_string(), cid.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iteration_entries(&self) -> impl Iterator<Item = (&(String, String), &Vec<Reference>)> {
        self.iteration_history.iter()
    }

    // === Introspection for termination/deadlock ===

    pub fn inference_ids(&self) -> impl Iterator<Item = &String> {
        self.inference_status.keys()
    }

    pub fn pending_inferences(&self) -> Vec<String> {
        self.inference_status
            .iter()
            .filter(|(_, s)| **s == InferenceStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn counts(&self) -> (usize, usize) {
        let complete = self
            .inference_status
            .values()
            .filter(|s| **s == InferenceStatus::Complete)
            .count();
        (complete, self.inference_status.len())
    }

    // === Snapshot / restore ===

    /// Canonical snapshot of all state; exact round-trip with [`restore`]
    pub fn snapshot(&self) -> Result<Value, StateError> {
        let mut concepts = serde_json::Map::new();
        for (cid, status) in &self.concept_status {
            let mut entry = serde_json::Map::new();
            entry.insert(
                "status".into(),
                Value::String(
                    match status {
                        ConceptStatus::Pending => "pending",
                        ConceptStatus::InProgress => "in_progress",
                        ConceptStatus::Complete => "complete",
                    }
                    .into(),
                ),
            );
            if let Some(written) = self.concept_reference.get(cid) {
                entry.insert("reference".into(), written.reference.to_canonical()?);
                entry.insert("version".into(), Value::from(written.version));
                if let Some(writer) = &written.writer {
                    entry.insert("writer".into(), Value::String(writer.clone()));
                }
            }
            concepts.insert(cid.clone(), Value::Object(entry));
        }

        let mut inferences = serde_json::Map::new();
        for (iid, status) in &self.inference_status {
            inferences.insert(
                iid.clone(),
                serde_json::json!({
                    "status": status.tag(),
                    "retries": self.retry_count(iid),
                    "fired": self.fired.contains(iid),
                    "fired_once": self.fired_once.contains(iid),
                    "skipped": self.skipped.contains(iid),
                }),
            );
        }

        let mut support = serde_json::Map::new();
        for (iid, edges) in &self.support {
            let list: Vec<Value> = edges
                .iter()
                .map(|(cid, v)| serde_json::json!([cid, v]))
                .collect();
            support.insert(iid.clone(), Value::Array(list));
        }

        let mut history = Vec::new();
        for ((prefix, cid), refs) in &self.iteration_history {
            let encoded: Result<Vec<Value>, ReferenceError> = refs.iter().map(|r| r.to_canonical()).collect();
            history.push(serde_json::json!({
                "flow_index": prefix,
                "cid": cid,
                "references": encoded?,
            }));
        }

        let mut loops = serde_json::Map::new();
        for (iid, state) in &self.loop_state {
            let mut accs = serde_json::Map::new();
            for (cid, r) in &state.accumulators {
                accs.insert(cid.clone(), r.to_canonical()?);
            }
            loops.insert(
                iid.clone(),
                serde_json::json!({
                    "iteration": state.iteration,
                    "total": state.total,
                    "accumulators": accs,
                }),
            );
        }

        Ok(serde_json::json!({
            "next_version": self.next_version,
            "concepts": concepts,
            "inferences": inferences,
            "support": support,
            "iteration_history": history,
            "loops": loops,
        }))
    }

    /// Rebuild a blackboard identical to a snapshot
    pub fn restore(snapshot: &Value) -> Result<Self, StateError> {
        let mut board = Self::new();
        board.next_version = snapshot
            .get("next_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::BadSnapshot("missing next_version".into()))?;

        let concepts = snapshot
            .get("concepts")
            .and_then(Value::as_object)
            .ok_or_else(|| StateError::BadSnapshot("missing concepts".into()))?;
        for (cid, entry) in concepts {
            let status = match entry.get("status").and_then(Value::as_str) {
                Some("pending") => ConceptStatus::Pending,
                Some("in_progress") => ConceptStatus::InProgress,
                Some("complete") => ConceptStatus::Complete,
                other => {
                    return Err(StateError::BadSnapshot(format!(
                        "bad concept status {other:?} for {cid}"
                    )));
                }
            };
            board.concept_status.insert(cid.clone(), status);
            if let Some(reference) = entry.get("reference") {
                let version = entry.get("version").and_then(Value::as_u64).unwrap_or(0);
                let writer = entry.get("writer").and_then(Value::as_str).map(String::from);
                board.concept_reference.insert(
                    cid.clone(),
                    WrittenReference {
                        reference: Reference::from_canonical(reference)?,
                        version,
                        writer,
                    },
                );
            }
        }

        let inferences = snapshot
            .get("inferences")
            .and_then(Value::as_object)
            .ok_or_else(|| StateError::BadSnapshot("missing inferences".into()))?;
        for (iid, entry) in inferences {
            let status = entry
                .get("status")
                .and_then(Value::as_str)
                .and_then(InferenceStatus::parse)
                .ok_or_else(|| StateError::BadSnapshot(format!("bad inference status for {iid}")))?;
            board.inference_status.insert(iid.clone(), status);
            let retries = entry.get("retries").and_then(Value::as_u64).unwrap_or(0) as u32;
            if retries > 0 {
                board.retry_counts.insert(iid.clone(), retries);
            }
            if entry.get("fired").and_then(Value::as_bool).unwrap_or(false) {
                board.fired.insert(iid.clone());
            }
            if entry.get("fired_once").and_then(Value::as_bool).unwrap_or(false) {
                board.fired_once.insert(iid.clone());
            }
            if entry.get("skipped").and_then(Value::as_bool).unwrap_or(false) {
                board.skipped.insert(iid.clone());
            }
        }

        if let Some(support) = snapshot.get("support").and_then(Value::as_object) {
            for (iid, edges) in support {
                let set = board.support.entry(iid.clone()).or_default();
                for edge in edges.as_array().into_iter().flatten() {
                    let cid = edge.get(0).and_then(Value::as_str).unwrap_or_default();
                    let version = edge.get(1).and_then(Value::as_u64).unwrap_or(0);
                    set.insert((cid.to_string(), version));
                }
            }
        }

        if let Some(history) = snapshot.get("iteration_history").and_then(Value::as_array) {
            for row in history {
                let prefix = row.get("flow_index").and_then(Value::as_str).unwrap_or_default();
                let cid = row.get("cid").and_then(Value::as_str).unwrap_or_default();
                let mut refs = Vec::new();
                for r in row.get("references").and_then(Value::as_array).into_iter().flatten() {
                    refs.push(Reference::from_canonical(r)?);
                }
                board
                    .iteration_history
                    .insert((prefix.to_string(), cid.to_string()), refs);
            }
        }

        if let Some(loops) = snapshot.get("loops").and_then(Value::as_object) {
            for (iid, entry) in loops {
                let mut state = LoopState {
                    iteration: entry.get("iteration").and_then(Value::as_u64).unwrap_or(0),
                    total: entry.get("total").and_then(Value::as_u64).unwrap_or(0),
                    accumulators: BTreeMap::new(),
                };
                for (cid, r) in entry.get("accumulators").and_then(Value::as_object).into_iter().flatten() {
                    state.accumulators.insert(cid.clone(), Reference::from_canonical(r)?);
                }
                board.loop_state.insert(iid.clone(), state);
            }
        }

        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::CellValue;
    use serde_json::json;

    fn board_with(concepts: &[(&str, bool)], inferences: &[&str]) -> Blackboard {
        let mut board = Blackboard::new();
        for (cid, ground) in concepts {
            let reference = ground.then(|| Reference::singleton(CellValue::string(*cid)));
            board.register_concept(cid, reference);
        }
        for iid in inferences {
            board.register_inference(iid);
        }
        board
    }

    #[test]
    fn test_ground_concepts_start_complete() {
        let board = board_with(&[("g", true), ("x", false)], &["i1"]);
        assert!(board.concept_complete("g"));
        assert_eq!(board.concept_status("x"), Some(ConceptStatus::Pending));
        assert_eq!(board.inference_status("i1"), Some(InferenceStatus::Pending));
    }

    #[test]
    fn test_get_reference_requires_complete() {
        let board = board_with(&[("x", false)], &[]);
        assert!(matches!(board.get_reference("x"), Err(StateError::NotComplete(_))));
        assert!(matches!(board.get_reference("nope"), Err(StateError::UnknownConcept(_))));
    }

    #[test]
    fn test_set_reference_bumps_version() {
        let mut board = board_with(&[("x", false)], &[]);
        let v1 = board
            .set_reference("x", Reference::singleton(CellValue::string("a")), Some("i1"))
            .unwrap();
        let v2 = board
            .set_reference("x", Reference::singleton(CellValue::string("b")), Some("i2"))
            .unwrap();
        assert!(v2 > v1);
        assert!(board.concept_complete("x"));
        assert_eq!(board.get_reference("x").unwrap().sole().unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_state_machine_legal_path() {
        let mut board = board_with(&[], &["i"]);
        board.mark_inference("i", InferenceStatus::InProgress).unwrap();
        board.mark_inference("i", InferenceStatus::Failed).unwrap();
        board.mark_inference("i", InferenceStatus::Pending).unwrap();
        board.mark_inference("i", InferenceStatus::InProgress).unwrap();
        board.mark_inference("i", InferenceStatus::Complete).unwrap();
    }

    #[test]
    fn test_state_machine_rejects_illegal() {
        let mut board = board_with(&[], &["i"]);
        // pending -> complete skips in_progress
        assert!(matches!(
            board.mark_inference("i", InferenceStatus::Complete),
            Err(StateError::IllegalTransition { .. })
        ));
        board.mark_inference("i", InferenceStatus::InProgress).unwrap();
        board.mark_inference("i", InferenceStatus::Complete).unwrap();
        // complete -> pending only via begin_iteration
        assert!(matches!(
            board.mark_inference("i", InferenceStatus::Pending),
            Err(StateError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_skip_records_sentinel() {
        let mut board = board_with(&[], &["i"]);
        board.skip_inference("i").unwrap();
        assert_eq!(board.inference_status("i"), Some(InferenceStatus::Complete));
        assert!(board.was_skipped("i"));
    }

    #[test]
    fn test_begin_iteration_resets_after_snapshot() {
        let mut board = board_with(&[("x", false)], &["body"]);
        board
            .set_reference("x", Reference::singleton(CellValue::string("iter0")), Some("body"))
            .unwrap();
        board.mark_inference("body", InferenceStatus::InProgress).unwrap();
        board.mark_inference("body", InferenceStatus::Complete).unwrap();

        let prefix: FlowIndex = "1.4".parse().unwrap();
        board.push_iteration_snapshot(&prefix, "x", board.get_reference("x").unwrap().clone());
        board.begin_iteration(&prefix, &["x".to_string()], &["body".to_string()]);

        assert_eq!(board.concept_status("x"), Some(ConceptStatus::Pending));
        assert_eq!(board.inference_status("body"), Some(InferenceStatus::Pending));
        assert!(board.get_reference("x").is_err());
        let history = board.iteration_history(&prefix, "x");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sole().unwrap().as_str(), Some("iter0"));
    }

    #[test]
    fn test_support_edges() {
        let mut board = board_with(&[("x", true)], &["i"]);
        let version = board.version_of("x").unwrap();
        board.record_support("i", "x", version);
        assert!(board.support_of("i").unwrap().contains(&("x".to_string(), version)));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut board = board_with(&[("g", true), ("x", false)], &["i1", "i2"]);
        board
            .set_reference("x", Reference::singleton(CellValue::string("v")), Some("i1"))
            .unwrap();
        board.mark_inference("i1", InferenceStatus::InProgress).unwrap();
        board.mark_inference("i1", InferenceStatus::Complete).unwrap();
        board.record_support("i1", "g", board.version_of("g").unwrap());
        board.note_fired("i1");
        board.note_fired_once("i2");
        board.bump_retry("i2");
        let prefix: FlowIndex = "2".parse().unwrap();
        board.push_iteration_snapshot(&prefix, "x", Reference::singleton(CellValue::string("h")));
        board.set_loop_state(
            "i2",
            LoopState {
                iteration: 1,
                total: 3,
                accumulators: BTreeMap::from([(
                    "x".to_string(),
                    Reference::singleton(CellValue::string("acc")),
                )]),
            },
        );

        let snapshot = board.snapshot().unwrap();
        let restored = Blackboard::restore(&snapshot).unwrap();
        assert_eq!(board, restored);
        // And the snapshot of the restore is byte-identical
        assert_eq!(snapshot, restored.snapshot().unwrap());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(Blackboard::restore(&json!({})).is_err());
        assert!(Blackboard::restore(&json!({"next_version": 0})).is_err());
    }

    #[test]
    fn test_alias_shares_version() {
        let mut board = board_with(&[("src", true), ("dst", false)], &[]);
        let src_version = board.version_of("src").unwrap();

        let aliased = board.alias_reference("dst", "src").unwrap();
        assert_eq!(aliased, src_version);
        assert!(board.concept_complete("dst"));
        assert_eq!(board.get_reference("dst").unwrap(), board.get_reference("src").unwrap());
    }

    #[test]
    fn test_counts() {
        let mut board = board_with(&[], &["a", "b"]);
        assert_eq!(board.counts(), (0, 2));
        board.mark_inference("a", InferenceStatus::InProgress).unwrap();
        board.mark_inference("a", InferenceStatus::Complete).unwrap();
        assert_eq!(board.counts(), (1, 2));
    }
}
