//! Load-time catalogs of concepts and inferences
//!
//! Cross-references between records are stored as ids and resolved by map
//! lookup, never as object pointers. Name references inside working
//! interpretations are rewritten to ids at load; unresolved names fail fast.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::concept::{Concept, ConceptEntry};
use super::error::LoadError;
use super::flow::FlowIndex;
use super::inference::{Inference, InferenceEntry, SequenceKind};

/// Immutable catalog of concepts, indexed by id and (non-unique) name
#[derive(Debug, Default)]
pub struct ConceptRepo {
    by_id: BTreeMap<String, Concept>,
    name_index: BTreeMap<String, Vec<String>>,
}

impl ConceptRepo {
    pub fn load(entries: Vec<ConceptEntry>) -> Result<Self, LoadError> {
        let mut repo = Self::default();
        for entry in entries {
            let concept = Concept::from_entry(entry)?;
            if repo.by_id.contains_key(&concept.id) {
                return Err(LoadError::DuplicateId(concept.id));
            }
            repo.name_index
                .entry(concept.concept_name.clone())
                .or_default()
                .push(concept.id.clone());
            repo.by_id.insert(concept.id.clone(), concept);
        }
        debug!(concepts = repo.by_id.len(), "Loaded concept repo");
        Ok(repo)
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.by_id.get(id)
    }

    pub fn require(&self, id: &str, referenced_by: &str) -> Result<&Concept, LoadError> {
        self.by_id.get(id).ok_or_else(|| LoadError::ConceptMissing {
            id: id.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }

    /// Names need not be unique; lookup returns every match
    pub fn by_name(&self, name: &str) -> &[String] {
        self.name_index.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve an id-or-name reference to an id
    pub fn resolve(&self, id_or_name: &str, referenced_by: &str) -> Result<String, LoadError> {
        if self.by_id.contains_key(id_or_name) {
            return Ok(id_or_name.to_string());
        }
        match self.by_name(id_or_name) {
            [] => Err(LoadError::ConceptMissing {
                id: id_or_name.to_string(),
                referenced_by: referenced_by.to_string(),
            }),
            [only] => Ok(only.clone()),
            many => Err(LoadError::AmbiguousConceptName {
                name: id_or_name.to_string(),
                referenced_by: referenced_by.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.by_id.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.by_id.keys()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Immutable catalog of inferences, indexed by id, output concept and flow index
#[derive(Debug, Default)]
pub struct InferenceRepo {
    by_id: BTreeMap<String, Inference>,
    by_concept: BTreeMap<String, Vec<String>>,
    by_flow: BTreeMap<FlowIndex, String>,
    flow_order: Vec<String>,
}

impl InferenceRepo {
    /// Load and validate entries against the concept repo
    pub fn load(entries: Vec<InferenceEntry>, concepts: &ConceptRepo) -> Result<Self, LoadError> {
        let mut repo = Self::default();

        for entry in entries {
            let mut inference = Inference::from_entry(entry)?;
            if repo.by_id.contains_key(&inference.id) {
                return Err(LoadError::DuplicateId(inference.id));
            }

            // All direct concept references must exist
            concepts.require(&inference.concept_to_infer, &inference.id)?;
            if let Some(f) = &inference.function_concept {
                concepts.require(f, &inference.id)?;
            }
            for cid in inference.value_concepts.iter().chain(&inference.context_concepts) {
                concepts.require(cid, &inference.id)?;
            }

            // Rewrite name references inside the interpretation to ids
            let id = inference.id.clone();
            for r in inference.interpretation.concept_refs_mut() {
                *r = concepts.resolve(r, &id)?;
            }
            let order = std::mem::take(&mut inference.interpretation.value_order);
            for (cid, pos) in order {
                let resolved = concepts.resolve(&cid, &id)?;
                inference.interpretation.value_order.insert(resolved, pos);
            }
            let carriers = std::mem::take(&mut inference.interpretation.syntax.in_loop_concepts);
            for (carrier, source) in carriers {
                let carrier = concepts.resolve(&carrier, &id)?;
                let source = concepts.resolve(&source, &id)?;
                inference.interpretation.syntax.in_loop_concepts.insert(carrier, source);
            }

            repo.by_concept
                .entry(inference.concept_to_infer.clone())
                .or_default()
                .push(inference.id.clone());
            repo.by_flow.insert(inference.flow_index.clone(), inference.id.clone());
            repo.by_id.insert(inference.id.clone(), inference);
        }

        repo.flow_order = repo.by_flow.values().cloned().collect();
        repo.check_static_cycles(concepts)?;
        debug!(inferences = repo.by_id.len(), "Loaded inference repo");
        Ok(repo)
    }

    /// Reject support cycles that no loop marker mediates
    fn check_static_cycles(&self, _concepts: &ConceptRepo) -> Result<(), LoadError> {
        // Edges: input concept -> inferred concept, skipping loop machinery
        let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for inf in self.by_id.values() {
            if inf.sequence == SequenceKind::Looping {
                continue;
            }
            let carried: HashSet<&str> = self
                .by_id
                .values()
                .filter(|i| i.sequence == SequenceKind::Looping)
                .flat_map(|i| {
                    i.interpretation
                        .syntax
                        .in_loop_concepts
                        .keys()
                        .map(String::as_str)
                        .chain(i.interpretation.syntax.current_loop_base_concept.as_deref())
                })
                .collect();

            for input in inf.input_concepts() {
                if carried.contains(input) {
                    continue;
                }
                edges.entry(input).or_default().push(&inf.concept_to_infer);
            }
        }

        // Iterative DFS with coloring
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color: BTreeMap<&str, Color> = edges.keys().map(|k| (*k, Color::White)).collect();
        for targets in edges.values() {
            for t in targets {
                color.entry(t).or_insert(Color::White);
            }
        }

        fn visit<'a>(
            node: &'a str,
            edges: &BTreeMap<&'a str, Vec<&'a str>>,
            color: &mut BTreeMap<&'a str, Color>,
            stack: &mut Vec<&'a str>,
        ) -> Result<(), LoadError> {
            color.insert(node, Color::Gray);
            stack.push(node);
            if let Some(targets) = edges.get(node) {
                for t in targets {
                    match color.get(t).copied().unwrap_or(Color::White) {
                        Color::Gray => {
                            let start = stack.iter().position(|n| n == t).unwrap_or(0);
                            let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                            path.push(t.to_string());
                            return Err(LoadError::StaticCycle { path });
                        }
                        Color::White => visit(t, edges, color, stack)?,
                        Color::Black => {}
                    }
                }
            }
            stack.pop();
            color.insert(node, Color::Black);
            Ok(())
        }

        let nodes: Vec<&str> = color.keys().copied().collect();
        let mut stack = Vec::new();
        for node in nodes {
            if color[node] == Color::White {
                visit(node, &edges, &mut color, &mut stack)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Inference> {
        self.by_id.get(id)
    }

    /// Inferences writing a given concept
    pub fn producing(&self, cid: &str) -> &[String] {
        self.by_concept.get(cid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_flow_index(&self, flow: &FlowIndex) -> Option<&Inference> {
        self.by_flow.get(flow).and_then(|id| self.by_id.get(id))
    }

    /// Iterate in flow-index order (the waitlist scan order)
    pub fn iter_flow_order(&self) -> impl Iterator<Item = &Inference> {
        self.flow_order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Inferences strictly inside a flow-index subtree
    pub fn in_subtree(&self, prefix: &FlowIndex) -> Vec<&Inference> {
        self.iter_flow_order()
            .filter(|inf| prefix.is_prefix_of(&inf.flow_index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
