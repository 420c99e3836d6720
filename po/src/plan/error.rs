//! Plan load errors
//!
//! Everything here surfaces at deploy/load time; a package that trips any of
//! these is rejected before a run is created.

use thiserror::Error;

use crate::reference::ReferenceError;

/// Errors raised while loading a plan package
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Concept {id} referenced by {referenced_by} does not exist")]
    ConceptMissing { id: String, referenced_by: String },

    #[error("Concept name {name} referenced by {referenced_by} is ambiguous ({count} matches)")]
    AmbiguousConceptName {
        name: String,
        referenced_by: String,
        count: usize,
    },

    #[error("Unknown inference sequence tag {tag} on {inference}")]
    UnknownSequence { tag: String, inference: String },

    #[error("Unknown concept type tag {tag} on {concept}")]
    UnknownConceptType { tag: String, concept: String },

    #[error("Unrecognized working_interpretation key {key} on {inference}")]
    UnknownInterpretationKey { key: String, inference: String },

    #[error("Static cycle through concepts: {}", path.join(" -> "))]
    StaticCycle { path: Vec<String> },

    #[error("Bad ground reference for concept {concept}: {source}")]
    BadReference {
        concept: String,
        #[source]
        source: ReferenceError,
    },

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Bad flow index {0}")]
    BadFlowIndex(String),

    #[error("Package missing entry: {0}")]
    PackageEntryMissing(String),

    #[error("Package JSON error in {file}: {source}")]
    PackageJson {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Package I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package archive error: {0}")]
    Archive(String),
}
