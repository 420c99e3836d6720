//! Plan model: concepts, inferences, repositories, packages
//!
//! Everything in this module is immutable after load. Runtime state lives in
//! the blackboard; the plan is the shared read-only catalog every run of a
//! deployment consults.

mod concept;
mod error;
mod flow;
mod inference;
mod package;
mod repo;

pub use concept::{Concept, ConceptEntry, ConceptType};
pub use error::LoadError;
pub use flow::FlowIndex;
pub use inference::{
    FlowInfo, Inference, InferenceEntry, SequenceKind, StartFlags, SyntaxInfo, ValueSelector, WorkingInterpretation,
};
pub use package::{InputSpec, Manifest, ManifestEntry, OutputSpec, Plan};
pub use repo::{ConceptRepo, InferenceRepo};
