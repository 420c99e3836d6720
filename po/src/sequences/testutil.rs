//! Shared fixtures for handler tests

use serde_json::Value;
use tempfile::TempDir;

use crate::blackboard::Blackboard;
use crate::body::{Body, BodyBuilder};
use crate::plan::Plan;

/// Materialize a plan package in a tempdir and load it
pub fn plan_from(concepts: Value, inferences: Value) -> (TempDir, Plan) {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("manifest.json"),
        serde_json::to_string(&serde_json::json!({
            "name": "fixture",
            "version": "0.0.0",
            "entry": {"concepts": "concept_repo.json", "inferences": "inference_repo.json"}
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        temp.path().join("concept_repo.json"),
        serde_json::to_string(&concepts).unwrap(),
    )
    .unwrap();
    std::fs::write(
        temp.path().join("inference_repo.json"),
        serde_json::to_string(&inferences).unwrap(),
    )
    .unwrap();
    let plan = Plan::load_dir(temp.path()).unwrap();
    (temp, plan)
}

/// Blackboard seeded with the plan's ground concepts
pub fn seeded_board(plan: &Plan) -> Blackboard {
    let mut board = Blackboard::new();
    for concept in plan.concepts.iter() {
        let ground = concept
            .is_ground_concept
            .then(|| concept.initial_reference().unwrap());
        board.register_concept(&concept.id, ground);
    }
    for inference in plan.inferences.iter_flow_order() {
        board.register_inference(&inference.id);
    }
    board
}

/// A mock body sandboxed in its own tempdir
pub fn mock_body() -> (TempDir, Body) {
    let temp = TempDir::new().unwrap();
    let body = BodyBuilder::mock(temp.path()).build();
    (temp, body)
}
