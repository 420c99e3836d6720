//! Property tests for the reference algebra and snapshot round-trips

use proptest::prelude::*;
use serde_json::{Value, json};

use planorch::reference::{Callable, CellValue, Reference};
use planorch::{Blackboard, FlowIndex};

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        "[a-z]{0,8}".prop_map(Value::String),
        Just(Value::Null),
    ]
}

/// 1-D references with 0..6 cells
fn vector_strategy() -> impl Strategy<Value = Reference> {
    proptest::collection::vec(leaf_strategy(), 0..6).prop_map(|leaves| {
        Reference::from_nested_json(&Value::Array(leaves), &["items".to_string()]).unwrap()
    })
}

/// 2-D references with bounded shape
fn matrix_strategy() -> impl Strategy<Value = Reference> {
    proptest::collection::vec(proptest::collection::vec(leaf_strategy(), 1..4), 1..4).prop_map(|rows| {
        let data = Value::Array(rows.into_iter().map(Value::Array).collect());
        Reference::from_nested_json(&data, &["row".to_string(), "col".to_string()]).unwrap()
    })
}

proptest! {
    #[test]
    fn element_action_identity(reference in matrix_strategy()) {
        let out = Reference::element_action(|cells| cells[0].clone(), &[&reference]).unwrap();
        prop_assert_eq!(out, reference);
    }

    #[test]
    fn canonical_roundtrip_exact(reference in matrix_strategy()) {
        let canonical = reference.to_canonical().unwrap();
        let back = Reference::from_canonical(&canonical).unwrap();
        prop_assert_eq!(&back, &reference);
        // Axes, sizes and cell contents all survive; encoding is stable
        prop_assert_eq!(back.to_canonical().unwrap(), canonical);
    }

    #[test]
    fn vector_roundtrip_exact(reference in vector_strategy()) {
        let canonical = reference.to_canonical().unwrap();
        prop_assert_eq!(Reference::from_canonical(&canonical).unwrap(), reference);
    }

    #[test]
    fn broadcast_never_changes_sized_axis(values in proptest::collection::vec(any::<i64>(), 1..6)) {
        let vector = Reference::from_nested_json(
            &Value::Array(values.iter().map(|v| json!(v)).collect()),
            &["items".to_string()],
        ).unwrap();
        let scalar = Reference::singleton(CellValue::Literal(json!(1)));

        let out = Reference::element_action(
            |cells| {
                let a = cells[0].as_literal().and_then(Value::as_i64).unwrap_or(0);
                let b = cells[1].as_literal().and_then(Value::as_i64).unwrap_or(0);
                CellValue::Literal(json!(a + b))
            },
            &[&vector, &scalar],
        ).unwrap();

        prop_assert_eq!(out.axis_size("items").unwrap(), values.len());
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(
                out.get(&[("items", i)]).unwrap().as_literal().and_then(Value::as_i64),
                Some(v + 1)
            );
        }
    }

    #[test]
    fn blackboard_snapshot_roundtrip(values in proptest::collection::vec(leaf_strategy(), 1..5)) {
        let mut board = Blackboard::new();
        for (i, value) in values.iter().enumerate() {
            let cid = format!("c{i}");
            board.register_concept(&cid, Some(Reference::singleton(CellValue::from_leaf(value.clone()))));
            board.register_inference(&format!("i{i}"));
        }
        let prefix: FlowIndex = "1.2".parse().unwrap();
        board.push_iteration_snapshot(&prefix, "c0", Reference::singleton(CellValue::string("h")));

        let snapshot = board.snapshot().unwrap();
        let restored = Blackboard::restore(&snapshot).unwrap();
        prop_assert_eq!(&restored, &board);
        prop_assert_eq!(restored.snapshot().unwrap(), snapshot);
    }
}

#[tokio::test]
async fn cross_then_collapse_matches_element_action() {
    // Singleton result axis: cross_action then collapse == element_action
    let reference =
        Reference::from_nested_json(&json!([2, 5, 7]), &["items".to_string()]).unwrap();

    let negate = Callable::from_sync("negate", |args| {
        let n = args["input_1"].as_literal().and_then(Value::as_i64).unwrap_or(0);
        Ok(vec![CellValue::Literal(json!(-n))])
    });

    let mut crossed = reference.cross_action(&negate, "out").await.unwrap();
    crossed.collapse("out").unwrap();

    let pointwise = Reference::element_action(
        |cells| {
            let n = cells[0].as_literal().and_then(Value::as_i64).unwrap_or(0);
            CellValue::Literal(json!(-n))
        },
        &[&reference],
    )
    .unwrap();

    assert_eq!(crossed, pointwise);
}
