//! The Reference: a named-axis tensor of cell values
//!
//! A reference is an ordered list of named axes plus a sparse cell store
//! keyed by coordinate tuples. Axes of size 1 broadcast against any size.
//! The cell store is a BTreeMap so iteration order is the canonical
//! coordinate order, which makes serialization and logs deterministic.

use std::collections::BTreeMap;

use serde_json::Value;

use super::cell::{Callable, CallableArgs, CellValue};
use super::error::ReferenceError;

/// One named axis with a finite size (0 allowed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    pub size: usize,
}

/// Coordinate tuple aligned with the axis list
pub type Coord = Vec<usize>;

/// A named-axis tensor of cell values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reference {
    axes: Vec<Axis>,
    cells: BTreeMap<Coord, CellValue>,
}

impl Reference {
    /// An empty reference with no axes and no cells
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero-axis reference holding exactly one value
    pub fn singleton(value: CellValue) -> Self {
        let mut r = Self::new();
        r.cells.insert(vec![], value);
        r
    }

    /// A fresh mutable reference with the declared axes, all empty
    pub fn with_axes<S: AsRef<str>>(names: &[S]) -> Result<Self, ReferenceError> {
        let mut r = Self::new();
        for name in names {
            r.append_axis(name.as_ref(), 0)?;
        }
        Ok(r)
    }

    /// Build from nested JSON arrays: the outermost array maps to the first
    /// axis name. String leaves with sign shape become signs.
    pub fn from_nested_json(data: &Value, axis_names: &[String]) -> Result<Self, ReferenceError> {
        let mut r = Self::with_axes(axis_names)?;
        let mut prefix = Vec::new();
        r.fill_nested(data, 0, &mut prefix)?;
        Ok(r)
    }

    fn fill_nested(&mut self, data: &Value, depth: usize, prefix: &mut Coord) -> Result<(), ReferenceError> {
        if depth == self.axes.len() {
            self.cells.insert(prefix.clone(), CellValue::from_leaf(data.clone()));
            return Ok(());
        }
        match data {
            Value::Array(items) => {
                self.axes[depth].size = self.axes[depth].size.max(items.len());
                for (i, item) in items.iter().enumerate() {
                    prefix.push(i);
                    self.fill_nested(item, depth + 1, prefix)?;
                    prefix.pop();
                }
            }
            // A scalar at array depth occupies index 0 (singleton level)
            other => {
                self.axes[depth].size = self.axes[depth].size.max(1);
                prefix.push(0);
                self.fill_nested(other, depth + 1, prefix)?;
                prefix.pop();
            }
        }
        Ok(())
    }

    // === Introspection ===

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis_names(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.name.clone()).collect()
    }

    pub fn shape(&self) -> Vec<(String, usize)> {
        self.axes.iter().map(|a| (a.name.clone(), a.size)).collect()
    }

    pub fn has_axis(&self, name: &str) -> bool {
        self.axes.iter().any(|a| a.name == name)
    }

    pub fn axis_size(&self, name: &str) -> Result<usize, ReferenceError> {
        self.axes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.size)
            .ok_or_else(|| ReferenceError::AxisMissing { axis: name.to_string() })
    }

    fn axis_pos(&self, name: &str) -> Result<usize, ReferenceError> {
        self.axes
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| ReferenceError::AxisMissing { axis: name.to_string() })
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate cells in canonical coordinate order
    pub fn cells(&self) -> impl Iterator<Item = (&Coord, &CellValue)> {
        self.cells.iter()
    }

    /// The single value of a reference with exactly one cell
    pub fn sole(&self) -> Result<&CellValue, ReferenceError> {
        if self.cells.len() == 1 {
            Ok(self.cells.values().next().unwrap())
        } else {
            Err(ReferenceError::CellMissing {
                coord: format!("<sole of {} cells>", self.cells.len()),
            })
        }
    }

    // === Coordinate resolution ===

    /// Resolve kwargs into a full coordinate; singleton axes default to 0
    fn resolve(&self, kwargs: &[(&str, usize)]) -> Result<Coord, ReferenceError> {
        let mut coord = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let given = kwargs.iter().find(|(n, _)| *n == axis.name).map(|(_, i)| *i);
            let index = match given {
                Some(i) => i,
                None if axis.size <= 1 => 0,
                None => {
                    return Err(ReferenceError::AxisMissing {
                        axis: axis.name.clone(),
                    });
                }
            };
            if axis.size > 0 && index >= axis.size {
                return Err(ReferenceError::OutOfRange {
                    axis: axis.name.clone(),
                    index,
                    size: axis.size,
                });
            }
            coord.push(index);
        }
        Ok(coord)
    }

    pub fn exists(&self, kwargs: &[(&str, usize)]) -> bool {
        self.resolve(kwargs).map(|c| self.cells.contains_key(&c)).unwrap_or(false)
    }

    pub fn get(&self, kwargs: &[(&str, usize)]) -> Result<&CellValue, ReferenceError> {
        let coord = self.resolve(kwargs)?;
        self.cells.get(&coord).ok_or(ReferenceError::CellMissing {
            coord: format!("{coord:?}"),
        })
    }

    /// Set a cell; never changes axis sizes (use append for growth)
    pub fn set(&mut self, kwargs: &[(&str, usize)], value: CellValue) -> Result<(), ReferenceError> {
        let coord = self.resolve(kwargs)?;
        self.cells.insert(coord, value);
        Ok(())
    }

    /// Get by positional coordinate (internal plumbing, axis order)
    pub fn get_at(&self, coord: &Coord) -> Option<&CellValue> {
        self.cells.get(coord)
    }

    // === Mutation ===

    /// Append a new axis at the end; existing cells land at index 0
    pub fn append_axis(&mut self, name: &str, size: usize) -> Result<(), ReferenceError> {
        if self.has_axis(name) {
            return Err(ReferenceError::DuplicateAxis { axis: name.to_string() });
        }
        self.axes.push(Axis {
            name: name.to_string(),
            size,
        });
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .map(|(mut coord, v)| {
                coord.push(0);
                (coord, v)
            })
            .collect();
        if !self.cells.is_empty() {
            let last = self.axes.last_mut().unwrap();
            last.size = last.size.max(1);
        }
        Ok(())
    }

    /// Append a cell at index `k` on `axis`, growing it as needed.
    /// Other axes take index 0 (accumulator shape used by loops/groupings).
    pub fn append_cell(&mut self, axis: &str, k: usize, value: CellValue) -> Result<(), ReferenceError> {
        let pos = self.axis_pos(axis)?;
        self.axes[pos].size = self.axes[pos].size.max(k + 1);
        for a in self.axes.iter_mut() {
            if a.name != axis && a.size == 0 {
                a.size = 1;
            }
        }
        let coord: Coord = self
            .axes
            .iter()
            .enumerate()
            .map(|(i, _)| if i == pos { k } else { 0 })
            .collect();
        self.cells.insert(coord, value);
        Ok(())
    }

    /// Remove a size-1 axis
    pub fn collapse(&mut self, axis: &str) -> Result<(), ReferenceError> {
        let pos = self.axis_pos(axis)?;
        let size = self.axes[pos].size;
        if size > 1 {
            return Err(ReferenceError::CollapseNonSingleton {
                axis: axis.to_string(),
                size,
            });
        }
        self.axes.remove(pos);
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .map(|(mut coord, v)| {
                coord.remove(pos);
                (coord, v)
            })
            .collect();
        Ok(())
    }

    /// Rename an axis in place (grouping reinterprets, it does not copy)
    pub fn rename_axis(&mut self, from: &str, to: &str) -> Result<(), ReferenceError> {
        if from != to && self.has_axis(to) {
            return Err(ReferenceError::DuplicateAxis { axis: to.to_string() });
        }
        let pos = self.axis_pos(from)?;
        self.axes[pos].name = to.to_string();
        Ok(())
    }

    // === Algebra ===

    /// Apply `f` pointwise over aligned cells of the inputs.
    ///
    /// Result axes are the union of input axes in first-seen order; sizes are
    /// the max per axis with singleton broadcasting. Two non-singleton sizes
    /// that disagree are a shape mismatch.
    pub fn element_action<F>(f: F, refs: &[&Reference]) -> Result<Reference, ReferenceError>
    where
        F: Fn(&[&CellValue]) -> CellValue,
    {
        let axes = union_axes(refs)?;
        let mut out = Reference {
            axes: axes.clone(),
            cells: BTreeMap::new(),
        };

        for coord in cartesian(&axes) {
            let mut row: Vec<&CellValue> = Vec::with_capacity(refs.len());
            let mut complete = true;
            for r in refs {
                match project(r, &axes, &coord) {
                    Some(cell) => row.push(cell),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                out.cells.insert(coord, f(&row));
            }
        }
        Ok(out)
    }

    /// Apply a callable across every cell, gaining `new_axis`.
    ///
    /// Dict cells are passed as named arguments; any other cell is passed as
    /// `input_1`. A call returning N values makes `new_axis` at least N long.
    pub async fn cross_action(&self, callable: &Callable, new_axis: &str) -> Result<Reference, ReferenceError> {
        if self.has_axis(new_axis) {
            return Err(ReferenceError::DuplicateAxis {
                axis: new_axis.to_string(),
            });
        }
        let mut out = Reference {
            axes: self.axes.clone(),
            cells: BTreeMap::new(),
        };
        out.axes.push(Axis {
            name: new_axis.to_string(),
            size: 1,
        });

        for (coord, cell) in &self.cells {
            let args: CallableArgs = match cell {
                CellValue::Dict(d) => d.clone(),
                other => {
                    let mut args = CallableArgs::new();
                    args.insert("input_1".to_string(), other.clone());
                    args
                }
            };
            let values = callable
                .invoke(args)
                .await
                .map_err(|e| ReferenceError::BadCanonical(format!("callable {}: {e}", callable.name())))?;
            let pos = out.axes.len() - 1;
            out.axes[pos].size = out.axes[pos].size.max(values.len());
            for (j, value) in values.into_iter().enumerate() {
                let mut c = coord.clone();
                c.push(j);
                out.cells.insert(c, value);
            }
        }
        Ok(out)
    }

    /// Fix `axis` at `index` and drop it, keeping the matching cells.
    /// The slice a loop binds its per-iteration base concept to.
    pub fn select(&self, axis: &str, index: usize) -> Result<Reference, ReferenceError> {
        let pos = self.axis_pos(axis)?;
        let size = self.axes[pos].size;
        if index >= size {
            return Err(ReferenceError::OutOfRange {
                axis: axis.to_string(),
                index,
                size,
            });
        }
        let mut out = Reference {
            axes: self
                .axes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos)
                .map(|(_, a)| a.clone())
                .collect(),
            cells: BTreeMap::new(),
        };
        for (coord, cell) in &self.cells {
            if coord[pos] != index {
                continue;
            }
            let mut reduced = coord.clone();
            reduced.remove(pos);
            out.cells.insert(reduced, cell.clone());
        }
        Ok(out)
    }

    /// Select element `index` along `axis` (last axis when `None`), then key
    /// `key` out of each dict cell. The result has one fewer axis.
    pub fn derelation(&self, axis: Option<&str>, index: usize, key: &str) -> Result<Reference, ReferenceError> {
        let pos = match axis {
            Some(name) => self.axis_pos(name)?,
            None => {
                if self.axes.is_empty() {
                    return Err(ReferenceError::AxisMissing { axis: "<last>".into() });
                }
                self.axes.len() - 1
            }
        };
        let size = self.axes[pos].size;
        if index >= size {
            return Err(ReferenceError::OutOfRange {
                axis: self.axes[pos].name.clone(),
                index,
                size,
            });
        }

        let mut out = Reference {
            axes: self
                .axes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos)
                .map(|(_, a)| a.clone())
                .collect(),
            cells: BTreeMap::new(),
        };

        for (coord, cell) in &self.cells {
            if coord[pos] != index {
                continue;
            }
            let mut reduced = coord.clone();
            reduced.remove(pos);
            let selected = match cell {
                CellValue::Dict(d) => d.get(key).cloned().ok_or(ReferenceError::KeyMissing {
                    coord: format!("{coord:?}"),
                    key: key.to_string(),
                })?,
                CellValue::Literal(Value::Object(map)) => map
                    .get(key)
                    .map(|v| CellValue::from_leaf(v.clone()))
                    .ok_or(ReferenceError::KeyMissing {
                        coord: format!("{coord:?}"),
                        key: key.to_string(),
                    })?,
                _ => {
                    return Err(ReferenceError::NotADict {
                        coord: format!("{coord:?}"),
                        key: key.to_string(),
                    });
                }
            };
            out.cells.insert(reduced, selected);
        }
        Ok(out)
    }

    // === Serialization ===

    /// Canonical encoding: axes in order, cells in coordinate order
    pub fn to_canonical(&self) -> Result<Value, ReferenceError> {
        let axes: Vec<Value> = self
            .axes
            .iter()
            .map(|a| serde_json::json!({"name": a.name, "size": a.size}))
            .collect();
        let mut cells = Vec::with_capacity(self.cells.len());
        for (coord, cell) in &self.cells {
            let mut coord_obj = serde_json::Map::new();
            for (axis, index) in self.axes.iter().zip(coord) {
                coord_obj.insert(axis.name.clone(), Value::from(*index));
            }
            cells.push(serde_json::json!({"coord": coord_obj, "value": cell.to_json()?}));
        }
        Ok(serde_json::json!({"axes": axes, "cells": cells}))
    }

    /// Rebuild from the canonical encoding; exact round-trip
    pub fn from_canonical(value: &Value) -> Result<Self, ReferenceError> {
        let axes_json = value
            .get("axes")
            .and_then(Value::as_array)
            .ok_or_else(|| ReferenceError::BadCanonical("missing axes".into()))?;
        let mut axes = Vec::with_capacity(axes_json.len());
        for a in axes_json {
            let name = a
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ReferenceError::BadCanonical("axis missing name".into()))?;
            let size = a
                .get("size")
                .and_then(Value::as_u64)
                .ok_or_else(|| ReferenceError::BadCanonical("axis missing size".into()))?;
            axes.push(Axis {
                name: name.to_string(),
                size: size as usize,
            });
        }

        let mut cells = BTreeMap::new();
        let cells_json = value
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| ReferenceError::BadCanonical("missing cells".into()))?;
        for c in cells_json {
            let coord_obj = c
                .get("coord")
                .and_then(Value::as_object)
                .ok_or_else(|| ReferenceError::BadCanonical("cell missing coord".into()))?;
            let mut coord = Vec::with_capacity(axes.len());
            for axis in &axes {
                let index = coord_obj
                    .get(&axis.name)
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ReferenceError::BadCanonical(format!("coord missing axis {}", axis.name)))?;
                coord.push(index as usize);
            }
            let cell = CellValue::from_json(
                c.get("value")
                    .ok_or_else(|| ReferenceError::BadCanonical("cell missing value".into()))?,
            )?;
            cells.insert(coord, cell);
        }
        Ok(Reference { axes, cells })
    }

    /// Render back to nested JSON arrays (result extraction)
    pub fn to_nested_json(&self) -> Result<Value, ReferenceError> {
        fn cell_to_json(cell: &CellValue) -> Result<Value, ReferenceError> {
            Ok(match cell {
                CellValue::Literal(v) => v.clone(),
                CellValue::Sign(s) => Value::String(s.to_string()),
                CellValue::Dict(d) => {
                    let mut map = serde_json::Map::new();
                    for (k, v) in d {
                        map.insert(k.clone(), cell_to_json(v)?);
                    }
                    Value::Object(map)
                }
                CellValue::Reference(r) => r.to_nested_json()?,
                CellValue::Callable(_) => return Err(ReferenceError::NotSerializable),
            })
        }

        fn build(r: &Reference, depth: usize, prefix: &mut Coord) -> Result<Value, ReferenceError> {
            if depth == r.axes.len() {
                return match r.cells.get(prefix) {
                    Some(cell) => cell_to_json(cell),
                    None => Ok(Value::Null),
                };
            }
            let mut items = Vec::with_capacity(r.axes[depth].size);
            for i in 0..r.axes[depth].size {
                prefix.push(i);
                items.push(build(r, depth + 1, prefix)?);
                prefix.pop();
            }
            Ok(Value::Array(items))
        }

        let mut prefix = Vec::new();
        build(self, 0, &mut prefix)
    }
}

/// Union of axes in first-seen order with broadcast-checked sizes
fn union_axes(refs: &[&Reference]) -> Result<Vec<Axis>, ReferenceError> {
    let mut axes: Vec<Axis> = Vec::new();
    for r in refs {
        for axis in r.axes() {
            match axes.iter_mut().find(|a| a.name == axis.name) {
                Some(existing) => {
                    if existing.size > 1 && axis.size > 1 && existing.size != axis.size {
                        return Err(ReferenceError::ShapeMismatch {
                            axis: axis.name.clone(),
                            left: existing.size,
                            right: axis.size,
                        });
                    }
                    existing.size = existing.size.max(axis.size);
                }
                None => axes.push(axis.clone()),
            }
        }
    }
    Ok(axes)
}

/// All coordinates of the axis list in canonical order
fn cartesian(axes: &[Axis]) -> Vec<Coord> {
    let mut coords = vec![vec![]];
    for axis in axes {
        let mut next = Vec::with_capacity(coords.len() * axis.size.max(1));
        for coord in &coords {
            for i in 0..axis.size.max(1) {
                let mut c = coord.clone();
                c.push(i);
                next.push(c);
            }
        }
        coords = next;
    }
    coords
}

/// Project a result coordinate onto one input, broadcasting singletons
fn project<'a>(r: &'a Reference, result_axes: &[Axis], coord: &Coord) -> Option<&'a CellValue> {
    let mut projected = Vec::with_capacity(r.axes().len());
    for axis in r.axes() {
        let pos = result_axes.iter().position(|a| a.name == axis.name)?;
        let index = if axis.size <= 1 { 0 } else { coord[pos] };
        projected.push(index);
    }
    r.get_at(&projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vec_ref(axis: &str, values: &[i64]) -> Reference {
        let data = Value::Array(values.iter().map(|v| json!(v)).collect());
        Reference::from_nested_json(&data, &[axis.to_string()]).unwrap()
    }

    #[test]
    fn test_from_nested_json_shape() {
        let data = json!([["4", "5", "6"], ["7", "8", "9"]]);
        let r = Reference::from_nested_json(&data, &["number".into(), "digit".into()]).unwrap();

        assert_eq!(r.shape(), vec![("number".to_string(), 2), ("digit".to_string(), 3)]);
        assert_eq!(
            r.get(&[("number", 1), ("digit", 2)]).unwrap().as_str(),
            Some("9")
        );
    }

    #[test]
    fn test_get_singleton_broadcast() {
        let r = Reference::from_nested_json(&json!(["only"]), &["a".into()]).unwrap();
        // Size-1 axis key may be omitted
        assert_eq!(r.get(&[]).unwrap().as_str(), Some("only"));
    }

    #[test]
    fn test_get_missing_axis_key_fails() {
        let r = vec_ref("a", &[1, 2, 3]);
        assert!(matches!(r.get(&[]), Err(ReferenceError::AxisMissing { .. })));
    }

    #[test]
    fn test_get_out_of_range() {
        let r = vec_ref("a", &[1, 2]);
        assert!(matches!(
            r.get(&[("a", 5)]),
            Err(ReferenceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_set_within_bounds() {
        let mut r = vec_ref("a", &[1, 2]);
        r.set(&[("a", 0)], CellValue::string("replaced")).unwrap();
        assert_eq!(r.get(&[("a", 0)]).unwrap().as_str(), Some("replaced"));
        // Size unchanged
        assert_eq!(r.axis_size("a").unwrap(), 2);
    }

    #[test]
    fn test_append_axis_and_cell() {
        let mut r = Reference::with_axes(&["out"]).unwrap();
        assert_eq!(r.axis_size("out").unwrap(), 0);

        r.append_cell("out", 0, CellValue::string("first")).unwrap();
        r.append_cell("out", 1, CellValue::string("second")).unwrap();

        assert_eq!(r.axis_size("out").unwrap(), 2);
        assert_eq!(r.get(&[("out", 1)]).unwrap().as_str(), Some("second"));
    }

    #[test]
    fn test_append_axis_rejects_duplicate() {
        let mut r = Reference::with_axes(&["a"]).unwrap();
        assert!(matches!(
            r.append_axis("a", 1),
            Err(ReferenceError::DuplicateAxis { .. })
        ));
    }

    #[test]
    fn test_collapse_singleton_only() {
        let mut r = Reference::from_nested_json(&json!([[10], [20]]), &["a".into(), "b".into()]).unwrap();
        r.collapse("b").unwrap();
        assert_eq!(r.axis_names(), vec!["a"]);
        assert_eq!(r.get(&[("a", 1)]).unwrap().as_literal(), Some(&json!(20)));

        let mut r = vec_ref("a", &[1, 2]);
        assert!(matches!(
            r.collapse("a"),
            Err(ReferenceError::CollapseNonSingleton { size: 2, .. })
        ));
    }

    #[test]
    fn test_element_action_identity_law() {
        let r = vec_ref("a", &[1, 2, 3]);
        let out = Reference::element_action(|cells| cells[0].clone(), &[&r]).unwrap();
        assert_eq!(out, r);
    }

    #[test]
    fn test_element_action_broadcasting() {
        let xs = vec_ref("a", &[1, 2, 3]);
        let y = Reference::singleton(CellValue::Literal(json!(10)));

        let out = Reference::element_action(
            |cells| {
                let a = cells[0].as_literal().and_then(Value::as_i64).unwrap();
                let b = cells[1].as_literal().and_then(Value::as_i64).unwrap();
                CellValue::Literal(json!(a + b))
            },
            &[&xs, &y],
        )
        .unwrap();

        assert_eq!(out.axis_size("a").unwrap(), 3);
        assert_eq!(out.get(&[("a", 2)]).unwrap().as_literal(), Some(&json!(13)));
    }

    #[test]
    fn test_element_action_shape_mismatch() {
        let a = vec_ref("a", &[1, 2]);
        let b = vec_ref("a", &[1, 2, 3]);
        let result = Reference::element_action(|cells| cells[0].clone(), &[&a, &b]);
        assert!(matches!(result, Err(ReferenceError::ShapeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_cross_action_then_collapse_equals_element_action() {
        let r = vec_ref("a", &[1, 2, 3]);

        let double = Callable::from_sync("double", |args| {
            let n = args["input_1"].as_literal().and_then(Value::as_i64).unwrap();
            Ok(vec![CellValue::Literal(json!(n * 2))])
        });

        let mut crossed = r.cross_action(&double, "out").await.unwrap();
        crossed.collapse("out").unwrap();

        let elementwise = Reference::element_action(
            |cells| {
                let n = cells[0].as_literal().and_then(Value::as_i64).unwrap();
                CellValue::Literal(json!(n * 2))
            },
            &[&r],
        )
        .unwrap();

        assert_eq!(crossed, elementwise);
    }

    #[tokio::test]
    async fn test_cross_action_collection_grows_axis() {
        let r = Reference::singleton(CellValue::Literal(json!(3)));
        let explode = Callable::from_sync("explode", |args| {
            let n = args["input_1"].as_literal().and_then(Value::as_i64).unwrap();
            Ok((0..n).map(|i| CellValue::Literal(json!(i))).collect())
        });

        let out = r.cross_action(&explode, "items").await.unwrap();
        assert_eq!(out.axis_size("items").unwrap(), 3);
        assert_eq!(out.get(&[("items", 2)]).unwrap().as_literal(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_cross_action_rejects_existing_axis() {
        let r = vec_ref("a", &[1]);
        let id = Callable::from_sync("id", |args| Ok(vec![args["input_1"].clone()]));
        assert!(matches!(
            r.cross_action(&id, "a").await,
            Err(ReferenceError::DuplicateAxis { .. })
        ));
    }

    #[test]
    fn test_select_slices_axis() {
        let data = json!([["4", "5", "6"], ["7", "8", "9"]]);
        let r = Reference::from_nested_json(&data, &["number".into(), "digit".into()]).unwrap();

        let slice = r.select("digit", 2).unwrap();
        assert_eq!(slice.axis_names(), vec!["number"]);
        assert_eq!(slice.get(&[("number", 0)]).unwrap().as_str(), Some("6"));
        assert_eq!(slice.get(&[("number", 1)]).unwrap().as_str(), Some("9"));

        assert!(matches!(
            r.select("digit", 7),
            Err(ReferenceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_derelation() {
        let data = json!([{"name": "alpha", "score": 1}, {"name": "beta", "score": 2}]);
        let r = Reference::from_nested_json(&data, &["entry".into()]).unwrap();

        let out = r.derelation(Some("entry"), 1, "name").unwrap();
        assert!(out.axes().is_empty());
        assert_eq!(out.sole().unwrap().as_str(), Some("beta"));
    }

    #[test]
    fn test_derelation_errors() {
        let data = json!([{"k": 1}]);
        let r = Reference::from_nested_json(&data, &["entry".into()]).unwrap();

        assert!(matches!(
            r.derelation(Some("entry"), 5, "k"),
            Err(ReferenceError::OutOfRange { .. })
        ));
        assert!(matches!(
            r.derelation(Some("entry"), 0, "missing"),
            Err(ReferenceError::KeyMissing { .. })
        ));

        let plain = vec_ref("a", &[1]);
        assert!(matches!(
            plain.derelation(Some("a"), 0, "k"),
            Err(ReferenceError::NotADict { .. })
        ));
    }

    #[test]
    fn test_canonical_roundtrip() {
        let data = json!([["4", "5"], ["%{truth_value}(true)", {"k": "v"}]]);
        let r = Reference::from_nested_json(&data, &["row".into(), "col".into()]).unwrap();

        let canonical = r.to_canonical().unwrap();
        let back = Reference::from_canonical(&canonical).unwrap();
        assert_eq!(r, back);
        // Canonical encoding itself is stable
        assert_eq!(canonical, back.to_canonical().unwrap());
    }

    #[test]
    fn test_nested_reference_roundtrip() {
        let inner = Reference::singleton(CellValue::string("deep"));
        let mut outer = Reference::with_axes(&["rel"]).unwrap();
        outer
            .append_cell("rel", 0, CellValue::Reference(Box::new(inner)))
            .unwrap();

        let canonical = outer.to_canonical().unwrap();
        let back = Reference::from_canonical(&canonical).unwrap();
        assert_eq!(outer, back);
    }

    #[test]
    fn test_to_nested_json() {
        let data = json!([[1, 2], [3, 4]]);
        let r = Reference::from_nested_json(&data, &["a".into(), "b".into()]).unwrap();
        assert_eq!(r.to_nested_json().unwrap(), data);
    }

    #[test]
    fn test_rename_axis() {
        let mut r = vec_ref("a", &[1]);
        r.rename_axis("a", "b").unwrap();
        assert!(r.has_axis("b"));
        assert!(!r.has_axis("a"));
    }
}
