//! Reference model error types

use thiserror::Error;

/// Errors raised by reference algebra and serialization
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Axis {axis} already exists")]
    DuplicateAxis { axis: String },

    #[error("Axis {axis} not found")]
    AxisMissing { axis: String },

    #[error("Coordinate {index} out of range for axis {axis} (size {size})")]
    OutOfRange { axis: String, index: usize, size: usize },

    #[error("Shape mismatch on axis {axis}: {left} vs {right}")]
    ShapeMismatch { axis: String, left: usize, right: usize },

    #[error("Cannot collapse axis {axis} of size {size}")]
    CollapseNonSingleton { axis: String, size: usize },

    #[error("No cell at coordinate {coord}")]
    CellMissing { coord: String },

    #[error("Cell at {coord} is not a dict (cannot select key {key})")]
    NotADict { coord: String, key: String },

    #[error("Key {key} not present in dict cell at {coord}")]
    KeyMissing { coord: String, key: String },

    #[error("Callable cells cannot be serialized")]
    NotSerializable,

    #[error("Malformed perceptual sign: {0}")]
    BadSign(String),

    #[error("Malformed canonical reference: {0}")]
    BadCanonical(String),
}
