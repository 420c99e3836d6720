//! Reference model: named-axis tensors of typed cell values
//!
//! Concepts carry their data as a [`Reference`]: an ordered list of named
//! axes plus a sparse store of [`CellValue`] cells. The algebra (pointwise
//! and cross application, derelation, collapse, append) is what sequences
//! use to move data around; canonical serialization is what checkpoints use.

mod cell;
mod error;
mod sign;
mod tensor;

pub use cell::{Callable, CallableArgs, CellValue};
pub use error::ReferenceError;
pub use sign::{PerceptualSign, SignNorm};
pub use tensor::{Axis, Coord, Reference};
