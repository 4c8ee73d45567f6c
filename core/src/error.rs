use thiserror::Error;

use crate::types::{Coord, Coord2};

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("revealed value {value} at {position:?} is outside 0..=8")]
    InvalidCellValue { position: Coord2, value: u8 },
    #[error("position {position:?} is outside the grid")]
    OutOfBounds { position: Coord2 },
    #[error("cell data does not match the declared {rows}x{cols} size")]
    ShapeMismatch { rows: Coord, cols: Coord },
    #[error("observations admit no satisfying assignment")]
    ImpossibleObservation,
    #[error("exact enumeration hit the solution cap")]
    EnumerationTruncated,
}

pub type Result<T> = core::result::Result<T, InferenceError>;
