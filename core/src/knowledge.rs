use alloc::vec::Vec;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::*;

/// Partially-known board, owned by the driver and handed to every inference
/// call. Cells transition `Unknown -> Revealed/Flagged` over a game; the
/// engine itself never mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    cells: Array2<Cell>,
}

impl Knowledge {
    /// Fully-unknown board of the given dimensions.
    pub fn new(rows: Coord, cols: Coord) -> Self {
        Self {
            cells: Array2::default((rows as usize, cols as usize)),
        }
    }

    pub fn from_cells(cells: Array2<Cell>) -> Result<Self> {
        let knowledge = Self { cells };
        knowledge.validate()?;
        Ok(knowledge)
    }

    /// Builds a board from a row-major cell sequence, the layout drivers
    /// usually keep.
    pub fn from_row_major(rows: Coord, cols: Coord, cells: Vec<Cell>) -> Result<Self> {
        let cells = Array2::from_shape_vec((rows as usize, cols as usize), cells)
            .map_err(|_| InferenceError::ShapeMismatch { rows, cols })?;
        Self::from_cells(cells)
    }

    pub fn size(&self) -> Coord2 {
        let dim = self.cells.dim();
        (dim.0.try_into().unwrap(), dim.1.try_into().unwrap())
    }

    pub fn rows(&self) -> Coord {
        self.size().0
    }

    pub fn cols(&self) -> Coord {
        self.size().1
    }

    pub fn total_cells(&self) -> CellCount {
        let (rows, cols) = self.size();
        mult(rows, cols)
    }

    pub fn cell_at(&self, position: Coord2) -> Cell {
        self.cells[position.to_nd_index()]
    }

    pub fn set(&mut self, position: Coord2, cell: Cell) -> Result<()> {
        let position = self.validate_position(position)?;
        if let Cell::Revealed(value) = cell
            && value > 8
        {
            return Err(InferenceError::InvalidCellValue { position, value });
        }
        self.cells[position.to_nd_index()] = cell;
        Ok(())
    }

    pub fn validate_position(&self, position: Coord2) -> Result<Coord2> {
        let (rows, cols) = self.size();
        if position.0 < rows && position.1 < cols {
            Ok(position)
        } else {
            Err(InferenceError::OutOfBounds { position })
        }
    }

    /// Checks every revealed value against the 0..=8 range.
    pub fn validate(&self) -> Result<()> {
        for (index, cell) in self.cells.indexed_iter() {
            if let Cell::Revealed(value) = cell
                && *value > 8
            {
                return Err(InferenceError::InvalidCellValue {
                    position: (index.0 as Coord, index.1 as Coord),
                    value: *value,
                });
            }
        }
        Ok(())
    }

    pub fn iter_neighbors(&self, position: Coord2) -> impl Iterator<Item = Coord2> + use<> {
        neighbors(position, self.size())
    }

    /// All positions in row-major order.
    pub fn iter_positions(&self) -> impl Iterator<Item = Coord2> + use<> {
        let (rows, cols) = self.size();
        (0..rows).flat_map(move |row| (0..cols).map(move |col| (row, col)))
    }
}

/// Test-grid shorthand: one `&str` per row, `?` unknown, `F` flagged,
/// digits revealed.
#[cfg(test)]
pub(crate) fn parse_grid(rows: &[&str]) -> Knowledge {
    let mut cells = Vec::new();
    for row in rows {
        for ch in row.chars() {
            cells.push(match ch {
                '?' => Cell::Unknown,
                'F' => Cell::Flagged,
                digit => Cell::Revealed(digit.to_digit(10).unwrap() as u8),
            });
        }
    }
    Knowledge::from_row_major(rows.len() as Coord, rows[0].len() as Coord, cells).unwrap()
}
