/// Single coordinate axis used for board rows, columns, and positions.
pub type Coord = u32;

/// Count type used for mine counts and total-cell counts.
pub type CellCount = u32;

/// Two-dimensional position `(row, col)`. Tuple ordering doubles as
/// row-major position order, which every deterministic tie-break relies on.
pub type Coord2 = (Coord, Coord);

pub trait ToNdIndex {
    type Output;
    fn to_nd_index(self) -> Self::Output;
}

impl ToNdIndex for Coord2 {
    type Output = [usize; 2];

    fn to_nd_index(self) -> Self::Output {
        [self.0 as usize, self.1 as usize]
    }
}

pub const fn mult(a: Coord, b: Coord) -> CellCount {
    (a as CellCount).saturating_mul(b as CellCount)
}

const DISPLACEMENTS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// In-bounds 8-neighborhood of `center` on a `bounds`-sized grid, yielded in
/// row-major order. Off-grid displacements drop out of the chain.
pub fn neighbors(center: Coord2, bounds: Coord2) -> impl Iterator<Item = Coord2> {
    let (rows, cols) = bounds;
    DISPLACEMENTS.iter().filter_map(move |&(dr, dc)| {
        let row = center.0.checked_add_signed(dr)?;
        let col = center.1.checked_add_signed(dc)?;
        (row < rows && col < cols).then_some((row, col))
    })
}
