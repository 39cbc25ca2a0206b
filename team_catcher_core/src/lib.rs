pub mod agent;
pub mod map;
pub mod world;

/// Unique identifier for agents. Agents are numbered from 1.
pub type EntityId = usize;

/// A cell coordinate, `row` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Shifts the position by a signed delta. Returns `None` if either axis would go below zero.
    pub fn offset(self, dr: isize, dc: isize) -> Option<Position> {
        Some(Position {
            row: self.row.checked_add_signed(dr)?,
            col: self.col.checked_add_signed(dc)?,
        })
    }

    /// Returns manhattan distance between two positions
    pub fn manhattan_distance(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}
