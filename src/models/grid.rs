//! Grid of placement slots shared by all matched windows.
//!
//! Cells are kept in priority order: the cell at index `i` always carries
//! `rank == i`, so ranks form a dense `0..N` permutation after every edit.

use super::geometry::Point;
use serde::{Deserialize, Serialize};

/// One placement slot. Lower rank is filled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub rank: usize,
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// How windows keep or lose their cell between passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPolicy {
    /// Recompute every assignment from scratch in enumeration order
    #[default]
    Recompute,
    /// Keep a window in the cell it held last pass while it remains eligible
    Sticky,
}

impl std::str::FromStr for AssignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recompute" => Ok(AssignmentPolicy::Recompute),
            "sticky" => Ok(AssignmentPolicy::Sticky),
            _ => Err(format!("Invalid assignment policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub assignment: AssignmentPolicy,
    #[serde(default)]
    cells: Vec<GridCell>,
}

impl GridConfig {
    pub fn new(enabled: bool, anchors: impl IntoIterator<Item = Point>) -> Self {
        let mut grid = Self {
            enabled,
            ..Default::default()
        };
        for anchor in anchors {
            grid.add_cell(anchor);
        }
        grid
    }

    /// Cells ordered by ascending rank
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, rank: usize) -> Option<&GridCell> {
        self.cells.get(rank)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Append a cell with the lowest priority and return its rank
    pub fn add_cell(&mut self, anchor: Point) -> usize {
        let rank = self.cells.len();
        self.cells.push(GridCell {
            rank,
            x: anchor.x,
            y: anchor.y,
        });
        rank
    }

    pub fn update_cell(&mut self, rank: usize, anchor: Point) -> Result<(), GridError> {
        let cell = self
            .cells
            .get_mut(rank)
            .ok_or(GridError::UnknownCell(rank))?;
        cell.x = anchor.x;
        cell.y = anchor.y;
        Ok(())
    }

    pub fn remove_cell(&mut self, rank: usize) -> Result<GridCell, GridError> {
        if rank >= self.cells.len() {
            return Err(GridError::UnknownCell(rank));
        }
        let removed = self.cells.remove(rank);
        self.renumber();
        Ok(removed)
    }

    /// Swap with the next-higher-priority cell. Returns false at rank 0.
    pub fn move_cell_up(&mut self, rank: usize) -> Result<bool, GridError> {
        if rank >= self.cells.len() {
            return Err(GridError::UnknownCell(rank));
        }
        if rank == 0 {
            return Ok(false);
        }
        self.swap(rank, rank - 1);
        Ok(true)
    }

    /// Swap with the next-lower-priority cell. Returns false at the last rank.
    pub fn move_cell_down(&mut self, rank: usize) -> Result<bool, GridError> {
        if rank >= self.cells.len() {
            return Err(GridError::UnknownCell(rank));
        }
        if rank + 1 == self.cells.len() {
            return Ok(false);
        }
        self.swap(rank, rank + 1);
        Ok(true)
    }

    /// Sort by stored rank and renumber densely. Used after deserialization,
    /// where ranks may be sparse or unordered.
    pub fn normalize(&mut self) {
        self.cells.sort_by_key(|cell| cell.rank);
        self.renumber();
    }

    pub fn validate(&self) -> Result<(), GridError> {
        for (index, cell) in self.cells.iter().enumerate() {
            if cell.rank != index {
                return Err(GridError::NonContiguousRanks {
                    expected: index,
                    found: cell.rank,
                });
            }
        }
        Ok(())
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.cells.swap(a, b);
        self.cells[a].rank = a;
        self.cells[b].rank = b;
    }

    fn renumber(&mut self) {
        for (index, cell) in self.cells.iter_mut().enumerate() {
            cell.rank = index;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Grid cell with rank {0} does not exist")]
    UnknownCell(usize),

    #[error("Grid cell ranks must be contiguous: expected rank {expected}, found {found}")]
    NonContiguousRanks { expected: usize, found: usize },
}
