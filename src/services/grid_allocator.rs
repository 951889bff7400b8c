//! Pairs eligible windows with grid cells.
//!
//! The allocator is pure: it sees the windows in their stable enumeration
//! order plus the cells by ascending rank and returns one assignment per
//! window. Windows beyond the number of cells get no cell.

use crate::models::{AssignmentPolicy, GridCell};
use crate::platform::WindowHandle;
use tracing::trace;

/// A window competing for a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationCandidate {
    pub handle: WindowHandle,
    /// Cell held at the end of the previous pass, if any
    pub previous_cell: Option<GridCell>,
}

impl AllocationCandidate {
    pub fn new(handle: WindowHandle, previous_cell: Option<GridCell>) -> Self {
        Self {
            handle,
            previous_cell,
        }
    }
}

/// Allocation result for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAssignment {
    pub handle: WindowHandle,
    /// Assigned cell; `None` for surplus windows
    pub cell: Option<GridCell>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GridAllocator {
    policy: AssignmentPolicy,
}

impl GridAllocator {
    pub fn new(policy: AssignmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AssignmentPolicy {
        self.policy
    }

    /// Compute a one-to-one partial assignment, parallel to `candidates`
    pub fn allocate(
        &self,
        candidates: &[AllocationCandidate],
        cells: &[GridCell],
    ) -> Vec<CellAssignment> {
        let slots = match self.policy {
            AssignmentPolicy::Recompute => recompute(candidates.len(), cells.len()),
            AssignmentPolicy::Sticky => sticky(candidates, cells),
        };

        let assignments: Vec<CellAssignment> = candidates
            .iter()
            .zip(slots)
            .map(|(candidate, slot)| CellAssignment {
                handle: candidate.handle,
                cell: slot.and_then(|index| cells.get(index)).copied(),
            })
            .collect();

        trace!(
            policy = ?self.policy,
            windows = candidates.len(),
            cells = cells.len(),
            assigned = assignments.iter().filter(|a| a.cell.is_some()).count(),
            "Grid allocation computed"
        );

        assignments
    }
}

fn recompute(windows: usize, cells: usize) -> Vec<Option<usize>> {
    (0..windows)
        .map(|index| (index < cells).then_some(index))
        .collect()
}

/// Index of the cell in `cells` that is still the one `held` refers to.
///
/// Ranks shift when cells are removed or reordered, so a held cell is
/// identified by its anchor; the rank only breaks ties between equal anchors.
fn surviving_cell(cells: &[GridCell], held: &GridCell) -> Option<usize> {
    match cells.get(held.rank) {
        Some(cell) if cell.anchor() == held.anchor() => Some(held.rank),
        _ => cells.iter().position(|cell| cell.anchor() == held.anchor()),
    }
}

fn sticky(candidates: &[AllocationCandidate], cells: &[GridCell]) -> Vec<Option<usize>> {
    let mut taken = vec![false; cells.len()];
    let mut slots: Vec<Option<usize>> = vec![None; candidates.len()];

    // Keep cells held last pass, first claimant wins
    for (slot, candidate) in slots.iter_mut().zip(candidates) {
        let Some(index) = candidate
            .previous_cell
            .and_then(|held| surviving_cell(cells, &held))
        else {
            continue;
        };
        if !taken[index] {
            taken[index] = true;
            *slot = Some(index);
        }
    }

    let mut free = (0..cells.len()).filter(|&index| !taken[index]);
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        match free.next() {
            Some(index) => *slot = Some(index),
            None => break,
        }
    }

    slots
}
