//! Dense spatial index answering overlap queries for a single tick.

use skirmish_core::{CellCoord, EntityId};

use crate::terrain::{neighbors, Terrain};

/// Snapshot of which entities stand on which cells at a given tick.
///
/// Entities may share a cell while passing through each other; each cell
/// therefore stores every occupant in ascending id order.
#[derive(Clone, Debug)]
pub struct OccupancyIndex {
    columns: u32,
    rows: u32,
    cells: Vec<Vec<EntityId>>,
}

impl OccupancyIndex {
    pub(crate) fn new(columns: u32, rows: u32) -> Self {
        let capacity_u64 = u64::from(columns) * u64::from(rows);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            rows,
            cells: vec![Vec::new(); capacity],
        }
    }

    pub(crate) fn occupy(&mut self, entity: EntityId, cell: CellCoord) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.cells.get_mut(index) {
                if let Err(position) = slot.binary_search(&entity) {
                    slot.insert(position, entity);
                }
            }
        }
    }

    /// Entities standing on the provided cell.
    #[must_use]
    pub fn occupants(&self, cell: CellCoord) -> &[EntityId] {
        self.index(cell)
            .and_then(|index| self.cells.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reports whether no entity stands on the cell.
    #[must_use]
    pub fn is_free(&self, cell: CellCoord) -> bool {
        self.occupants(cell).is_empty()
    }

    /// Entities within `radius` cells (Chebyshev distance) of `center`, in
    /// ascending id order.
    #[must_use]
    pub fn overlapping(&self, center: CellCoord, radius: u32) -> Vec<EntityId> {
        let min_column = center.column().saturating_sub(radius);
        let min_row = center.row().saturating_sub(radius);
        let max_column = center
            .column()
            .saturating_add(radius)
            .min(self.columns.saturating_sub(1));
        let max_row = center
            .row()
            .saturating_add(radius)
            .min(self.rows.saturating_sub(1));

        let mut found = Vec::new();
        if self.columns == 0 || self.rows == 0 {
            return found;
        }
        for row in min_row..=max_row {
            for column in min_column..=max_column {
                found.extend_from_slice(self.occupants(CellCoord::new(column, row)));
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// First walkable, unoccupied cardinal neighbour of `cell`.
    #[must_use]
    pub fn free_neighbor(&self, terrain: &Terrain, cell: CellCoord) -> Option<CellCoord> {
        neighbors(cell, self.columns, self.rows)
            .find(|candidate| !terrain.is_blocked(*candidate) && self.is_free(*candidate))
    }

    /// Provides the dimensions of the underlying grid.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.columns && cell.row() < self.rows {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}
