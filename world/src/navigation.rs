//! Bounded grid pathfinding used by movement flows.

use std::collections::VecDeque;

use skirmish_core::CellCoord;

use crate::terrain::{neighbors, Terrain};

/// Computes walkable routes across the terrain.
///
/// Implementations must return the cells to visit *after* `start`, in order,
/// and never more than `max_length` of them. When the destination cannot be
/// reached the result may be a prefix heading toward it, or empty when no
/// progress is possible.
pub trait Pathfinder: Send + Sync {
    /// Computes a bounded path prefix from `start` toward `destination`.
    fn path(
        &self,
        terrain: &Terrain,
        start: CellCoord,
        destination: CellCoord,
        max_length: usize,
    ) -> Vec<CellCoord>;
}

/// Breadth-first pathfinder over the terrain's cardinal neighbours.
///
/// When the destination is unreachable the path leads to the reachable cell
/// closest to it by Manhattan distance, ties resolved by travel distance and
/// then by cell order so results stay deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct GridPathfinder;

impl Pathfinder for GridPathfinder {
    fn path(
        &self,
        terrain: &Terrain,
        start: CellCoord,
        destination: CellCoord,
        max_length: usize,
    ) -> Vec<CellCoord> {
        if max_length == 0 || start == destination || !terrain.contains(start) {
            return Vec::new();
        }

        let field = DistanceField::flood(terrain, start);
        let Some(goal) = field.closest_reachable(destination) else {
            return Vec::new();
        };
        if goal == start {
            return Vec::new();
        }

        let mut route = field.trace_back(goal);
        route.truncate(max_length);
        route
    }
}

/// Breadth-first step counts from a single origin over walkable cells.
///
/// Unreached cells hold `u16::MAX`.
#[derive(Clone, Debug)]
struct DistanceField {
    width: u32,
    height: u32,
    origin: CellCoord,
    distances: Vec<u16>,
}

impl DistanceField {
    fn flood(terrain: &Terrain, origin: CellCoord) -> Self {
        let (width, height) = terrain.dimensions();
        let stride = usize::try_from(width).unwrap_or(0);
        let cells = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(0);
        let mut field = Self {
            width,
            height,
            origin,
            distances: vec![u16::MAX; cells],
        };
        let Some(slot) = index(stride, origin).filter(|slot| *slot < cells) else {
            return field;
        };
        field.distances[slot] = 0;

        let mut frontier = VecDeque::from([origin]);
        while let Some(cell) = frontier.pop_front() {
            let Some(here) = index(stride, cell).map(|slot| field.distances[slot]) else {
                continue;
            };
            let step = here.saturating_add(1);
            if step == u16::MAX {
                continue;
            }
            for neighbor in neighbors(cell, width, height) {
                if terrain.is_blocked(neighbor) {
                    continue;
                }
                match index(stride, neighbor) {
                    Some(slot) if field.distances[slot] > step => {
                        field.distances[slot] = step;
                        frontier.push_back(neighbor);
                    }
                    _ => {}
                }
            }
        }
        field
    }

    fn distance(&self, cell: CellCoord) -> Option<u16> {
        if cell.column() >= self.width || cell.row() >= self.height {
            return None;
        }

        let width = usize::try_from(self.width).ok()?;
        index(width, cell)
            .and_then(|offset| self.distances.get(offset).copied())
            .filter(|distance| *distance != u16::MAX)
    }

    fn closest_reachable(&self, destination: CellCoord) -> Option<CellCoord> {
        if self.distance(destination).is_some() {
            return Some(destination);
        }

        let mut best: Option<(u32, u16, CellCoord)> = None;
        for row in 0..self.height {
            for column in 0..self.width {
                let cell = CellCoord::new(column, row);
                let Some(distance) = self.distance(cell) else {
                    continue;
                };
                let rank = (cell.manhattan_distance(destination), distance, cell);
                if best.map_or(true, |current| rank < current) {
                    best = Some(rank);
                }
            }
        }
        best.map(|(_, _, cell)| cell)
    }

    fn trace_back(&self, goal: CellCoord) -> Vec<CellCoord> {
        let mut route = Vec::new();
        let Some(mut current_distance) = self.distance(goal) else {
            return route;
        };
        let mut current = goal;

        while current_distance > 0 {
            route.push(current);
            let previous = neighbors(current, self.width, self.height)
                .find(|neighbor| self.distance(*neighbor) == Some(current_distance - 1));
            let Some(previous) = previous else {
                route.clear();
                return route;
            };
            current = previous;
            current_distance -= 1;
        }

        debug_assert_eq!(current, self.origin, "trace must end at the origin");
        route.reverse();
        route
    }
}

fn index(width: usize, cell: CellCoord) -> Option<usize> {
    let column = usize::try_from(cell.column()).ok()?;
    let row = usize::try_from(cell.row()).ok()?;
    row.checked_mul(width)?.checked_add(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_counts_steps_from_origin() {
        let field = DistanceField::flood(&Terrain::open(3, 4), CellCoord::new(1, 2));

        assert_eq!(field.distance(CellCoord::new(1, 2)), Some(0));
        assert_eq!(field.distance(CellCoord::new(1, 1)), Some(1));
        assert_eq!(field.distance(CellCoord::new(0, 0)), Some(3));
    }

    #[test]
    fn flood_goes_around_blocked_cells() {
        let wall = CellCoord::new(1, 1);
        let field = DistanceField::flood(&Terrain::open(3, 4).with_blocked([wall]), CellCoord::new(1, 2));

        assert_eq!(field.distance(wall), None);
        assert_eq!(field.distance(CellCoord::new(1, 0)), Some(4));
        assert_eq!(field.distance(CellCoord::new(0, 1)), Some(2));
    }

    #[test]
    fn path_reaches_destination_on_open_terrain() {
        let terrain = Terrain::open(5, 5);
        let path = GridPathfinder.path(&terrain, CellCoord::new(0, 0), CellCoord::new(2, 3), 32);

        assert_eq!(path.len(), 5);
        assert_eq!(path.last(), Some(&CellCoord::new(2, 3)));
        let mut previous = CellCoord::new(0, 0);
        for cell in &path {
            assert_eq!(previous.manhattan_distance(*cell), 1);
            previous = *cell;
        }
    }

    #[test]
    fn path_is_truncated_to_budget() {
        let terrain = Terrain::open(20, 1);
        let path = GridPathfinder.path(&terrain, CellCoord::new(0, 0), CellCoord::new(19, 0), 4);

        assert_eq!(
            path,
            vec![
                CellCoord::new(1, 0),
                CellCoord::new(2, 0),
                CellCoord::new(3, 0),
                CellCoord::new(4, 0),
            ]
        );
    }

    #[test]
    fn path_detours_around_walls() {
        let terrain = Terrain::open(3, 3).with_blocked([CellCoord::new(1, 0), CellCoord::new(1, 1)]);
        let path = GridPathfinder.path(&terrain, CellCoord::new(0, 0), CellCoord::new(2, 0), 16);

        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|cell| !terrain.is_blocked(*cell)));
        assert_eq!(path.last(), Some(&CellCoord::new(2, 0)));
    }

    #[test]
    fn unreachable_destination_heads_for_closest_cell() {
        let terrain = Terrain::open(5, 1).with_blocked([CellCoord::new(3, 0)]);
        let path = GridPathfinder.path(&terrain, CellCoord::new(0, 0), CellCoord::new(4, 0), 16);

        assert_eq!(path, vec![CellCoord::new(1, 0), CellCoord::new(2, 0)]);
    }

    #[test]
    fn walled_in_start_makes_no_progress() {
        let terrain = Terrain::open(3, 1).with_blocked([CellCoord::new(1, 0)]);
        let path = GridPathfinder.path(&terrain, CellCoord::new(0, 0), CellCoord::new(2, 0), 16);

        assert!(path.is_empty());
    }
}
