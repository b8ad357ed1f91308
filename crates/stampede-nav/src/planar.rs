//! A rectangular walkable surface divided into a regular grid of cells.
//!
//! Each cell is one convex polygon; the outer rectangle border and any cell
//! whose flags fail the active filter are non-traversable. This backend is
//! deliberately minimal — it exists so the crowd simulation has a concrete
//! surface to run on in tests and benchmarks, not as a navmesh pipeline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::Vec2;
use stampede_common::{Error, Result};

use super::{NavPath, NavQuery, PolyRef, QueryFilter, POLY_FLAG_WALK};

/// Search budget for pathfinding before returning a partial result.
const MAX_PATH_NODES: usize = 4096;

/// Maximum polygons visited by one `move_along_surface` call.
const MAX_VISITED: usize = 16;

/// Inset applied when clamping positions against the surface border.
const BORDER_EPS: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Cell {
    x: i32,
    z: i32,
}

/// Min-heap entry for the A* open list; stale entries are skipped on pop.
#[derive(Debug)]
struct OpenNode {
    f: f32,
    g: f32,
    idx: usize,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.idx == other.idx
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the lowest f first.
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Flat grid surface at y = 0.
#[derive(Debug, Clone)]
pub struct PlanarSurface {
    width: i32,
    depth: i32,
    cell_size: f32,
    flags: Vec<u16>,
}

impl PlanarSurface {
    /// Creates a `width` x `depth` cell surface with every cell walkable.
    pub fn new(width: u32, depth: u32, cell_size: f32) -> Self {
        assert!(width > 0 && depth > 0, "surface must be non-empty");
        assert!(cell_size > 0.0, "cell_size must be > 0");
        let width = width as i32;
        let depth = depth as i32;
        Self {
            width,
            depth,
            cell_size,
            flags: vec![POLY_FLAG_WALK; (width * depth) as usize],
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Overrides the flags of one cell. Zero makes the cell a hole.
    pub fn set_cell_flags(&mut self, x: i32, z: i32, flags: u16) {
        if let Some(idx) = self.idx(Cell { x, z }) {
            self.flags[idx] = flags;
        }
    }

    /// Reference of the cell containing the position, if walkable.
    pub fn cell_ref_at(&self, pos: &[f32; 3]) -> PolyRef {
        match self.cell_at(Vec2::new(pos[0], pos[2])) {
            Some(cell) => self.ref_of(cell),
            None => PolyRef::NONE,
        }
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.z >= 0 && cell.x < self.width && cell.z < self.depth
    }

    fn idx(&self, cell: Cell) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some((cell.z * self.width + cell.x) as usize)
    }

    fn ref_of(&self, cell: Cell) -> PolyRef {
        match self.idx(cell) {
            Some(idx) => PolyRef::new(idx as u64 + 1),
            None => PolyRef::NONE,
        }
    }

    fn cell_of(&self, reference: PolyRef) -> Option<Cell> {
        if !reference.is_valid() {
            return None;
        }
        let idx = (reference.id() - 1) as i32;
        if idx >= self.width * self.depth {
            return None;
        }
        Some(Cell {
            x: idx % self.width,
            z: idx / self.width,
        })
    }

    fn cell_at(&self, p: Vec2) -> Option<Cell> {
        let cell = Cell {
            x: (p.x / self.cell_size).floor() as i32,
            z: (p.y / self.cell_size).floor() as i32,
        };
        if self.in_bounds(cell) {
            Some(cell)
        } else {
            None
        }
    }

    fn cell_min(&self, cell: Cell) -> Vec2 {
        Vec2::new(cell.x as f32 * self.cell_size, cell.z as f32 * self.cell_size)
    }

    fn cell_center(&self, cell: Cell) -> Vec2 {
        self.cell_min(cell) + Vec2::splat(self.cell_size * 0.5)
    }

    fn passable(&self, cell: Cell, filter: &QueryFilter) -> bool {
        self.idx(cell)
            .map(|idx| filter.passes(self.flags[idx]))
            .unwrap_or(false)
    }

    /// Closest point to `p` inside the cell rectangle.
    fn closest_point_in_cell(&self, cell: Cell, p: Vec2) -> Vec2 {
        let min = self.cell_min(cell);
        let max = min + Vec2::splat(self.cell_size);
        Vec2::new(
            p.x.clamp(min.x + BORDER_EPS, max.x - BORDER_EPS),
            p.y.clamp(min.y + BORDER_EPS, max.y - BORDER_EPS),
        )
    }

    fn heuristic(&self, a: Cell, b: Cell) -> f32 {
        ((a.x - b.x).abs() + (a.z - b.z).abs()) as f32
    }

    // Fixed neighbor order keeps search results deterministic.
    fn neighbors(cell: Cell) -> [Cell; 4] {
        [
            Cell { x: cell.x, z: cell.z - 1 },
            Cell { x: cell.x + 1, z: cell.z },
            Cell { x: cell.x, z: cell.z + 1 },
            Cell { x: cell.x - 1, z: cell.z },
        ]
    }
}

impl NavQuery for PlanarSurface {
    fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<(PolyRef, [f32; 3])> {
        if center[1].abs() > half_extents[1] {
            return Err(Error::OutsideSurface);
        }

        let p = Vec2::new(center[0], center[2]);
        let lo = Vec2::new(center[0] - half_extents[0], center[2] - half_extents[2]);
        let hi = Vec2::new(center[0] + half_extents[0], center[2] + half_extents[2]);

        // Visit every cell overlapping the search box and keep the closest
        // point found on a passable one, the same scan-then-rank structure a
        // polygon-soup query uses.
        let min_cell_x = (lo.x / self.cell_size).floor() as i32;
        let min_cell_z = (lo.y / self.cell_size).floor() as i32;
        let max_cell_x = (hi.x / self.cell_size).floor() as i32;
        let max_cell_z = (hi.y / self.cell_size).floor() as i32;

        let mut nearest = PolyRef::NONE;
        let mut nearest_pt = Vec2::ZERO;
        let mut nearest_d = f32::MAX;

        for z in min_cell_z..=max_cell_z {
            for x in min_cell_x..=max_cell_x {
                let cell = Cell { x, z };
                if !self.passable(cell, filter) {
                    continue;
                }
                let closest = self.closest_point_in_cell(cell, p);
                let d = closest.distance_squared(p);
                if d < nearest_d {
                    nearest = self.ref_of(cell);
                    nearest_pt = closest;
                    nearest_d = d;
                }
            }
        }

        if !nearest.is_valid() {
            return Err(Error::OutsideSurface);
        }
        Ok((nearest, [nearest_pt.x, 0.0, nearest_pt.y]))
    }

    fn find_path(
        &mut self,
        start: PolyRef,
        end: PolyRef,
        _start_pos: &[f32; 3],
        _end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<NavPath> {
        let (start_cell, end_cell) = match (self.cell_of(start), self.cell_of(end)) {
            (Some(s), Some(e)) => (s, e),
            _ => return Err(Error::InvalidRef),
        };
        if !self.passable(start_cell, filter) || !self.passable(end_cell, filter) {
            return Err(Error::InvalidRef);
        }
        if start == end {
            return Ok(NavPath {
                polys: vec![start],
                partial: false,
            });
        }

        let len = (self.width * self.depth) as usize;
        let mut g_score = vec![f32::MAX; len];
        let mut came_from: Vec<Option<usize>> = vec![None; len];
        let mut open = BinaryHeap::new();

        let start_idx = self.idx(start_cell).ok_or(Error::InvalidRef)?;
        let end_idx = self.idx(end_cell).ok_or(Error::InvalidRef)?;

        g_score[start_idx] = 0.0;
        open.push(OpenNode {
            f: self.heuristic(start_cell, end_cell),
            g: 0.0,
            idx: start_idx,
        });

        let mut expanded = 0usize;
        let mut best_idx = start_idx;
        let mut best_h = self.heuristic(start_cell, end_cell);
        let mut reached = false;

        while let Some(node) = open.pop() {
            if node.g > g_score[node.idx] {
                continue;
            }
            if node.idx == end_idx {
                reached = true;
                best_idx = end_idx;
                break;
            }
            expanded += 1;
            if expanded >= MAX_PATH_NODES {
                break;
            }

            let cell = Cell {
                x: node.idx as i32 % self.width,
                z: node.idx as i32 / self.width,
            };
            for next in Self::neighbors(cell) {
                if !self.passable(next, filter) {
                    continue;
                }
                let Some(next_idx) = self.idx(next) else {
                    continue;
                };
                let g = node.g + 1.0;
                if g >= g_score[next_idx] {
                    continue;
                }
                g_score[next_idx] = g;
                came_from[next_idx] = Some(node.idx);
                let h = self.heuristic(next, end_cell);
                if h < best_h {
                    best_h = h;
                    best_idx = next_idx;
                }
                open.push(OpenNode {
                    f: g + h,
                    g,
                    idx: next_idx,
                });
            }
        }

        if !reached && best_idx == start_idx {
            return Err(Error::PathNotFound);
        }

        let mut polys = Vec::new();
        let mut cur = best_idx;
        loop {
            polys.push(PolyRef::new(cur as u64 + 1));
            match came_from[cur] {
                Some(prev) => cur = prev,
                None => break,
            }
        }
        polys.reverse();

        Ok(NavPath {
            polys,
            partial: !reached,
        })
    }

    fn move_along_surface(
        &self,
        start: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        visited: &mut Vec<PolyRef>,
    ) -> Result<[f32; 3]> {
        let mut cell = self.cell_of(start).ok_or(Error::InvalidRef)?;
        if !self.passable(cell, filter) {
            return Err(Error::InvalidRef);
        }

        visited.clear();
        visited.push(start);

        let mut p = self.closest_point_in_cell(cell, Vec2::new(start_pos[0], start_pos[2]));
        let q = Vec2::new(end_pos[0], end_pos[2]);

        for _ in 0..MAX_VISITED {
            let min = self.cell_min(cell);
            let max = min + Vec2::splat(self.cell_size);
            if q.x >= min.x && q.x <= max.x && q.y >= min.y && q.y <= max.y {
                return Ok([q.x, 0.0, q.y]);
            }

            let dir = q - p;

            // First boundary the segment crosses, per axis slab.
            let tx = if dir.x > f32::EPSILON {
                (max.x - p.x) / dir.x
            } else if dir.x < -f32::EPSILON {
                (min.x - p.x) / dir.x
            } else {
                f32::MAX
            };
            let tz = if dir.y > f32::EPSILON {
                (max.y - p.y) / dir.y
            } else if dir.y < -f32::EPSILON {
                (min.y - p.y) / dir.y
            } else {
                f32::MAX
            };

            if tx == f32::MAX && tz == f32::MAX {
                return Ok([p.x, 0.0, p.y]);
            }

            let t = tx.min(tz).max(0.0);
            if t >= 1.0 {
                // Target lies outside this cell but the segment ends before
                // the boundary; clamp into the cell.
                let clamped = self.closest_point_in_cell(cell, q);
                return Ok([clamped.x, 0.0, clamped.y]);
            }

            let crossing = p + dir * t;
            let next = if tx < tz {
                Cell {
                    x: cell.x + if dir.x > 0.0 { 1 } else { -1 },
                    z: cell.z,
                }
            } else {
                Cell {
                    x: cell.x,
                    z: cell.z + if dir.y > 0.0 { 1 } else { -1 },
                }
            };

            if self.passable(next, filter) {
                cell = next;
                p = crossing;
                if visited.len() < MAX_VISITED {
                    visited.push(self.ref_of(cell));
                }
            } else {
                // Wall edge: stop at the boundary, inset into the cell.
                let stopped = self.closest_point_in_cell(cell, crossing);
                return Ok([stopped.x, 0.0, stopped.y]);
            }
        }

        Ok([p.x, 0.0, p.y])
    }

    fn is_valid_ref(&self, reference: PolyRef) -> bool {
        match self.cell_of(reference) {
            Some(cell) => self.idx(cell).map(|i| self.flags[i] != 0).unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_poly_snaps_outside_point_to_border() {
        let surface = PlanarSurface::new(10, 10, 1.0);
        let filter = QueryFilter::default();
        let (reference, point) = surface
            .find_nearest_poly(&[-0.5, 0.0, 5.0], &[2.0, 2.0, 2.0], &filter)
            .unwrap();
        assert!(reference.is_valid());
        assert!(point[0] >= 0.0 && point[0] < 1.0);
    }

    #[test]
    fn nearest_poly_fails_beyond_extents() {
        let surface = PlanarSurface::new(4, 4, 1.0);
        let filter = QueryFilter::default();
        assert!(surface
            .find_nearest_poly(&[-10.0, 0.0, 2.0], &[2.0, 2.0, 2.0], &filter)
            .is_err());
    }

    #[test]
    fn path_connects_distant_cells() {
        let mut surface = PlanarSurface::new(16, 16, 1.0);
        let filter = QueryFilter::default();
        let start = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
        let end = surface.cell_ref_at(&[15.5, 0.0, 15.5]);
        let path = surface
            .find_path(start, end, &[0.5, 0.0, 0.5], &[15.5, 0.0, 15.5], &filter)
            .unwrap();
        assert!(!path.partial);
        assert_eq!(path.polys.first(), Some(&start));
        assert_eq!(path.polys.last(), Some(&end));
        // Manhattan-optimal on an empty grid.
        assert_eq!(path.polys.len(), 31);
    }

    #[test]
    fn path_routes_around_holes() {
        let mut surface = PlanarSurface::new(8, 8, 1.0);
        // Wall across x = 4 with a gap at z = 7.
        for z in 0..7 {
            surface.set_cell_flags(4, z, 0);
        }
        let filter = QueryFilter::default();
        let start = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
        let end = surface.cell_ref_at(&[7.5, 0.0, 0.5]);
        let path = surface
            .find_path(start, end, &[0.5, 0.0, 0.5], &[7.5, 0.0, 0.5], &filter)
            .unwrap();
        assert!(!path.partial);
        assert!(path.polys.len() > 8);
    }

    #[test]
    fn move_along_surface_stops_at_walls() {
        let mut surface = PlanarSurface::new(8, 8, 1.0);
        surface.set_cell_flags(3, 0, 0);
        let filter = QueryFilter::default();
        let start = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
        let mut visited = Vec::new();
        let pos = surface
            .move_along_surface(start, &[0.5, 0.0, 0.5], &[7.5, 0.0, 0.5], &filter, &mut visited)
            .unwrap();
        // Stopped just before the hole at x = 3.
        assert!(pos[0] <= 3.0);
        assert!(pos[0] > 2.5);
        assert_eq!(visited.len(), 3);
    }

    #[test]
    fn move_along_surface_reaches_open_targets() {
        let surface = PlanarSurface::new(8, 8, 1.0);
        let filter = QueryFilter::default();
        let start = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
        let mut visited = Vec::new();
        let pos = surface
            .move_along_surface(start, &[0.5, 0.0, 0.5], &[4.5, 0.0, 4.5], &filter, &mut visited)
            .unwrap();
        assert!((pos[0] - 4.5).abs() < 1e-5);
        assert!((pos[2] - 4.5).abs() < 1e-5);
        assert_eq!(visited.first(), Some(&start));
        assert!(visited.len() > 1);
    }
}
