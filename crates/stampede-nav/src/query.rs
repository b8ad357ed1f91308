//! The navigation query contract consumed by the crowd core.

use stampede_common::Result;

use super::{PolyRef, QueryFilter};

/// A polygon sequence returned by [`NavQuery::find_path`].
///
/// `partial` distinguishes "reached the requested end polygon" from
/// "ran out of search budget and returned the best prefix"; callers that
/// care about completeness must check it rather than the polygon count.
#[derive(Debug, Clone, Default)]
pub struct NavPath {
    pub polys: Vec<PolyRef>,
    pub partial: bool,
}

impl NavPath {
    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }
}

/// Query service over a walkable surface.
///
/// Implementations own whatever surface representation they like; the crowd
/// core only relies on the semantics below:
///
/// - `find_nearest_poly` searches a box of `half_extents` around `center`
///   and errors when no polygon passing the filter lies inside it.
/// - `find_path` connects two valid polygon references or errors; it never
///   returns an empty polygon list on success.
/// - `move_along_surface` slides a position from `start_pos` toward
///   `end_pos` without crossing non-traversable edges, recording every
///   polygon visited (first entry is `start`); the returned position is
///   always on the surface.
pub trait NavQuery {
    /// Finds the polygon nearest to `center` within the search box.
    fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<(PolyRef, [f32; 3])>;

    /// Finds a polygon path from `start` to `end`.
    fn find_path(
        &mut self,
        start: PolyRef,
        end: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<NavPath>;

    /// Moves from `start_pos` toward `end_pos` constrained to the surface.
    fn move_along_surface(
        &self,
        start: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        visited: &mut Vec<PolyRef>,
    ) -> Result<[f32; 3]>;

    /// Whether the reference currently identifies a polygon on the surface.
    fn is_valid_ref(&self, reference: PolyRef) -> bool;
}
