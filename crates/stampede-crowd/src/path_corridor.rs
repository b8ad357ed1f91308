//! Path corridor: the rolling polygon window an agent follows.
//!
//! Each agent exclusively owns one corridor. The crowd manager installs a
//! polygon path into it after a successful move request and re-projects the
//! agent's position through it once per tick; the corridor prunes polygons
//! the agent has already walked past.

use stampede_common::{Error, Result};
use stampede_nav::{NavQuery, PolyRef, QueryFilter};

/// Rolling window over the current polygon path.
#[derive(Debug, Clone, Default)]
pub struct PathCorridor {
    pos: [f32; 3],
    target: [f32; 3],
    path: Vec<PolyRef>,
    // Reused across move_position calls to keep the per-tick path free of
    // allocations.
    visited: Vec<PolyRef>,
}

impl PathCorridor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the corridor to a single polygon at `pos`.
    ///
    /// An invalid `reference` leaves the corridor empty; the agent cannot
    /// move until a later query succeeds.
    pub fn reset(&mut self, reference: PolyRef, pos: [f32; 3]) {
        self.pos = pos;
        self.target = pos;
        self.path.clear();
        self.visited.clear();
        if reference.is_valid() {
            self.path.push(reference);
        }
    }

    /// Installs a new polygon path and target.
    pub fn set_corridor(&mut self, target: [f32; 3], polys: &[PolyRef]) {
        self.target = target;
        self.path.clear();
        self.path.extend_from_slice(polys);
    }

    /// Re-projects `new_pos` onto the surface along the corridor and prunes
    /// polygons that have been walked past.
    pub fn move_position<Q: NavQuery>(
        &mut self,
        new_pos: [f32; 3],
        query: &Q,
        filter: &QueryFilter,
    ) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::EmptyCorridor);
        }

        let mut visited = std::mem::take(&mut self.visited);
        let result =
            query.move_along_surface(self.path[0], &self.pos, &new_pos, filter, &mut visited);
        let moved = match result {
            Ok(pos) => pos,
            Err(err) => {
                self.visited = visited;
                return Err(err);
            }
        };

        self.pos = moved;

        // Advance the window. The first polygon must always be the one the
        // corridor position is in, i.e. the last polygon visited.
        if let Some(last) = visited.last().copied() {
            match self.path.iter().position(|&p| p == last) {
                Some(idx) => {
                    // Still on the path; drop the polygons walked past.
                    self.path.drain(..idx);
                }
                None => {
                    // Walked off the corridor: the visited chain, nearest
                    // polygon first, becomes the new window.
                    self.path.clear();
                    self.path.extend(visited.iter().rev());
                }
            }
        }

        self.visited = visited;
        Ok(())
    }

    pub fn pos(&self) -> [f32; 3] {
        self.pos
    }

    pub fn target(&self) -> [f32; 3] {
        self.target
    }

    pub fn path(&self) -> &[PolyRef] {
        &self.path
    }

    pub fn first_poly(&self) -> PolyRef {
        self.path.first().copied().unwrap_or(PolyRef::NONE)
    }

    pub fn last_poly(&self) -> PolyRef {
        self.path.last().copied().unwrap_or(PolyRef::NONE)
    }
}
