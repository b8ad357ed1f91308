//! Per-agent simulation state.

use stampede_nav::PolyRef;

use crate::params::AgentParams;
use crate::path_corridor::PathCorridor;

/// The maximum number of neighbors an agent takes into account for steering.
pub const MAX_NEIGHBORS: usize = 8;

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    /// The agent has no valid position on the surface and does not move.
    #[default]
    Invalid,
    /// The agent is on the surface with no active movement.
    Idle,
    /// The agent is following its corridor toward a target.
    Walking,
    /// The agent is traversing an off-mesh connection.
    OffMeshConnection,
}

/// Lifecycle of the most recent move request, independent of [`AgentState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveRequestState {
    #[default]
    None,
    /// Recorded but not yet path-found; consumed by the next update.
    Pending,
    /// Pathfinding succeeded and the corridor is installed.
    Valid,
    /// Pathfinding failed; terminal until a new request overwrites it.
    Failed,
}

/// One entry of an agent's per-tick neighbor list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Neighbor {
    /// Pool index of the neighboring agent
    pub agent: usize,
    /// Squared distance at the time the list was built
    pub dist_sqr: f32,
}

/// Inserts a neighbor into a bounded list kept sorted ascending by distance.
/// Returns the new entry count; the furthest entry falls off a full list.
pub(crate) fn insert_neighbor(
    list: &mut [Neighbor; MAX_NEIGHBORS],
    count: usize,
    candidate: Neighbor,
) -> usize {
    let mut insert_at = count;
    for (i, entry) in list.iter().enumerate().take(count) {
        if candidate.dist_sqr < entry.dist_sqr {
            insert_at = i;
            break;
        }
    }
    if insert_at >= MAX_NEIGHBORS {
        return count;
    }

    let new_count = (count + 1).min(MAX_NEIGHBORS);
    for i in (insert_at..new_count.saturating_sub(1)).rev() {
        list[i + 1] = list[i];
    }
    list[insert_at] = candidate;
    new_count
}

/// One slot of the crowd's fixed agent pool.
///
/// Slots are reused, never reallocated; `active` marks whether the slot
/// currently holds a logical agent. All lifecycle transitions go through
/// the methods below so the legal transition table lives in one place.
#[derive(Debug, Clone, Default)]
pub struct CrowdAgent {
    pub(crate) active: bool,
    state: AgentState,
    move_request: MoveRequestState,
    pub(crate) params: AgentParams,
    pub(crate) pos: [f32; 3],
    pub(crate) vel: [f32; 3],
    pub(crate) dvel: [f32; 3],
    /// Working velocity for the tick in flight: written by the avoidance and
    /// separation phases, committed to `vel` by integration. Keeping it
    /// separate lets every phase read neighbors' previous-phase velocities.
    pub(crate) nvel: [f32; 3],
    pub(crate) target_pos: [f32; 3],
    pub(crate) current_poly: PolyRef,
    pub(crate) target_ref: PolyRef,
    pub(crate) corridor: PathCorridor,
    neighbors: [Neighbor; MAX_NEIGHBORS],
    n_neighbors: usize,
}

impl CrowdAgent {
    /// Clears the slot back to defaults and releases it.
    pub(crate) fn reset(&mut self) {
        *self = CrowdAgent::default();
    }

    /// Claims the slot for a new agent. `poly` may be the invalid sentinel
    /// when no polygon was found near the spawn position; the agent then
    /// starts `Invalid` and stays put.
    pub(crate) fn spawn(&mut self, pos: [f32; 3], poly: PolyRef, params: AgentParams) {
        self.reset();
        self.active = true;
        self.params = params;
        self.pos = pos;
        self.current_poly = poly;
        self.corridor.reset(poly, pos);
        self.state = if poly.is_valid() {
            AgentState::Idle
        } else {
            AgentState::Invalid
        };
    }

    /// Records a move request for the next update to consume.
    pub(crate) fn set_move_request(&mut self, target_ref: PolyRef, target_pos: [f32; 3]) {
        self.target_ref = target_ref;
        self.target_pos = target_pos;
        self.move_request = MoveRequestState::Pending;
    }

    /// Pathfinding succeeded: the corridor is installed and the agent walks.
    pub(crate) fn begin_walking(&mut self) {
        debug_assert!(self.state != AgentState::Invalid);
        self.state = AgentState::Walking;
        self.move_request = MoveRequestState::Valid;
    }

    /// Pathfinding failed; lifecycle state is left unchanged.
    pub(crate) fn fail_request(&mut self) {
        self.move_request = MoveRequestState::Failed;
    }

    /// Reached the target: stop moving. The move request intentionally stays
    /// `Valid` so re-checking arrival is idempotent; only a new request
    /// overwrites it.
    pub(crate) fn arrive(&mut self) {
        debug_assert!(self.state == AgentState::Walking);
        self.state = AgentState::Idle;
        self.vel = [0.0; 3];
        self.dvel = [0.0; 3];
        self.nvel = [0.0; 3];
    }

    pub(crate) fn clear_neighbors(&mut self) {
        self.n_neighbors = 0;
    }

    pub(crate) fn set_neighbors(&mut self, list: &[Neighbor]) {
        let n = list.len().min(MAX_NEIGHBORS);
        self.neighbors[..n].copy_from_slice(&list[..n]);
        self.n_neighbors = n;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn move_request_state(&self) -> MoveRequestState {
        self.move_request
    }

    pub fn position(&self) -> [f32; 3] {
        self.pos
    }

    pub fn velocity(&self) -> [f32; 3] {
        self.vel
    }

    pub fn desired_velocity(&self) -> [f32; 3] {
        self.dvel
    }

    pub fn target_position(&self) -> [f32; 3] {
        self.target_pos
    }

    pub fn current_poly(&self) -> PolyRef {
        self.current_poly
    }

    pub fn target_ref(&self) -> PolyRef {
        self.target_ref
    }

    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    pub fn corridor(&self) -> &PathCorridor {
        &self.corridor
    }

    /// Neighbors found this tick, sorted ascending by squared distance.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors[..self.n_neighbors]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(agent: usize, dist_sqr: f32) -> Neighbor {
        Neighbor { agent, dist_sqr }
    }

    #[test]
    fn neighbors_stay_sorted() {
        let mut list = [Neighbor::default(); MAX_NEIGHBORS];
        let mut n = 0;
        for (i, d) in [4.0, 1.0, 9.0, 0.25].into_iter().enumerate() {
            n = insert_neighbor(&mut list, n, neighbor(i, d));
        }
        assert_eq!(n, 4);
        let dists: Vec<f32> = list[..n].iter().map(|e| e.dist_sqr).collect();
        assert_eq!(dists, vec![0.25, 1.0, 4.0, 9.0]);
    }

    #[test]
    fn neighbor_list_caps_at_capacity() {
        let mut list = [Neighbor::default(); MAX_NEIGHBORS];
        let mut n = 0;
        for i in 0..MAX_NEIGHBORS + 4 {
            n = insert_neighbor(&mut list, n, neighbor(i, i as f32));
        }
        assert_eq!(n, MAX_NEIGHBORS);
        // Furthest candidates were dropped.
        assert!(list[..n].iter().all(|e| e.dist_sqr < MAX_NEIGHBORS as f32));
    }

    #[test]
    fn far_candidate_ignored_when_full() {
        let mut list = [Neighbor::default(); MAX_NEIGHBORS];
        let mut n = 0;
        for i in 0..MAX_NEIGHBORS {
            n = insert_neighbor(&mut list, n, neighbor(i, i as f32));
        }
        let n2 = insert_neighbor(&mut list, n, neighbor(99, 100.0));
        assert_eq!(n2, MAX_NEIGHBORS);
        assert!(list.iter().all(|e| e.agent != 99));
    }

    #[test]
    fn spawn_without_poly_is_invalid() {
        let mut agent = CrowdAgent::default();
        agent.spawn([1.0, 0.0, 1.0], PolyRef::NONE, AgentParams::default());
        assert!(agent.is_active());
        assert_eq!(agent.state(), AgentState::Invalid);
        assert_eq!(agent.position(), [1.0, 0.0, 1.0]);
    }
}
