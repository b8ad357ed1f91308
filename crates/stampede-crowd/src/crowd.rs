//! Crowd manager: the fixed agent pool and the per-tick update loop.

use tracing::{debug, trace};

use stampede_common::{sqr, vclamp_len, vdist_sqr, vdist_sqr_2d, vdist_2d, vmad, vnormalize_2d, vsub};
use stampede_nav::{NavQuery, PolyRef, QueryFilter};

use crate::agent::{
    insert_neighbor, AgentState, CrowdAgent, MoveRequestState, Neighbor, MAX_NEIGHBORS,
};
use crate::obstacle_avoidance::ObstacleAvoidanceQuery;
use crate::params::{AgentParams, ObstacleAvoidanceParams};

/// Seconds before reaching the target in which an agent slows down.
const SLOWDOWN_HORIZON: f32 = 0.4;

/// Distance to the corridor target under which the desired velocity is zero.
const ARRIVAL_EPSILON: f32 = 0.01;

/// Speeds below this skip surface movement entirely.
const MIN_SPEED: f32 = 1e-4;

/// Number of avoidance quality presets.
const AVOIDANCE_PRESET_COUNT: usize = 4;

/// Simulation manager for a fixed-capacity pool of agents on a shared
/// navigation surface.
///
/// All slots are allocated by [`new`](Crowd::new); nothing allocates during
/// [`update`](Crowd::update). Each tick runs six phases across the whole
/// pool in order — move requests, corridor sync + neighbor rebuild, desired
/// velocity, obstacle avoidance, separation, integration — and each phase
/// completes for every agent before the next starts. Within a phase an
/// agent writes only its own slot and reads only previous-phase state of
/// the others, so the phases are the synchronization boundaries if the
/// per-agent work is ever parallelized.
pub struct Crowd<Q: NavQuery> {
    query: Q,
    filter: QueryFilter,
    agents: Vec<CrowdAgent>,
    avoidance: ObstacleAvoidanceQuery,
    avoidance_presets: [ObstacleAvoidanceParams; AVOIDANCE_PRESET_COUNT],
    active_count: usize,
    // Reused by the integration phase.
    scratch_visited: Vec<PolyRef>,
}

impl<Q: NavQuery> Crowd<Q> {
    /// Creates a crowd over `query` with a pool of `max_agents` slots.
    pub fn new(query: Q, max_agents: usize) -> Self {
        Self {
            query,
            filter: QueryFilter::default(),
            agents: vec![CrowdAgent::default(); max_agents],
            avoidance: ObstacleAvoidanceQuery::new(),
            avoidance_presets: ObstacleAvoidanceParams::presets(),
            active_count: 0,
            scratch_visited: Vec::with_capacity(16),
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn query_filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn set_query_filter(&mut self, filter: QueryFilter) {
        self.filter = filter;
    }

    pub fn max_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn active_agent_count(&self) -> usize {
        self.active_count
    }

    /// Replaces the avoidance preset for one quality level (0-3).
    pub fn set_avoidance_params(&mut self, level: u8, params: ObstacleAvoidanceParams) {
        self.avoidance_presets[preset_index(level)] = params;
    }

    pub fn avoidance_params(&self, level: u8) -> &ObstacleAvoidanceParams {
        &self.avoidance_presets[preset_index(level)]
    }

    /// The agent in slot `idx`, if the slot is in use.
    pub fn agent(&self, idx: usize) -> Option<&CrowdAgent> {
        self.agents.get(idx).filter(|a| a.is_active())
    }

    /// Claims a free slot for a new agent and snaps it to the surface.
    ///
    /// Returns `None` when the pool is full. When no polygon lies within
    /// `(collision_query_range, height, collision_query_range)` of `pos`
    /// the agent is still created but starts in [`AgentState::Invalid`]
    /// with the raw position and will not move.
    pub fn add_agent(&mut self, pos: [f32; 3], params: AgentParams) -> Option<usize> {
        let slot = self.agents.iter().position(|a| !a.is_active())?;

        let extents = [
            params.collision_query_range,
            params.height,
            params.collision_query_range,
        ];
        let (poly, spawn_pos) = match self.query.find_nearest_poly(&pos, &extents, &self.filter) {
            Ok((reference, nearest)) => (reference, nearest),
            Err(err) => {
                debug!(slot, error = %err, "agent spawned off the surface");
                (PolyRef::NONE, pos)
            }
        };

        self.agents[slot].spawn(spawn_pos, poly, params);
        self.active_count += 1;
        Some(slot)
    }

    /// Releases a slot. No-op for inactive or out-of-range indices.
    pub fn remove_agent(&mut self, idx: usize) {
        match self.agents.get_mut(idx) {
            Some(agent) if agent.is_active() => {
                agent.reset();
                self.active_count -= 1;
            }
            _ => {}
        }
    }

    /// Records a move request toward a known polygon.
    ///
    /// Only records: pathfinding runs in the next [`update`](Crowd::update)
    /// so its cost is batched with everything else. Returns `false` for an
    /// invalid or inactive agent index.
    pub fn request_move_target(
        &mut self,
        idx: usize,
        target_ref: PolyRef,
        target_pos: [f32; 3],
    ) -> bool {
        match self.agents.get_mut(idx) {
            Some(agent) if agent.is_active() => {
                agent.set_move_request(target_ref, target_pos);
                true
            }
            _ => false,
        }
    }

    /// Resolves `pos` to its nearest polygon, then records a move request.
    pub fn request_move_position(&mut self, idx: usize, pos: [f32; 3]) -> bool {
        let extents = match self.agents.get(idx) {
            Some(agent) if agent.is_active() => [
                agent.params.collision_query_range,
                agent.params.height,
                agent.params.collision_query_range,
            ],
            _ => return false,
        };
        match self.query.find_nearest_poly(&pos, &extents, &self.filter) {
            Ok((reference, nearest)) => self.request_move_target(idx, reference, nearest),
            Err(err) => {
                debug!(agent = idx, error = %err, "move request position is off the surface");
                false
            }
        }
    }

    /// Advances the simulation by `dt` seconds. Non-positive (or NaN) `dt`
    /// is a no-op tick.
    pub fn update(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }

        self.process_move_requests();
        self.sync_corridors();
        self.build_neighbor_lists();
        self.compute_desired_velocities();
        self.sample_avoidance_velocities();
        self.apply_separation();
        self.integrate(dt);
    }

    /// Phase 1: consume pending move requests.
    fn process_move_requests(&mut self) {
        for i in 0..self.agents.len() {
            {
                let agent = &self.agents[i];
                if !agent.is_active() || agent.move_request_state() != MoveRequestState::Pending {
                    continue;
                }
            }

            let (start, end, start_pos, target_pos) = {
                let agent = &self.agents[i];
                (
                    agent.current_poly,
                    agent.target_ref,
                    agent.pos,
                    agent.target_pos,
                )
            };

            // Handles are re-validated every time before they are trusted.
            if !start.is_valid()
                || !end.is_valid()
                || !self.query.is_valid_ref(start)
                || !self.query.is_valid_ref(end)
            {
                debug!(agent = i, "move request failed: invalid polygon reference");
                self.agents[i].fail_request();
                continue;
            }

            match self
                .query
                .find_path(start, end, &start_pos, &target_pos, &self.filter)
            {
                Ok(path) if !path.is_empty() => {
                    if path.partial {
                        trace!(agent = i, "move request resolved with a partial path");
                    }
                    let agent = &mut self.agents[i];
                    agent.corridor.set_corridor(target_pos, &path.polys);
                    agent.begin_walking();
                }
                Ok(_) => {
                    debug!(agent = i, "move request failed: empty path");
                    self.agents[i].fail_request();
                }
                Err(err) => {
                    debug!(agent = i, error = %err, "move request failed");
                    self.agents[i].fail_request();
                }
            }
        }
    }

    /// Phase 2a: re-project every agent through its corridor.
    fn sync_corridors(&mut self) {
        for i in 0..self.agents.len() {
            {
                let agent = &self.agents[i];
                if !agent.is_active() || agent.state() == AgentState::Invalid {
                    continue;
                }
            }
            let pos = self.agents[i].pos;
            match self.agents[i]
                .corridor
                .move_position(pos, &self.query, &self.filter)
            {
                Ok(()) => {
                    let agent = &mut self.agents[i];
                    agent.pos = agent.corridor.pos();
                    agent.current_poly = agent.corridor.first_poly();
                }
                Err(err) => {
                    trace!(agent = i, error = %err, "corridor sync failed");
                }
            }
        }
    }

    /// Phase 2b: rebuild every agent's bounded neighbor list.
    ///
    /// Runs strictly after the corridor sync so every scan observes
    /// post-sync positions.
    fn build_neighbor_lists(&mut self) {
        for i in 0..self.agents.len() {
            {
                let agent = &self.agents[i];
                if !agent.is_active() || agent.state() == AgentState::Invalid {
                    continue;
                }
            }
            self.agents[i].clear_neighbors();

            let pos = self.agents[i].pos;
            let range_sqr = sqr(self.agents[i].params.collision_query_range);

            let mut list = [Neighbor::default(); MAX_NEIGHBORS];
            let mut count = 0;
            for (j, other) in self.agents.iter().enumerate() {
                if j == i || !other.is_active() || other.state() == AgentState::Invalid {
                    continue;
                }
                let dist_sqr = vdist_sqr(&pos, &other.pos);
                if dist_sqr < range_sqr {
                    count = insert_neighbor(&mut list, count, Neighbor { agent: j, dist_sqr });
                }
            }
            self.agents[i].set_neighbors(&list[..count]);
        }
    }

    /// Phase 3: steer walking agents toward their corridor target.
    fn compute_desired_velocities(&mut self) {
        for agent in self.agents.iter_mut() {
            if !agent.is_active() || agent.state() != AgentState::Walking {
                continue;
            }
            let target = agent.corridor.target();
            let dist = vdist_2d(&agent.pos, &target);
            agent.dvel = if dist < ARRIVAL_EPSILON {
                [0.0; 3]
            } else {
                // Full speed far out, decelerating through the last 0.4 s.
                let speed = (dist / SLOWDOWN_HORIZON).min(agent.params.max_speed);
                let dir = vnormalize_2d(&vsub(&target, &agent.pos));
                [dir[0] * speed, 0.0, dir[2] * speed]
            };
        }
    }

    /// Phase 4: sample an admissible velocity near the desired one.
    ///
    /// Writes the working velocity (`nvel`); the current velocities every
    /// agent reads from its neighbors stay untouched until integration.
    fn sample_avoidance_velocities(&mut self) {
        for i in 0..self.agents.len() {
            let (walking, avoid) = {
                let agent = &self.agents[i];
                if !agent.is_active() || agent.state() == AgentState::Invalid {
                    continue;
                }
                (
                    agent.state() == AgentState::Walking,
                    agent.params.update_flags.obstacle_avoidance(),
                )
            };

            if !(walking && avoid) {
                let agent = &mut self.agents[i];
                agent.nvel = agent.dvel;
                continue;
            }

            self.avoidance.reset();
            for n in self.agents[i].neighbors() {
                let other = &self.agents[n.agent];
                self.avoidance
                    .add_circle(&other.pos, other.params.radius, &other.vel, &other.dvel);
            }

            let (pos, rad, vmax, vel, dvel, quality) = {
                let agent = &self.agents[i];
                (
                    agent.pos,
                    agent.params.radius,
                    agent.params.max_speed,
                    agent.vel,
                    agent.dvel,
                    agent.params.avoidance_quality,
                )
            };
            let params = self.avoidance_presets[preset_index(quality)];
            let (nvel, admissible) =
                self.avoidance
                    .sample_velocity_adaptive(&pos, rad, vmax, &vel, &dvel, &params);
            if !admissible {
                trace!(agent = i, "no admissible avoidance velocity");
            }
            self.agents[i].nvel = nvel;
        }
    }

    /// Phase 5: push overlapping agents apart.
    fn apply_separation(&mut self) {
        for i in 0..self.agents.len() {
            {
                let agent = &self.agents[i];
                if !agent.is_active()
                    || agent.state() == AgentState::Invalid
                    || !agent.params.update_flags.separation()
                {
                    continue;
                }
            }

            let pos = self.agents[i].pos;
            let radius = self.agents[i].params.radius;
            let weight = self.agents[i].params.separation_weight;

            let mut disp = [0.0f32; 3];
            for n in self.agents[i].neighbors() {
                let other = &self.agents[n.agent];
                let combined = radius + other.params.radius;
                let dist_sqr = vdist_sqr_2d(&pos, &other.pos);
                if dist_sqr >= sqr(combined) {
                    continue;
                }
                let dist = dist_sqr.sqrt();
                let (dir, overlap) = if dist > MIN_SPEED {
                    (
                        [
                            (pos[0] - other.pos[0]) / dist,
                            0.0,
                            (pos[2] - other.pos[2]) / dist,
                        ],
                        (combined - dist) / combined,
                    )
                } else {
                    // Coincident agents: deterministic opposite pushes by
                    // slot order.
                    let dir = if i < n.agent {
                        [1.0, 0.0, 0.0]
                    } else {
                        [-1.0, 0.0, 0.0]
                    };
                    (dir, 1.0)
                };
                disp = vmad(&disp, &dir, overlap * weight);
            }

            // Post-avoidance correction onto the working velocity, not the
            // desired velocity.
            let agent = &mut self.agents[i];
            agent.nvel = [
                agent.nvel[0] + disp[0],
                agent.nvel[1] + disp[1],
                agent.nvel[2] + disp[2],
            ];
        }
    }

    /// Phase 6: commit velocities, move along the surface, check arrival.
    fn integrate(&mut self, dt: f32) {
        let Self {
            query,
            filter,
            agents,
            scratch_visited,
            ..
        } = self;

        for (i, agent) in agents.iter_mut().enumerate() {
            if !agent.is_active() || agent.state() == AgentState::Invalid {
                continue;
            }

            agent.vel = vclamp_len(&agent.nvel, agent.params.max_speed);

            let speed_sqr = sqr(agent.vel[0]) + sqr(agent.vel[1]) + sqr(agent.vel[2]);
            if speed_sqr > sqr(MIN_SPEED) && agent.current_poly.is_valid() {
                let new_pos = vmad(&agent.pos, &agent.vel, dt);
                scratch_visited.clear();
                match query.move_along_surface(
                    agent.current_poly,
                    &agent.pos,
                    &new_pos,
                    filter,
                    scratch_visited,
                ) {
                    Ok(pos) => {
                        agent.pos = pos;
                        if let Some(&last) = scratch_visited.last() {
                            agent.current_poly = last;
                        }
                    }
                    Err(err) => {
                        debug!(agent = i, error = %err, "surface move failed");
                    }
                }
            }

            if agent.state() == AgentState::Walking
                && vdist_sqr_2d(&agent.pos, &agent.target_pos) < sqr(agent.params.radius)
            {
                agent.arrive();
            }
        }
    }
}

fn preset_index(level: u8) -> usize {
    (level as usize).min(AVOIDANCE_PRESET_COUNT - 1)
}
