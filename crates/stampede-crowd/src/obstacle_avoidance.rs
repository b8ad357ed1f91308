//! Velocity-obstacle sampling for local collision avoidance.
//!
//! Given the agent's desired velocity and the obstacles around it (moving
//! circles for other agents, segments for walls), the query searches
//! candidate-velocity space for the lowest-penalty velocity that does not
//! lead to an imminent collision. Sampling is one-sided: no assumption is
//! made that the other agent is avoiding too, so two mutually closing
//! agents can in principle oscillate — a property of the algorithm choice,
//! not an implementation defect.

use stampede_common::{dist_pt_seg_sqr_2d, sqr, vcross_2d, vdist_2d, vnormalize_2d};

use crate::params::ObstacleAvoidanceParams;

/// Maximum circle obstacles per query.
pub const MAX_OBSTACLE_CIRCLES: usize = 32;

/// Maximum segment obstacles per query.
pub const MAX_OBSTACLE_SEGMENTS: usize = 32;

/// A candidate below this time-of-impact is discarded outright.
const IMMINENT_TOI: f32 = 0.01;

/// Moving circular obstacle (usually another agent).
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstacleCircle {
    /// Position of the obstacle
    pub p: [f32; 3],
    /// Velocity of the obstacle
    pub vel: [f32; 3],
    /// Desired velocity of the obstacle
    pub dvel: [f32; 3],
    /// Radius of the obstacle
    pub rad: f32,
}

/// Static segment obstacle (a wall edge).
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstacleSegment {
    /// Start point of the segment
    pub p: [f32; 3],
    /// End point of the segment
    pub q: [f32; 3],
    /// Whether the querying agent is already touching the segment
    touch: bool,
}

/// Reusable velocity-obstacle query.
///
/// Obstacle storage is fixed-capacity and cleared by [`reset`]; additions
/// beyond capacity are silently dropped, keeping per-tick cost bounded at
/// the price of ignoring the furthest obstacles in extreme crowds.
///
/// [`reset`]: ObstacleAvoidanceQuery::reset
#[derive(Debug)]
pub struct ObstacleAvoidanceQuery {
    circles: [ObstacleCircle; MAX_OBSTACLE_CIRCLES],
    n_circles: usize,
    segments: [ObstacleSegment; MAX_OBSTACLE_SEGMENTS],
    n_segments: usize,

    params: ObstacleAvoidanceParams,
    inv_horiz_time: f32,
    inv_vmax: f32,
}

impl Default for ObstacleAvoidanceQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstacleAvoidanceQuery {
    pub fn new() -> Self {
        Self {
            circles: [ObstacleCircle::default(); MAX_OBSTACLE_CIRCLES],
            n_circles: 0,
            segments: [ObstacleSegment::default(); MAX_OBSTACLE_SEGMENTS],
            n_segments: 0,
            params: ObstacleAvoidanceParams::default(),
            inv_horiz_time: 0.0,
            inv_vmax: 0.0,
        }
    }

    /// Clears the obstacle lists. Call once per agent before re-populating.
    pub fn reset(&mut self) {
        self.n_circles = 0;
        self.n_segments = 0;
    }

    pub fn add_circle(&mut self, pos: &[f32; 3], rad: f32, vel: &[f32; 3], dvel: &[f32; 3]) {
        if self.n_circles >= MAX_OBSTACLE_CIRCLES {
            return;
        }
        self.circles[self.n_circles] = ObstacleCircle {
            p: *pos,
            vel: *vel,
            dvel: *dvel,
            rad,
        };
        self.n_circles += 1;
    }

    pub fn add_segment(&mut self, p: &[f32; 3], q: &[f32; 3]) {
        if self.n_segments >= MAX_OBSTACLE_SEGMENTS {
            return;
        }
        self.segments[self.n_segments] = ObstacleSegment {
            p: *p,
            q: *q,
            touch: false,
        };
        self.n_segments += 1;
    }

    pub fn circle_count(&self) -> usize {
        self.n_circles
    }

    pub fn segment_count(&self) -> usize {
        self.n_segments
    }

    /// Searches for the best non-colliding velocity near `dvel`.
    ///
    /// Runs `adaptive_depth` refinement rounds; each round samples the
    /// current search center plus `adaptive_rings` concentric rings of
    /// `adaptive_divs` points, then re-centers on the round's best candidate
    /// and halves the sampling radius. No randomness anywhere: identical
    /// inputs always produce identical output.
    ///
    /// Returns the best candidate and whether any candidate scored below
    /// `f32::MAX` (false effectively only when every direction collides
    /// immediately).
    pub fn sample_velocity_adaptive(
        &mut self,
        pos: &[f32; 3],
        rad: f32,
        vmax: f32,
        vel: &[f32; 3],
        dvel: &[f32; 3],
        params: &ObstacleAvoidanceParams,
    ) -> ([f32; 3], bool) {
        if self.n_circles == 0 && self.n_segments == 0 {
            return (*dvel, true);
        }

        self.prepare(pos);
        self.params = *params;
        self.inv_horiz_time = 1.0 / params.horiz_time;
        self.inv_vmax = if vmax > 0.0 { 1.0 / vmax } else { f32::MAX };

        let divs = params.adaptive_divs.max(1) as usize;
        let rings = params.adaptive_rings.max(1) as usize;
        let depth = params.adaptive_depth.max(1) as usize;

        let mut best_vel = [0.0; 3];
        let mut best_score = f32::MAX;

        let mut center = [dvel[0], 0.0, dvel[2]];
        let mut radius = vmax * (1.0 - params.vel_bias);

        for _ in 0..depth {
            let cand = clamp_speed(&center, vmax);
            let mut round_best = cand;
            let mut round_score = self.process_sample(&cand, pos, rad, vel, dvel);

            for ring in 1..=rings {
                let cr = radius * ring as f32 / rings as f32;
                for i in 0..divs {
                    let a = i as f32 * std::f32::consts::TAU / divs as f32;
                    let cand = clamp_speed(
                        &[center[0] + cr * a.cos(), 0.0, center[2] + cr * a.sin()],
                        vmax,
                    );
                    let score = self.process_sample(&cand, pos, rad, vel, dvel);
                    if score < round_score {
                        round_score = score;
                        round_best = cand;
                    }
                }
            }

            if round_score < best_score {
                best_score = round_score;
                best_vel = round_best;
            }

            center = round_best;
            radius *= 0.5;
        }

        (best_vel, best_score < f32::MAX)
    }

    /// Marks segments the agent is already standing on; their collision
    /// handling differs from distant walls.
    fn prepare(&mut self, pos: &[f32; 3]) {
        for seg in self.segments.iter_mut().take(self.n_segments) {
            let (dist_sqr, _) = dist_pt_seg_sqr_2d(pos, &seg.p, &seg.q);
            seg.touch = dist_sqr < sqr(IMMINENT_TOI);
        }
    }

    /// Penalty for one candidate velocity; lower is better, `f32::MAX`
    /// means rejected.
    fn process_sample(
        &self,
        vcand: &[f32; 3],
        pos: &[f32; 3],
        rad: f32,
        vel: &[f32; 3],
        dvel: &[f32; 3],
    ) -> f32 {
        let vpen = self.params.weight_des_vel * vdist_2d(vcand, dvel) * self.inv_vmax;
        let vcpen = self.params.weight_cur_vel * vdist_2d(vcand, vel) * self.inv_vmax;

        // Earliest impact over all obstacles; anything beyond the horizon is
        // not an impact.
        let mut tmin = self.params.horiz_time;

        for cir in self.circles.iter().take(self.n_circles) {
            let vab = [vcand[0] - cir.vel[0], vcand[2] - cir.vel[2]];
            let dp = [cir.p[0] - pos[0], cir.p[2] - pos[2]];
            if let Some(t) = sweep_circle(&vab, &dp, cir.rad + rad) {
                if t < tmin {
                    tmin = t;
                }
            }
        }

        for seg in self.segments.iter().take(self.n_segments) {
            let sp = [seg.p[0] - pos[0], seg.p[2] - pos[2]];
            let sq = [seg.q[0] - pos[0], seg.q[2] - pos[2]];
            let v = [vcand[0], vcand[2]];
            if seg.touch {
                // Standing on the wall: any motion into it collides now.
                if moving_into(&sp, &sq, &v) {
                    return f32::MAX;
                }
                continue;
            }
            if let Some(t) = isect_ray_seg(&v, &sp, &sq) {
                if t < tmin {
                    tmin = t;
                }
            }
        }

        if tmin < IMMINENT_TOI {
            return f32::MAX;
        }

        let side = {
            let dn = vnormalize_2d(dvel);
            let cn = vnormalize_2d(vcand);
            self.params.weight_side * vcross_2d(&dn, &cn).abs()
        };
        let tpen = self.params.weight_toi * (self.params.horiz_time - tmin) * self.inv_horiz_time;

        vpen + vcpen + side + tpen
    }
}

/// Clamps the XZ speed of a candidate to `vmax`.
fn clamp_speed(v: &[f32; 3], vmax: f32) -> [f32; 3] {
    let speed_sqr = sqr(v[0]) + sqr(v[2]);
    if speed_sqr > sqr(vmax) && speed_sqr > 0.0 {
        let s = vmax / speed_sqr.sqrt();
        [v[0] * s, 0.0, v[2] * s]
    } else {
        *v
    }
}

fn cross2(a: &[f32; 2], b: &[f32; 2]) -> f32 {
    a[0] * b[1] - a[1] * b[0]
}

/// Time until a point moving from the origin with velocity `dir` hits a
/// circle at `center` with radius `rad`. `None` when there is no
/// positive-time hit; `Some(0.0)` when already overlapping.
fn sweep_circle(dir: &[f32; 2], center: &[f32; 2], rad: f32) -> Option<f32> {
    let c = sqr(center[0]) + sqr(center[1]) - sqr(rad);
    if c < 0.0 {
        return Some(0.0);
    }

    let a = sqr(dir[0]) + sqr(dir[1]);
    if a < 0.0001 {
        // No relative motion; dividing here would spray NaN through scores.
        return None;
    }

    let b = -2.0 * (dir[0] * center[0] + dir[1] * center[1]);
    let discr = sqr(b) - 4.0 * a * c;
    if discr < 0.0 {
        return None;
    }

    let t = (-b - discr.sqrt()) / (2.0 * a);
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}

/// Time until a ray from the origin along `dir` crosses the segment
/// `p`..`q`. `dir` is a velocity, so the returned parameter is in seconds.
fn isect_ray_seg(dir: &[f32; 2], p: &[f32; 2], q: &[f32; 2]) -> Option<f32> {
    let v = [q[0] - p[0], q[1] - p[1]];
    let d = cross2(dir, &v);
    if d.abs() < 1e-6 {
        return None;
    }
    let t = cross2(p, &v) / d;
    let s = cross2(p, dir) / d;
    if t >= 0.0 && (0.0..=1.0).contains(&s) {
        Some(t)
    } else {
        None
    }
}

/// Whether a velocity points into a segment the origin is touching.
fn moving_into(p: &[f32; 2], q: &[f32; 2], v: &[f32; 2]) -> bool {
    let d = [q[0] - p[0], q[1] - p[1]];
    // Normal on the agent's side of the wall.
    let mut n = [-d[1], d[0]];
    let to_origin = [-p[0], -p[1]];
    if n[0] * to_origin[0] + n[1] * to_origin[1] < 0.0 {
        n = [-n[0], -n[1]];
    }
    v[0] * n[0] + v[1] * n[1] < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const POS: [f32; 3] = [0.0, 0.0, 0.0];
    const RAD: f32 = 0.5;
    const VMAX: f32 = 3.5;

    fn toi_against_segment(vel: &[f32; 3], p: &[f32; 3], q: &[f32; 3]) -> Option<f32> {
        isect_ray_seg(
            &[vel[0], vel[2]],
            &[p[0], p[2]],
            &[q[0], q[2]],
        )
    }

    #[test]
    fn empty_query_returns_desired_velocity() {
        let mut query = ObstacleAvoidanceQuery::new();
        let dvel = [2.0, 0.0, 1.0];
        let (nvel, ok) = query.sample_velocity_adaptive(
            &POS,
            RAD,
            VMAX,
            &[0.0; 3],
            &dvel,
            &ObstacleAvoidanceParams::default(),
        );
        assert!(ok);
        assert_eq!(nvel, dvel);
    }

    #[test]
    fn excess_obstacles_are_dropped() {
        let mut query = ObstacleAvoidanceQuery::new();
        for i in 0..MAX_OBSTACLE_CIRCLES + 8 {
            let x = i as f32;
            query.add_circle(&[x, 0.0, 5.0], 0.5, &[0.0; 3], &[0.0; 3]);
            query.add_segment(&[x, 0.0, 9.0], &[x + 1.0, 0.0, 9.0]);
        }
        assert_eq!(query.circle_count(), MAX_OBSTACLE_CIRCLES);
        assert_eq!(query.segment_count(), MAX_OBSTACLE_SEGMENTS);
    }

    #[test]
    fn head_on_agent_deflects_the_velocity() {
        let mut query = ObstacleAvoidanceQuery::new();
        // Another agent dead ahead, closing straight at us.
        query.add_circle(&[3.0, 0.0, 0.0], RAD, &[-2.0, 0.0, 0.0], &[-2.0, 0.0, 0.0]);
        let dvel = [VMAX, 0.0, 0.0];
        let (nvel, ok) = query.sample_velocity_adaptive(
            &POS,
            RAD,
            VMAX,
            &dvel,
            &dvel,
            &ObstacleAvoidanceParams::default(),
        );
        assert!(ok);
        // The chosen velocity must not close head-on at full speed.
        let vab = [nvel[0] + 2.0, nvel[2]];
        let dp = [3.0, 0.0];
        match sweep_circle(&vab, &dp, RAD * 2.0) {
            None => {}
            Some(t) => assert!(t > IMMINENT_TOI, "imminent collision at t={t}"),
        }
    }

    #[test]
    fn wall_dead_ahead_is_not_hit_imminently() {
        let mut query = ObstacleAvoidanceQuery::new();
        // Wall 0.02 ahead; driving into it at max speed would hit in ~6ms.
        let p = [0.02, 0.0, -2.0];
        let q = [0.02, 0.0, 2.0];
        query.add_segment(&p, &q);
        let dvel = [VMAX, 0.0, 0.0];
        let (nvel, ok) = query.sample_velocity_adaptive(
            &POS,
            RAD,
            VMAX,
            &[0.0; 3],
            &dvel,
            &ObstacleAvoidanceParams::default(),
        );
        assert!(ok);
        match toi_against_segment(&nvel, &p, &q) {
            None => {}
            Some(t) => assert!(t > IMMINENT_TOI, "sampled velocity hits the wall at t={t}"),
        }
    }

    #[test]
    fn overlapping_obstacle_rejects_every_candidate() {
        let mut query = ObstacleAvoidanceQuery::new();
        query.add_circle(&[0.1, 0.0, 0.0], RAD, &[0.0; 3], &[0.0; 3]);
        let (nvel, ok) = query.sample_velocity_adaptive(
            &POS,
            RAD,
            VMAX,
            &[0.0; 3],
            &[1.0, 0.0, 0.0],
            &ObstacleAvoidanceParams::default(),
        );
        assert!(!ok);
        assert_eq!(nvel, [0.0; 3]);
    }

    #[test]
    fn sampling_is_deterministic() {
        let run = || {
            let mut query = ObstacleAvoidanceQuery::new();
            query.add_circle(&[2.0, 0.0, 0.5], 0.6, &[-1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
            query.add_circle(&[1.5, 0.0, -1.0], 0.4, &[0.0, 0.0, 1.0], &[0.0, 0.0, 1.0]);
            query.add_segment(&[4.0, 0.0, -3.0], &[4.0, 0.0, 3.0]);
            query.sample_velocity_adaptive(
                &POS,
                RAD,
                VMAX,
                &[1.0, 0.0, 0.2],
                &[2.5, 0.0, 0.0],
                &ObstacleAvoidanceParams::default(),
            )
        };
        let (a, _) = run();
        let (b, _) = run();
        assert_eq!(a, b);
    }

    #[test]
    fn result_never_exceeds_max_speed() {
        let mut query = ObstacleAvoidanceQuery::new();
        query.add_circle(&[2.0, 0.0, 0.0], RAD, &[0.0; 3], &[0.0; 3]);
        let dvel = [VMAX * 2.0, 0.0, 0.0];
        let (nvel, _) = query.sample_velocity_adaptive(
            &POS,
            RAD,
            VMAX,
            &[0.0; 3],
            &dvel,
            &ObstacleAvoidanceParams::default(),
        );
        let speed = (sqr(nvel[0]) + sqr(nvel[2])).sqrt();
        assert!(speed <= VMAX + 1e-4);
    }

    #[test]
    fn sweep_detects_overlap_as_time_zero() {
        assert_eq!(sweep_circle(&[1.0, 0.0], &[0.2, 0.0], 0.5), Some(0.0));
    }

    #[test]
    fn sweep_ignores_receding_obstacles() {
        assert_eq!(sweep_circle(&[-1.0, 0.0], &[5.0, 0.0], 0.5), None);
    }

    #[test]
    fn sweep_guards_zero_relative_velocity() {
        assert_eq!(sweep_circle(&[0.0, 0.0], &[5.0, 0.0], 0.5), None);
    }

    #[test]
    fn ray_seg_hits_crossing_wall() {
        let t = isect_ray_seg(&[2.0, 0.0], &[4.0, -1.0], &[4.0, 1.0]).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn ray_seg_misses_short_wall() {
        assert!(isect_ray_seg(&[2.0, 0.0], &[4.0, 1.0], &[4.0, 3.0]).is_none());
    }
}
