//! Agent and avoidance configuration.

/// Default radius of an agent
pub const DEFAULT_AGENT_RADIUS: f32 = 0.6;

/// Default height of an agent
pub const DEFAULT_AGENT_HEIGHT: f32 = 2.0;

/// Default max acceleration of an agent
pub const DEFAULT_AGENT_MAX_ACCELERATION: f32 = 8.0;

/// Default max speed of an agent
pub const DEFAULT_AGENT_MAX_SPEED: f32 = 3.5;

/// Per-agent behavior toggles.
///
/// Stored as a bitset so a parameter block stays `Copy`; use the named
/// predicates rather than testing raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateFlags(pub u8);

impl UpdateFlags {
    pub const ANTICIPATE_TURNS: UpdateFlags = UpdateFlags(1);
    pub const OBSTACLE_AVOIDANCE: UpdateFlags = UpdateFlags(2);
    pub const SEPARATION: UpdateFlags = UpdateFlags(4);
    pub const OPTIMIZE_VISIBILITY: UpdateFlags = UpdateFlags(8);
    pub const OPTIMIZE_TOPOLOGY: UpdateFlags = UpdateFlags(16);

    pub const NONE: UpdateFlags = UpdateFlags(0);

    pub fn contains(&self, other: UpdateFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn anticipate_turns(&self) -> bool {
        self.contains(Self::ANTICIPATE_TURNS)
    }

    pub fn obstacle_avoidance(&self) -> bool {
        self.contains(Self::OBSTACLE_AVOIDANCE)
    }

    pub fn separation(&self) -> bool {
        self.contains(Self::SEPARATION)
    }

    pub fn optimize_visibility(&self) -> bool {
        self.contains(Self::OPTIMIZE_VISIBILITY)
    }

    pub fn optimize_topology(&self) -> bool {
        self.contains(Self::OPTIMIZE_TOPOLOGY)
    }
}

impl std::ops::BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

impl Default for UpdateFlags {
    fn default() -> Self {
        Self::ANTICIPATE_TURNS | Self::OBSTACLE_AVOIDANCE | Self::SEPARATION
    }
}

/// Agent configuration, set at spawn and rarely mutated afterwards.
///
/// All distances and speeds must be non-negative. `avoidance_quality` is
/// clamped to `0..=3` when it indexes the avoidance presets.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentParams {
    /// Radius of the agent
    pub radius: f32,
    /// Height of the agent
    pub height: f32,
    /// Maximum acceleration of the agent
    pub max_acceleration: f32,
    /// Maximum speed of the agent
    pub max_speed: f32,
    /// Range within which other agents are considered for steering
    pub collision_query_range: f32,
    /// Range within which corridor shortcuts may be taken
    pub path_optimization_range: f32,
    /// Strength of the separation push between overlapping agents
    pub separation_weight: f32,
    /// Avoidance sampling quality level, 0 (cheapest) to 3 (deepest)
    pub avoidance_quality: u8,
    /// Behavior toggles for the update loop
    pub update_flags: UpdateFlags,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            radius: DEFAULT_AGENT_RADIUS,
            height: DEFAULT_AGENT_HEIGHT,
            max_acceleration: DEFAULT_AGENT_MAX_ACCELERATION,
            max_speed: DEFAULT_AGENT_MAX_SPEED,
            collision_query_range: 12.0,
            path_optimization_range: 30.0,
            separation_weight: 2.0,
            avoidance_quality: 3,
            update_flags: UpdateFlags::default(),
        }
    }
}

/// Weights and sampling shape for one avoidance quality level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObstacleAvoidanceParams {
    /// Fraction of max speed reserved around the desired velocity when the
    /// sampling pattern is seeded
    pub vel_bias: f32,
    /// Weight for distance to the desired velocity
    pub weight_des_vel: f32,
    /// Weight for distance to the current velocity
    pub weight_cur_vel: f32,
    /// Weight for sideways deviation from the desired direction
    pub weight_side: f32,
    /// Weight for time-of-impact urgency
    pub weight_toi: f32,
    /// Collision time horizon in seconds
    pub horiz_time: f32,
    /// Angular divisions per sampling ring
    pub adaptive_divs: u8,
    /// Concentric rings per refinement round
    pub adaptive_rings: u8,
    /// Refinement rounds; the sampling radius halves each round
    pub adaptive_depth: u8,
}

impl Default for ObstacleAvoidanceParams {
    fn default() -> Self {
        Self {
            vel_bias: 0.4,
            weight_des_vel: 2.0,
            weight_cur_vel: 0.75,
            weight_side: 0.75,
            weight_toi: 2.5,
            horiz_time: 2.5,
            adaptive_divs: 7,
            adaptive_rings: 2,
            adaptive_depth: 5,
        }
    }
}

impl ObstacleAvoidanceParams {
    /// The four presets indexed by agent quality level. Levels 0-1 are the
    /// shallow variants, 2-3 the medium ones with the last sampling deepest.
    pub fn presets() -> [ObstacleAvoidanceParams; 4] {
        let base = ObstacleAvoidanceParams::default();
        [
            ObstacleAvoidanceParams {
                adaptive_divs: 5,
                adaptive_rings: 2,
                adaptive_depth: 1,
                ..base
            },
            ObstacleAvoidanceParams {
                adaptive_divs: 5,
                adaptive_rings: 2,
                adaptive_depth: 2,
                ..base
            },
            ObstacleAvoidanceParams {
                adaptive_divs: 7,
                adaptive_rings: 2,
                adaptive_depth: 3,
                ..base
            },
            ObstacleAvoidanceParams {
                adaptive_divs: 7,
                adaptive_rings: 3,
                adaptive_depth: 5,
                ..base
            },
        ]
    }
}
