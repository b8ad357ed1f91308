//! Multi-agent crowd simulation on navigation surfaces
//!
//! This crate moves many autonomous agents across a shared walkable surface
//! each simulation tick, resolving path following, inter-agent avoidance,
//! and separation so that agents neither cross walls nor pile into each
//! other. The navigation layer itself is abstract: anything implementing
//! [`stampede_nav::NavQuery`] can back a crowd.
//!
//! # Example
//!
//! ```rust
//! use stampede_crowd::{AgentParams, Crowd};
//! use stampede_nav::PlanarSurface;
//!
//! // A 20 x 20 unit surface and room for four agents.
//! let mut crowd = Crowd::new(PlanarSurface::new(20, 20, 1.0), 4);
//!
//! let agent = crowd.add_agent([0.5, 0.0, 0.5], AgentParams::default()).unwrap();
//! assert!(crowd.request_move_position(agent, [10.0, 0.0, 10.0]));
//!
//! // Step the simulation at 10 Hz.
//! for _ in 0..200 {
//!     crowd.update(0.1);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Crowd`]: the manager — fixed agent pool and the six-phase tick
//! - [`CrowdAgent`]: per-agent state, one slot of the pool
//! - [`PathCorridor`]: the rolling polygon window an agent follows
//! - [`ObstacleAvoidanceQuery`]: velocity-obstacle sampling
//! - [`AgentParams`] / [`ObstacleAvoidanceParams`]: configuration

pub mod agent;
pub mod crowd;
pub mod obstacle_avoidance;
pub mod params;
pub mod path_corridor;

pub use agent::{AgentState, CrowdAgent, MoveRequestState, Neighbor, MAX_NEIGHBORS};
pub use crowd::Crowd;
pub use obstacle_avoidance::{
    ObstacleAvoidanceQuery, ObstacleCircle, ObstacleSegment, MAX_OBSTACLE_CIRCLES,
    MAX_OBSTACLE_SEGMENTS,
};
pub use params::{AgentParams, ObstacleAvoidanceParams, UpdateFlags};
pub use path_corridor::PathCorridor;
