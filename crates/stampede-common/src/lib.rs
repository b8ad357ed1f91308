//! Common utilities shared by the stampede navigation and crowd crates.

mod math;

pub use math::*;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("position is outside the navigable surface")]
    OutsideSurface,

    #[error("no path between the requested polygons")]
    PathNotFound,

    #[error("polygon reference is not valid")]
    InvalidRef,

    #[error("corridor has no polygons")]
    EmptyCorridor,

    #[error("navigation query failed: {0}")]
    Query(String),
}

/// Result type for stampede operations
pub type Result<T> = std::result::Result<T, Error>;
