//! Navigation surface contract for the stampede crowd simulation.
//!
//! The crowd core never inspects surface geometry directly; it talks to a
//! [`NavQuery`] implementation through three operations (nearest polygon,
//! path between polygons, constrained movement along the surface) and
//! re-validates polygon handles before trusting them. This crate defines
//! that contract plus [`PlanarSurface`], a rectangular grid backend used by
//! tests and benchmarks.

mod filter;
mod planar;
mod query;

pub use filter::QueryFilter;
pub use planar::PlanarSurface;
pub use query::{NavPath, NavQuery};

/// Opaque reference to a polygon on a navigation surface.
///
/// Zero is the explicit "no polygon" sentinel; handles are never dangling,
/// only valid or `NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyRef(u64);

impl PolyRef {
    /// The invalid sentinel reference.
    pub const NONE: PolyRef = PolyRef(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Polygon flag set on every walkable cell of the planar backend.
pub const POLY_FLAG_WALK: u16 = 0x01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poly_ref_is_the_sentinel() {
        assert_eq!(PolyRef::default(), PolyRef::NONE);
        assert!(!PolyRef::NONE.is_valid());
        assert!(PolyRef::new(7).is_valid());
    }
}
