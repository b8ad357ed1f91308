//! Polygon filtering for navigation queries.

/// Reusable include/exclude mask applied to polygon flags during queries.
///
/// A polygon passes when it carries at least one included flag and no
/// excluded flag. The default filter passes every flagged polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryFilter {
    pub include_flags: u16,
    pub exclude_flags: u16,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: 0xffff,
            exclude_flags: 0,
        }
    }
}

impl QueryFilter {
    pub fn passes(&self, flags: u16) -> bool {
        (flags & self.include_flags) != 0 && (flags & self.exclude_flags) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_passes_any_flagged_poly() {
        let filter = QueryFilter::default();
        assert!(filter.passes(0x01));
        assert!(filter.passes(0x80));
        assert!(!filter.passes(0));
    }

    #[test]
    fn excluded_flags_reject() {
        let filter = QueryFilter {
            include_flags: 0xffff,
            exclude_flags: 0x02,
        };
        assert!(filter.passes(0x01));
        assert!(!filter.passes(0x03));
    }
}
