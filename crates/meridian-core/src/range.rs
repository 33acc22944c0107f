//! Version ranges with per-endpoint inclusivity.

use crate::error::{Error, Result};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A range of versions bounded by `min` and `max`.
///
/// Rendered and parsed in interval notation: `[` / `]` for inclusive
/// endpoints, `(` / `)` for exclusive ones, e.g. `[1.0.0, 2.0.0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// Minimum version in the range.
    pub min: Version,
    /// Maximum version in the range.
    pub max: Version,
    /// Whether `min` itself is inside the range.
    pub include_min: bool,
    /// Whether `max` itself is inside the range.
    pub include_max: bool,
}

impl VersionRange {
    /// Create a range with explicit endpoint inclusivity.
    #[must_use]
    pub fn new(min: Version, max: Version, include_min: bool, include_max: bool) -> Self {
        Self {
            min,
            max,
            include_min,
            include_max,
        }
    }

    /// Open-ended range starting at `min`: `[min, 999.999.999)`.
    #[must_use]
    pub fn from(min: Version) -> Self {
        Self::new(min, Version::new(999, 999, 999), true, false)
    }

    /// Range from the origin up to `max`: `[0.0.0, max]`.
    #[must_use]
    pub fn up_to(max: Version) -> Self {
        Self::new(Version::new(0, 0, 0), max, true, true)
    }

    /// Parse interval notation, e.g. `[1.0.0,2.0.0]` or `(1.0.0, 2.0.0)`.
    ///
    /// The first and last characters determine inclusivity; the comma
    /// separates the endpoints; both endpoints must parse as versions.
    ///
    /// # Errors
    /// Returns [`Error::InvalidVersion`] on malformed input.
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() < 3 {
            return Err(Error::invalid(input));
        }

        let comma = input.find(',').ok_or_else(|| Error::invalid(input))?;
        let include_min = input.starts_with('[');
        let include_max = input.ends_with(']');

        let min_str = input[1..comma].trim();
        let max_str = input[comma + 1..input.len() - 1].trim();

        Ok(Self {
            min: Version::parse(min_str)?,
            max: Version::parse(max_str)?,
            include_min,
            include_max,
        })
    }

    /// Whether `version` lies inside the range.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let after_min = if self.include_min {
            version >= &self.min
        } else {
            version > &self.min
        };
        let before_max = if self.include_max {
            version <= &self.max
        } else {
            version < &self.max
        };
        after_min && before_max
    }

    /// Whether two ranges share at least one version.
    ///
    /// Ranges touching at a single endpoint overlap only when both adjacent
    /// endpoints are inclusive.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.max < other.min || other.max < self.min {
            return false;
        }
        if self.max == other.min {
            return self.include_max && other.include_min;
        }
        if self.min == other.max {
            return self.include_min && other.include_max;
        }
        true
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}.{}.{}, {}.{}.{}{}",
            if self.include_min { "[" } else { "(" },
            self.min.major,
            self.min.minor,
            self.min.patch,
            self.max.major,
            self.max.minor,
            self.max.patch,
            if self.include_max { "]" } else { ")" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inclusive() {
        let range = VersionRange::parse("[1.0.0,2.0.0]").unwrap();
        assert!(range.include_min);
        assert!(range.include_max);
        assert!(range.contains(&Version::new(1, 5, 0)));
        assert!(range.contains(&Version::new(1, 0, 0)));
        assert!(range.contains(&Version::new(2, 0, 0)));
        assert!(!range.contains(&Version::new(2, 1, 0)));
    }

    #[test]
    fn parse_exclusive_and_mixed() {
        let open = VersionRange::parse("(1.0.0,2.0.0)").unwrap();
        assert!(!open.contains(&Version::new(1, 0, 0)));
        assert!(!open.contains(&Version::new(2, 0, 0)));
        assert!(open.contains(&Version::new(1, 99, 0)));

        let mixed = VersionRange::parse("[1.0.0, 2.0.0)").unwrap();
        assert!(mixed.contains(&Version::new(1, 0, 0)));
        assert!(!mixed.contains(&Version::new(2, 0, 0)));
    }

    #[test]
    fn parse_rejects_malformed() {
        for input in ["", "[]", "[1.0.0]", "[x,y]", "[1.0.0 2.0.0]"] {
            assert!(VersionRange::parse(input).is_err(), "should reject {input:?}");
        }
    }

    #[test]
    fn display_round_trip() {
        let range = VersionRange::parse("[1.2.3,4.5.6)").unwrap();
        assert_eq!(range.to_string(), "[1.2.3, 4.5.6)");
        let back = VersionRange::parse(&range.to_string()).unwrap();
        assert_eq!(range, back);
    }

    #[test]
    fn from_and_up_to() {
        let from = VersionRange::from(Version::new(1, 0, 0));
        assert!(from.contains(&Version::new(1, 0, 0)));
        assert!(from.contains(&Version::new(500, 0, 0)));
        assert!(!from.contains(&Version::new(0, 9, 9)));

        let up_to = VersionRange::up_to(Version::new(2, 0, 0));
        assert!(up_to.contains(&Version::new(0, 0, 0)));
        assert!(up_to.contains(&Version::new(2, 0, 0)));
        assert!(!up_to.contains(&Version::new(2, 0, 1)));
    }

    #[test]
    fn overlap_rules() {
        let a = VersionRange::parse("[1.0.0,2.0.0]").unwrap();
        let b = VersionRange::parse("[1.5.0,3.0.0]").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        let c = VersionRange::parse("[3.0.0,4.0.0]").unwrap();
        assert!(!a.overlaps(&c));

        // Touching endpoints: overlap only when both sides are inclusive.
        let touch_inclusive = VersionRange::parse("[2.0.0,3.0.0]").unwrap();
        assert!(a.overlaps(&touch_inclusive));
        let touch_exclusive = VersionRange::parse("(2.0.0,3.0.0]").unwrap();
        assert!(!a.overlaps(&touch_exclusive));
        let half_open = VersionRange::parse("[1.0.0,2.0.0)").unwrap();
        assert!(!half_open.overlaps(&touch_inclusive));
    }
}
