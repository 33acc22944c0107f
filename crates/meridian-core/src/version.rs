//! Semantic and date-based versions with constraint evaluation.

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::{debug, warn};

/// Strategy applied before comparing two versions against a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareStrategy {
    /// Compare the full version including prerelease.
    #[default]
    Strict,
    /// Ignore prerelease information on both sides.
    IgnorePrerelease,
    /// Compare only major and minor; patch is zeroed on both sides.
    OnlyMajorMinor,
}

/// A semantic version: `major.minor.patch[-prerelease][+build]`.
///
/// Ordering is lexicographic on `(major, minor, patch)`; a version without a
/// prerelease sorts after any prerelease of the same triple; prereleases
/// compare lexicographically. Build metadata never affects ordering or
/// equality.
#[derive(Debug, Clone, Default)]
pub struct Version {
    /// Major version number.
    pub major: u64,
    /// Minor version number.
    pub minor: u64,
    /// Patch version number.
    pub patch: u64,
    /// Prerelease tag (e.g. `alpha`, `rc.1`); empty when absent.
    pub prerelease: String,
    /// Build metadata; empty when absent. Ignored by comparisons.
    pub build: String,
}

impl Version {
    /// Create a plain release version.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: String::new(),
            build: String::new(),
        }
    }

    /// Create a version with prerelease and build fields.
    #[must_use]
    pub fn with_tags(
        major: u64,
        minor: u64,
        patch: u64,
        prerelease: impl Into<String>,
        build: impl Into<String>,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: prerelease.into(),
            build: build.into(),
        }
    }

    /// Parse a version string.
    ///
    /// Requires two dots before any `-` or `+`; each numeric field must be a
    /// non-negative integer; the empty string is rejected.
    ///
    /// # Errors
    /// Returns [`Error::InvalidVersion`] with the offending substring.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::invalid(input));
        }

        let first_dot = input.find('.').ok_or_else(|| Error::invalid(input))?;
        let major = parse_field(&input[..first_dot])?;

        let rest = &input[first_dot + 1..];
        let second_dot = rest.find('.').ok_or_else(|| Error::invalid(input))?;
        let minor = parse_field(&rest[..second_dot])?;

        let tail = &rest[second_dot + 1..];
        let dash = tail.find('-');
        let plus = tail.find('+');
        let patch_end = match (dash, plus) {
            (Some(d), Some(p)) => d.min(p),
            (Some(d), None) => d,
            (None, Some(p)) => p,
            (None, None) => tail.len(),
        };
        let patch = parse_field(&tail[..patch_end])?;

        let mut prerelease = String::new();
        let mut build = String::new();
        if let Some(d) = dash {
            // A '+' before the '-' makes the dash part of the build metadata.
            if plus.map_or(true, |p| p > d) {
                let end = plus.unwrap_or(tail.len());
                prerelease = tail[d + 1..end].to_string();
            }
        }
        if let Some(p) = plus {
            build = tail[p + 1..].to_string();
        }

        debug!(major, minor, patch, %prerelease, %build, "parsed version");
        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Render as `major.minor`.
    #[must_use]
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Whether this is a prerelease version.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Whether this version carries build metadata.
    #[must_use]
    pub fn has_build_metadata(&self) -> bool {
        !self.build.is_empty()
    }

    /// Same-API compatibility: same major, and at least this minor/patch.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        if self.major != other.major {
            return false;
        }
        if self.minor < other.minor {
            return true;
        }
        self.minor == other.minor && self.patch <= other.patch
    }

    /// Inclusive range check on both ends.
    #[must_use]
    pub fn satisfies_range(&self, min: &Self, max: &Self) -> bool {
        self >= min && self <= max
    }

    /// Copy of this version with fields stripped per the strategy.
    fn normalized(&self, strategy: CompareStrategy) -> Self {
        match strategy {
            CompareStrategy::Strict => self.clone(),
            CompareStrategy::IgnorePrerelease => Self::new(self.major, self.minor, self.patch),
            CompareStrategy::OnlyMajorMinor => Self::new(self.major, self.minor, 0),
        }
    }
}

fn parse_field(s: &str) -> Result<u64> {
    s.parse::<u64>().map_err(|_| Error::invalid(s))
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && self.prerelease == other.prerelease
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| {
                match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                    (true, true) => Ordering::Equal,
                    // A release sorts after any prerelease of the same triple.
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.prerelease.cmp(&other.prerelease),
                }
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// A date-based version, ordered on `(year, month, day)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateVersion {
    /// Year.
    pub year: i32,
    /// Month, 1 to 12.
    pub month: u32,
    /// Day, 1 to 31.
    pub day: u32,
}

impl DateVersion {
    /// Create a date version. Field ranges are not checked here; use
    /// [`DateVersion::parse`] for validated construction.
    #[must_use]
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Parse a `YYYY-MM-DD` string, validating month and day ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidVersion`] on malformed input or out-of-range
    /// fields.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::invalid(input));
        }

        let first = input.find('-').ok_or_else(|| Error::invalid(input))?;
        let year = input[..first]
            .parse::<i32>()
            .map_err(|_| Error::invalid(&input[..first]))?;

        let rest = &input[first + 1..];
        let second = rest.find('-').ok_or_else(|| Error::invalid(input))?;
        let month = rest[..second]
            .parse::<u32>()
            .map_err(|_| Error::invalid(&rest[..second]))?;
        let day = rest[second + 1..]
            .parse::<u32>()
            .map_err(|_| Error::invalid(&rest[second + 1..]))?;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(Error::invalid(input));
        }

        Ok(Self { year, month, day })
    }
}

impl fmt::Display for DateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Known constraint operators, longest first so `>=`/`<=` win over `>`/`<`.
const OPERATORS: [&str; 7] = [">=", "<=", "^", "~", ">", "<", "="];

fn split_constraint(constraint: &str) -> (&str, &str) {
    for op in OPERATORS {
        if let Some(rest) = constraint.strip_prefix(op) {
            return (op, rest);
        }
    }
    ("", constraint)
}

/// Evaluate a constraint string against an actual version.
///
/// The constraint is `<op><version>` with op one of `^ ~ > < >= <= =` or
/// absent (equality). An empty constraint matches anything. The strategy
/// strips ignored fields from both sides before comparison.
///
/// # Errors
/// Returns [`Error::InvalidVersion`] when the constraint's version part does
/// not parse.
pub fn check_version(
    actual: &Version,
    constraint: &str,
    strategy: CompareStrategy,
) -> Result<bool> {
    if constraint.is_empty() {
        warn!("empty version constraint, assuming match");
        return Ok(true);
    }

    let (op, version_part) = split_constraint(constraint);
    let required = Version::parse(version_part)?;

    let actual = actual.normalized(strategy);
    let required = required.normalized(strategy);

    let result = match op {
        "^" => actual.major == required.major && actual >= required,
        "~" => {
            actual.major == required.major
                && actual.minor == required.minor
                && actual >= required
        }
        ">" => actual > required,
        "<" => actual < required,
        ">=" => actual >= required,
        "<=" => actual <= required,
        _ => actual == required,
    };

    debug!(actual = %actual, op, required = %required, result, "version check");
    Ok(result)
}

/// Evaluate a date constraint (`> < >= <= =`) against an actual date version.
///
/// An empty constraint matches anything; a missing operator means equality.
///
/// # Errors
/// Returns [`Error::InvalidVersion`] when the date part does not parse.
pub fn check_date_version(actual: &DateVersion, constraint: &str) -> Result<bool> {
    if constraint.is_empty() {
        warn!("empty date constraint, assuming match");
        return Ok(true);
    }

    let (op, date_part) = split_constraint(constraint);
    let required = DateVersion::parse(date_part)?;

    let result = match op {
        ">" => *actual > required,
        "<" => *actual < required,
        ">=" => *actual >= required,
        "<=" => *actual <= required,
        "=" | "" => *actual == required,
        _ => return Err(Error::invalid(constraint)),
    };
    Ok(result)
}
