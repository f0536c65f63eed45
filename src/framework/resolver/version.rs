//! Capability versions and version ranges

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::framework::traits::FrameworkError;

/// `major.minor.micro[.qualifier]`
///
/// Missing components default to zero; an empty qualifier sorts before any
/// non-empty one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Version::default());
        }

        let mut parts = s.splitn(4, '.');
        let mut numeric = [0u32; 3];
        for slot in numeric.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse().map_err(|_| {
                        FrameworkError::InvalidMetadata(format!("Invalid version: {}", s))
                    })?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default().to_string();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FrameworkError::InvalidMetadata(format!(
                "Invalid version qualifier: {}",
                s
            )));
        }

        Ok(Version {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = FrameworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// Interval of acceptable versions
///
/// Accepts `[1.0,2.0)`, `(1,2]` and a bare `1.0` (meaning "at least 1.0").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    pub floor: Version,
    pub floor_inclusive: bool,
    pub ceiling: Option<Version>,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    /// Every version
    pub fn any() -> Self {
        Self::at_least(Version::default())
    }

    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    /// `[floor, ceiling)`
    pub fn half_open(floor: Version, ceiling: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: Some(ceiling),
            ceiling_inclusive: false,
        }
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ceiling) => version < ceiling,
        };
        above_floor && below_ceiling
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionRange {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || FrameworkError::InvalidMetadata(format!("Invalid version range: {}", s));

        let first = match s.chars().next() {
            Some(c) => c,
            None => return Ok(VersionRange::any()),
        };
        if first != '[' && first != '(' {
            return Ok(VersionRange::at_least(s.parse()?));
        }

        let last = s.chars().last().ok_or_else(invalid)?;
        if (last != ']' && last != ')') || s.len() < 2 {
            return Err(invalid());
        }

        let body = &s[1..s.len() - 1];
        let (floor, ceiling) = body.split_once(',').ok_or_else(invalid)?;
        let floor: Version = floor.parse()?;
        let ceiling: Version = ceiling.parse()?;
        if ceiling < floor {
            return Err(invalid());
        }

        Ok(VersionRange {
            floor,
            floor_inclusive: first == '[',
            ceiling: Some(ceiling),
            ceiling_inclusive: last == ']',
        })
    }
}

impl TryFrom<String> for VersionRange {
    type Error = FrameworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v: Version = "1.2.3.beta".parse().unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.micro, 3);
        assert_eq!(v.qualifier, "beta");

        let short: Version = "2".parse().unwrap();
        assert_eq!(short, Version::new(2, 0, 0));

        assert!("1.x".parse::<Version>().is_err());
        assert!("1.0.0.bad qualifier".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let a: Version = "1.0.0".parse().unwrap();
        let b: Version = "1.0.0.rc1".parse().unwrap();
        let c: Version = "1.1".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_range_bounds() {
        let range: VersionRange = "[1.0,2.0)".parse().unwrap();
        assert!(range.includes(&Version::new(1, 0, 0)));
        assert!(range.includes(&Version::new(1, 9, 9)));
        assert!(!range.includes(&Version::new(2, 0, 0)));
        assert!(!range.includes(&Version::new(0, 9, 0)));

        let exclusive: VersionRange = "(1,2]".parse().unwrap();
        assert!(!exclusive.includes(&Version::new(1, 0, 0)));
        assert!(exclusive.includes(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_bare_range_is_at_least() {
        let range: VersionRange = "1.5".parse().unwrap();
        assert!(range.includes(&Version::new(7, 0, 0)));
        assert!(!range.includes(&Version::new(1, 4, 0)));
        assert_eq!(range.to_string(), "1.5.0");
    }

    #[test]
    fn test_invalid_ranges() {
        assert!("[2.0,1.0)".parse::<VersionRange>().is_err());
        assert!("[1.0".parse::<VersionRange>().is_err());
        assert!("[1.0;2.0]".parse::<VersionRange>().is_err());
    }
}
