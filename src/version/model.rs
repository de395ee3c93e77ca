use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{HostError, HostResult};

/// A three-part component version with optional pre-release and build tags.
///
/// Supported formats:
///   `major.minor`
///   `major.minor.patch`
///   `major.minor.patch-preRelease`
///   `major.minor.patch-preRelease+build`
///   `major.minor.patch+build`
#[derive(Debug, Clone, Default)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release tag without the leading `-`. Empty for release versions.
    pub pre_release: String,
    /// Build metadata without the leading `+`. Ignored by ordering and equality.
    pub build: String,
}

impl HostVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: String::new(),
            build: String::new(),
        }
    }

    /// Parse a version literal. At least `major.minor` is required; a
    /// missing patch defaults to 0.
    ///
    /// # Examples
    /// ```
    /// use corehost::version::HostVersion;
    /// let v = HostVersion::parse("6.0.5").unwrap();
    /// assert_eq!((v.major, v.minor, v.patch), (6, 0, 5));
    /// ```
    pub fn parse(text: &str) -> HostResult<Self> {
        let text = text.trim();

        // Split off +build first, then -preRelease.
        let (core, build) = match text.find('+') {
            Some(idx) => (&text[..idx], &text[idx + 1..]),
            None => (text, ""),
        };
        let (numeric, pre_release) = match core.find('-') {
            Some(idx) => (&core[..idx], &core[idx + 1..]),
            None => (core, ""),
        };

        let mut parts = numeric.split('.');
        let major = Self::parse_part(parts.next(), text)?;
        let minor = Self::parse_part(parts.next(), text)?;
        let patch = match parts.next() {
            Some(raw) => Self::parse_part(Some(raw), text)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(HostError::InvalidArgument(format!(
                "invalid version literal '{text}': too many numeric parts"
            )));
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre_release: pre_release.to_string(),
            build: build.to_string(),
        })
    }

    fn parse_part(raw: Option<&str>, literal: &str) -> HostResult<u32> {
        raw.filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                HostError::InvalidArgument(format!("invalid version literal '{literal}'"))
            })
    }

    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// True when `major.minor.patch` match, ignoring tags.
    pub fn same_patch_level(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

// Ordering: major, minor, patch, then a pre-release tag sorts strictly
// below the untagged release of the same triple. Build is never compared.
impl Ord for HostVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre_release.is_empty(), other.pre_release.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre_release.cmp(&other.pre_release),
            })
    }
}

impl PartialOrd for HostVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HostVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HostVersion {}

impl Hash for HostVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre_release.hash(state);
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_version() {
        let v = HostVersion::parse("6.0.5").unwrap();
        assert_eq!(v.major, 6);
        assert_eq!(v.minor, 0);
        assert_eq!(v.patch, 5);
        assert!(!v.is_pre_release());
    }

    #[test]
    fn parse_two_parts_defaults_patch() {
        let v = HostVersion::parse("6.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (6, 1, 0));
    }

    #[test]
    fn parse_pre_release_and_build() {
        let v = HostVersion::parse("7.0.0-preview.3+build.42").unwrap();
        assert_eq!(v.pre_release, "preview.3");
        assert_eq!(v.build, "build.42");
        assert!(v.is_pre_release());
    }

    #[test]
    fn parse_rejects_single_part() {
        assert!(HostVersion::parse("6").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HostVersion::parse("six.zero").is_err());
        assert!(HostVersion::parse("6.0.0.0").is_err());
        assert!(HostVersion::parse("").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let a = HostVersion::parse("5.9.9").unwrap();
        let b = HostVersion::parse("6.0.0").unwrap();
        let c = HostVersion::parse("6.0.10").unwrap();
        let d = HostVersion::parse("6.1.0").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn pre_release_sorts_below_release() {
        let pre = HostVersion::parse("6.0.0-rc.1").unwrap();
        let rel = HostVersion::parse("6.0.0").unwrap();
        assert!(pre < rel);
        assert!(rel > pre);
    }

    #[test]
    fn pre_release_tags_compare_lexicographically() {
        let a = HostVersion::parse("6.0.0-alpha").unwrap();
        let b = HostVersion::parse("6.0.0-beta").unwrap();
        assert!(a < b);
    }

    #[test]
    fn build_ignored_by_equality() {
        let a = HostVersion::parse("6.0.0+abc").unwrap();
        let b = HostVersion::parse("6.0.0+def").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn display_round_trip() {
        for literal in ["6.0.5", "7.0.0-preview.3", "1.2.3-rc.1+99"] {
            let v = HostVersion::parse(literal).unwrap();
            assert_eq!(v.to_string(), literal);
        }
    }
}
