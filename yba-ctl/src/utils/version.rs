//! Version comparison for upgrade gating.
//!
//! Versions look like `2.17.1.0` or `2.17.1.0-b123`: dotted numeric segments with an
//! optional build suffix. Anything the parser cannot read is an error, never a silent
//! "not less than".

use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("malformed version '{0}'")]
    Malformed(String),
    #[error("versions '{0}' and '{1}' have a different number of segments")]
    SegmentCountMismatch(String, String),
    #[error("build suffixes of '{0}' and '{1}' cannot be compared")]
    IncomparableBuilds(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Build {
    None,
    Number(u64),
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
    build: Build,
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)*)(?:-(?:b(\d+)|([A-Za-z0-9_]+)))?$")
            .expect("static version regex is valid")
    })
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let caps = version_re()
            .captures(s)
            .ok_or_else(|| VersionError::Malformed(s.to_string()))?;

        let mut segments = Vec::new();
        for seg in caps[1].split('.') {
            let n: u64 = seg
                .parse()
                .map_err(|_| VersionError::Malformed(s.to_string()))?;
            segments.push(n);
        }

        let build = if let Some(num) = caps.get(2) {
            Build::Number(
                num.as_str()
                    .parse()
                    .map_err(|_| VersionError::Malformed(s.to_string()))?,
            )
        } else if let Some(tag) = caps.get(3) {
            Build::Tag(tag.as_str().to_string())
        } else {
            Build::None
        };

        Ok(Version {
            raw: s.to_string(),
            segments,
            build,
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    pub fn compare(&self, other: &Version) -> Result<Ordering, VersionError> {
        if self.segments.len() != other.segments.len() {
            return Err(VersionError::SegmentCountMismatch(
                self.raw.clone(),
                other.raw.clone(),
            ));
        }
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return Ok(ord),
            }
        }
        match (&self.build, &other.build) {
            (Build::None, Build::None) => Ok(Ordering::Equal),
            (Build::None, _) => Ok(Ordering::Less),
            (_, Build::None) => Ok(Ordering::Greater),
            (Build::Number(a), Build::Number(b)) => Ok(a.cmp(b)),
            (Build::Tag(a), Build::Tag(b)) if a == b => Ok(Ordering::Equal),
            _ => Err(VersionError::IncomparableBuilds(
                self.raw.clone(),
                other.raw.clone(),
            )),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Version::parse(a)?.compare(&Version::parse(b)?)
}

/// True iff `a` is strictly older than `b`.
pub fn less_versions(a: &str, b: &str) -> Result<bool, VersionError> {
    Ok(compare_versions(a, b)? == Ordering::Less)
}

/// `version_metadata.json` shipped with every platform bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMetadata {
    pub version_number: String,
    #[serde(default)]
    pub build_number: String,
}

impl VersionMetadata {
    /// `2.17.1.0` + `123` -> `2.17.1.0-b123`; non-numeric builds are kept as a tag.
    pub fn full_version(&self) -> String {
        let build = self.build_number.trim();
        let version = self.version_number.trim();
        if build.is_empty() {
            version.to_string()
        } else if build.chars().all(|c| c.is_ascii_digit()) {
            format!("{}-b{}", version, build)
        } else {
            format!("{}-{}", version, build)
        }
    }
}

/// Read and validate the version recorded in a `version_metadata.json` file.
pub async fn read_version_metadata(path: &Path) -> anyhow::Result<String> {
    use anyhow::Context;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    let meta: VersionMetadata = serde_json::from_slice(&bytes)
        .with_context(|| format!("malformed version metadata {:?}", path))?;
    let version = meta.full_version();
    Version::parse(&version).with_context(|| format!("bad version in {:?}", path))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_build_suffixed_versions() {
        let v = Version::parse("2.17.1.0-b123").unwrap();
        assert_eq!(v.segments(), &[2, 17, 1, 0]);
        assert_eq!(v.build(), &Build::Number(123));

        let v = Version::parse("2.18.0.0").unwrap();
        assert_eq!(v.build(), &Build::None);

        let v = Version::parse("2.18.0.0-PRE_RELEASE").unwrap();
        assert_eq!(v.build(), &Build::Tag("PRE_RELEASE".to_string()));
    }

    #[test]
    fn strictly_less_by_segment() {
        let pairs = [
            ("2.16.0.0", "2.17.0.0"),
            ("2.17.0.0", "2.17.1.0"),
            ("2.17.1.0", "2.17.1.1"),
            ("2.9.0.0", "2.10.0.0"),
            ("2.17.1.0-b10", "2.17.1.0-b9000"),
            ("2.17.1.0-b999", "2.17.2.0-b1"),
        ];
        for (a, b) in pairs {
            assert!(less_versions(a, b).unwrap(), "{} < {}", a, b);
            assert!(!less_versions(b, a).unwrap(), "!({} < {})", b, a);
            assert_eq!(compare_versions(a, b).unwrap(), Ordering::Less);
        }
    }

    #[test]
    fn equal_versions_are_not_less() {
        for v in ["2.17.1.0", "2.17.1.0-b123", "1"] {
            assert_eq!(compare_versions(v, v).unwrap(), Ordering::Equal);
            assert!(!less_versions(v, v).unwrap());
        }
    }

    #[test]
    fn malformed_versions_are_errors() {
        for bad in ["", "   ", "2..1", "2.x.1", "v2.17", "2.17-b1-b2", "2.17.1.0-", "."] {
            assert!(Version::parse(bad).is_err(), "expected error for {:?}", bad);
            assert!(less_versions(bad, "2.17.1.0").is_err());
            assert!(less_versions("2.17.1.0", bad).is_err());
        }
    }

    #[test]
    fn unequal_segment_counts_are_an_error_not_equal() {
        let err = compare_versions("2.17.1", "2.17.1.0").unwrap_err();
        assert!(matches!(err, VersionError::SegmentCountMismatch(_, _)));
    }

    #[test]
    fn missing_build_sorts_before_numbered_build() {
        assert!(less_versions("2.17.1.0", "2.17.1.0-b1").unwrap());
    }

    #[test]
    fn different_tags_cannot_be_compared() {
        let err = compare_versions("2.17.1.0-alpha", "2.17.1.0-beta").unwrap_err();
        assert!(matches!(err, VersionError::IncomparableBuilds(_, _)));
        assert!(compare_versions("2.17.1.0-alpha", "2.17.1.0-b3").is_err());
    }

    #[test]
    fn metadata_builds_full_version() {
        let meta: VersionMetadata =
            serde_json::from_str(r#"{"version_number": "2.17.1.0", "build_number": "123"}"#).unwrap();
        assert_eq!(meta.full_version(), "2.17.1.0-b123");
        let meta: VersionMetadata =
            serde_json::from_str(r#"{"version_number": "2.18.0.0", "build_number": "PRE_RELEASE"}"#)
                .unwrap();
        assert_eq!(meta.full_version(), "2.18.0.0-PRE_RELEASE");
        let meta: VersionMetadata = serde_json::from_str(r#"{"version_number": "2.18.0.0"}"#).unwrap();
        assert_eq!(meta.full_version(), "2.18.0.0");
    }

    #[tokio::test]
    async fn read_version_metadata_validates_contents() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"version_number": "2.18.0.0", "build_number": "4"}"#).unwrap();
        assert_eq!(read_version_metadata(&good).await.unwrap(), "2.18.0.0-b4");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"version_number": "latest"}"#).unwrap();
        assert!(read_version_metadata(&bad).await.is_err());
        assert!(read_version_metadata(&dir.path().join("absent.json")).await.is_err());
    }
}
