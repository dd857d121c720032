//! Path addressing shared by decoders, transformers and the validator.
//!
//! A [`Path`] is an ordered list of name segments. Paths are compared by
//! equality and by prefix; [`PathTracker`] is the mutable cursor that builds
//! them incrementally while tokens stream by.
use alloc::{sync::Arc, vec::Vec};
use core::fmt;

use crate::error::SchemaError;

/// One name segment of a [`Path`].
pub type Segment = Arc<str>;

/// An ordered sequence of segments locating a token in a feature.
pub type Path = Vec<Segment>;

/// Splits a declared source path such as `address/street` into segments.
///
/// A single leading slash is tolerated (`/building` names the same path as
/// `building`).
///
/// # Errors
///
/// Returns [`SchemaError::InvalidSourcePath`] when the path is empty or
/// contains an empty segment.
///
/// ```
/// # use renest::{parse_source_path, path};
/// assert_eq!(parse_source_path("/a/b").unwrap(), path!["a", "b"]);
/// assert!(parse_source_path("a//b").is_err());
/// ```
pub fn parse_source_path(raw: &str) -> Result<Path, SchemaError> {
    let trimmed = raw.strip_prefix('/').unwrap_or(raw);
    if trimmed.is_empty() {
        return Err(SchemaError::InvalidSourcePath(raw.into()));
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(SchemaError::InvalidSourcePath(raw.into()))
            } else {
                Ok(Segment::from(segment))
            }
        })
        .collect()
}

/// Renders a path as `[a, b, c]`.
#[derive(Debug, Clone, Copy)]
pub struct DisplayPath<'a>(pub &'a [Segment]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(segment)?;
        }
        f.write_str("]")
    }
}

/// A mutable stack of path segments.
///
/// Truncating to a depth at or beyond the current length is a no-op, so
/// decoders can rewind to a known depth without checking first.
///
/// ```
/// # use renest::{path, PathTracker};
/// let mut tracker = PathTracker::new();
/// tracker.track("properties");
/// tracker.track("tags");
/// assert_eq!(tracker.as_list(), path!["properties", "tags"]);
///
/// tracker.rewind("name", 1);
/// assert_eq!(tracker.as_list(), path!["properties", "name"]);
///
/// tracker.truncate(7);
/// assert_eq!(tracker.depth(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTracker {
    segments: Path,
}

impl PathTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one segment.
    pub fn track(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    /// Truncates the stack to `depth` entries.
    pub fn truncate(&mut self, depth: usize) {
        self.segments.truncate(depth);
    }

    /// Truncates to `depth`, then appends `segment`.
    pub fn rewind(&mut self, segment: impl Into<Segment>, depth: usize) {
        self.truncate(depth);
        self.track(segment);
    }

    /// Replaces the whole stack with `path`.
    pub fn replace(&mut self, path: &[Segment]) {
        self.segments.clear();
        self.segments.extend_from_slice(path);
    }

    /// Empties the stack.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Returns a snapshot of the current path.
    #[must_use]
    pub fn as_list(&self) -> Path {
        self.segments.clone()
    }

    /// Borrows the current path.
    #[must_use]
    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments currently tracked.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segment is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the current path is a prefix of `path`.
    #[must_use]
    pub fn contained_in(&self, path: &[Segment]) -> bool {
        path.starts_with(&self.segments)
    }
}

impl fmt::Display for PathTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayPath(&self.segments).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use rstest::rstest;

    use super::*;
    use crate::path;

    #[rstest]
    #[case(0, &[])]
    #[case(1, &["a"])]
    #[case(3, &["a", "b", "c"])]
    #[case(9, &["a", "b", "c"])]
    fn truncate_is_bounded(#[case] depth: usize, #[case] expected: &[&str]) {
        let mut tracker = PathTracker::new();
        tracker.replace(&path!["a", "b", "c"]);
        tracker.truncate(depth);
        let expected: Path = expected.iter().map(|s| Segment::from(*s)).collect();
        assert_eq!(tracker.as_list(), expected);
    }

    #[test]
    fn rewind_beyond_depth_only_appends() {
        let mut tracker = PathTracker::new();
        tracker.track("a");
        tracker.rewind("b", 4);
        assert_eq!(tracker.as_list(), path!["a", "b"]);
    }

    #[test]
    fn contained_in_checks_prefix() {
        let mut tracker = PathTracker::new();
        assert!(tracker.contained_in(&path!["x"]));
        tracker.replace(&path!["a", "b"]);
        assert!(tracker.contained_in(&path!["a", "b"]));
        assert!(tracker.contained_in(&path!["a", "b", "c"]));
        assert!(!tracker.contained_in(&path!["a"]));
        assert!(!tracker.contained_in(&path!["a", "c"]));
    }

    #[test]
    fn display_lists_segments() {
        assert_eq!(DisplayPath(&path!["a", "b"]).to_string(), "[a, b]");
        assert_eq!(PathTracker::new().to_string(), "[]");
    }

    #[rstest]
    #[case("building", &["building"])]
    #[case("/building/address", &["building", "address"])]
    fn parses_source_paths(#[case] raw: &str, #[case] expected: &[&str]) {
        let expected: Path = expected.iter().map(|s| Segment::from(*s)).collect();
        assert_eq!(parse_source_path(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("a//b")]
    #[case("a/")]
    fn rejects_empty_segments(#[case] raw: &str) {
        assert_eq!(
            parse_source_path(raw),
            Err(SchemaError::InvalidSourcePath(raw.into()))
        );
    }
}
