use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};

use crate::path::{Path, Segment};

/// Per-feature repetition counters for array paths.
///
/// The tracker knows which paths repeat. Tracking such a path advances its
/// counter and clears the counters of every array path nested inside it, so
/// a fresh repetition of an outer array starts its inner arrays again at 1.
/// A path that was never tracked counts as its first occurrence.
///
/// ```
/// # use renest::{path, MultiplicityTracker};
/// let mut tracker = MultiplicityTracker::new([path!["items"], path!["items", "parts"]]);
/// tracker.track(&path!["items"]);
/// tracker.track(&path!["items", "parts"]);
/// tracker.track(&path!["items", "parts"]);
/// assert_eq!(tracker.get_multiplicities_for_path(&path!["items", "parts", "id"]), vec![1, 2]);
///
/// tracker.track(&path!["items"]);
/// assert_eq!(tracker.get_multiplicities_for_path(&path!["items", "parts", "id"]), vec![2, 1]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MultiplicityTracker {
    array_paths: BTreeSet<Path>,
    counters: BTreeMap<Path, usize>,
}

impl MultiplicityTracker {
    /// Creates a tracker for the given array paths.
    #[must_use]
    pub fn new(array_paths: impl IntoIterator<Item = Path>) -> Self {
        let mut tracker = Self::default();
        for path in array_paths {
            tracker.register(path);
        }
        tracker
    }

    /// Declares one more path as repeating. Registering a path twice is a
    /// no-op.
    pub fn register(&mut self, path: Path) {
        self.array_paths.insert(path);
    }

    /// Whether `path` was declared as an array path.
    #[must_use]
    pub fn is_array_path(&self, path: &[Segment]) -> bool {
        self.array_paths.contains(path)
    }

    /// Records one more occurrence of `path`.
    ///
    /// Paths that are not array paths are ignored.
    pub fn track(&mut self, path: &[Segment]) {
        if !self.is_array_path(path) {
            return;
        }
        let key = path.to_vec();
        // Nested paths sort directly after `path`.
        let nested: Vec<Path> = self
            .counters
            .range(key.clone()..)
            .map(|(other, _)| other)
            .skip_while(|other| other.as_slice() == path)
            .take_while(|other| other.starts_with(path))
            .cloned()
            .collect();
        for other in nested {
            self.counters.remove(&other);
        }
        *self.counters.entry(key).or_insert(0) += 1;
    }

    /// Returns the current index of every array path that is a prefix of
    /// `path` (including `path` itself), outermost first.
    #[must_use]
    pub fn get_multiplicities_for_path(&self, path: &[Segment]) -> Vec<usize> {
        (1..=path.len())
            .map(|len| &path[..len])
            .filter(|prefix| self.is_array_path(prefix))
            .map(|prefix| self.counters.get(prefix).copied().unwrap_or(1))
            .collect()
    }

    /// Clears all counters. Called at the start of every feature.
    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, vec};
    use core::time::Duration;

    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    use super::*;
    use crate::path;

    #[test]
    fn untracked_array_paths_count_as_first_occurrence() {
        let tracker = MultiplicityTracker::new([path!["a"]]);
        assert_eq!(tracker.get_multiplicities_for_path(&path!["a", "b"]), vec![1]);
        assert_eq!(tracker.get_multiplicities_for_path(&path!["c"]), Vec::<usize>::new());
    }

    #[test]
    fn tracking_unknown_paths_is_ignored() {
        let mut tracker = MultiplicityTracker::new([path!["a"]]);
        tracker.track(&path!["b"]);
        tracker.track(&path!["a", "x"]);
        assert_eq!(tracker.get_multiplicities_for_path(&path!["a"]), vec![1]);
    }

    #[test]
    fn nested_counters_reset_without_touching_siblings() {
        let mut tracker = MultiplicityTracker::new([
            path!["a"],
            path!["a", "b"],
            path!["a", "b", "c"],
            path!["d"],
        ]);
        tracker.track(&path!["a"]);
        tracker.track(&path!["a", "b"]);
        tracker.track(&path!["a", "b"]);
        tracker.track(&path!["a", "b", "c"]);
        tracker.track(&path!["a", "b", "c"]);
        tracker.track(&path!["d"]);
        tracker.track(&path!["d"]);
        assert_eq!(
            tracker.get_multiplicities_for_path(&path!["a", "b", "c"]),
            vec![1, 2, 2]
        );

        tracker.track(&path!["a"]);
        assert_eq!(
            tracker.get_multiplicities_for_path(&path!["a", "b", "c"]),
            vec![2, 1, 1]
        );
        assert_eq!(tracker.get_multiplicities_for_path(&path!["d"]), vec![2]);
    }

    #[test]
    fn reset_clears_counters() {
        let mut tracker = MultiplicityTracker::new([path!["a"]]);
        tracker.track(&path!["a"]);
        tracker.track(&path!["a"]);
        tracker.reset();
        assert_eq!(tracker.get_multiplicities_for_path(&path!["a"]), vec![1]);
    }

    #[test]
    fn register_is_idempotent() {
        let mut tracker = MultiplicityTracker::default();
        tracker.register(path!["a"]);
        tracker.register(path!["a"]);
        tracker.track(&path!["a"]);
        assert_eq!(tracker.get_multiplicities_for_path(&path!["a"]), vec![1]);
    }

    #[rstest]
    #[timeout(Duration::from_millis(1_000))]
    fn lookups_scale_with_registered_paths() {
        let mut tracker = MultiplicityTracker::default();
        let paths: Vec<Path> = (0..10_000)
            .map(|i| vec![Segment::from("root"), Segment::from(format!("a{i}").as_str())])
            .collect();
        for path in &paths {
            tracker.register(path.clone());
        }
        for path in &paths {
            tracker.track(path);
            tracker.track(path);
            assert_eq!(tracker.get_multiplicities_for_path(path), vec![2]);
        }
        assert!(!tracker.is_array_path(&path!["root"]));
    }

    /// Property: repeated tracking of one array path yields 1, 2, 3, … no
    /// matter how often unrelated paths are tracked in between.
    #[test]
    fn multiplicity_is_monotonic() {
        #[allow(clippy::needless_pass_by_value)]
        fn prop(noise: Vec<bool>) -> TestResult {
            if noise.is_empty() {
                return TestResult::discard();
            }
            let mut tracker =
                MultiplicityTracker::new([path!["outer"], path!["outer", "inner"], path!["other"]]);
            let mut expected = 0;
            for inner in noise {
                if inner {
                    tracker.track(&path!["outer", "inner"]);
                    tracker.track(&path!["other"]);
                    continue;
                }
                tracker.track(&path!["outer"]);
                expected += 1;
                let got = tracker.get_multiplicities_for_path(&path!["outer"]);
                if got != vec![expected] {
                    return TestResult::failed();
                }
            }
            TestResult::passed()
        }

        QuickCheck::new().quickcheck(prop as fn(Vec<bool>) -> TestResult);
    }
}
