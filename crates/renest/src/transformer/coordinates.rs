use alloc::{format, string::String};

/// Rewrites coordinate values inside geometries.
pub trait CoordinateHook {
    /// Rewrites one coordinate. `axis` is its position within the current
    /// coordinate tuple, starting at 0.
    fn coordinate(&mut self, axis: usize, value: Option<String>) -> Option<String>;
}

/// Rounds coordinates to a fixed number of decimals.
///
/// ```
/// use renest::{CoordinateHook, CoordinatePrecision};
///
/// let mut precision = CoordinatePrecision { decimals: 2 };
/// assert_eq!(precision.coordinate(0, Some("7.12345".into())), Some("7.12".into()));
/// assert_eq!(precision.coordinate(1, Some("3.5".into())), Some("3.5".into()));
/// assert_eq!(precision.coordinate(1, Some("abc".into())), Some("abc".into()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatePrecision {
    /// Decimals kept on every axis.
    pub decimals: usize,
}

impl CoordinateHook for CoordinatePrecision {
    fn coordinate(&mut self, _axis: usize, value: Option<String>) -> Option<String> {
        let value = value?;
        let Ok(number) = value.trim().parse::<f64>() else {
            return Some(value);
        };
        let rounded = format!("{number:.*}", self.decimals);
        if !rounded.contains('.') {
            return Some(rounded);
        }
        Some(String::from(rounded.trim_end_matches('0').trim_end_matches('.')))
    }
}
