use alloc::string::String;
use alloc::vec::Vec;

use crate::path::Path;

/// Which nested structures a [`Flatten`] transformation removes.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlattenMode {
    /// Objects and arrays.
    #[default]
    All,
    /// Objects only. Objects that are array elements are kept.
    Objects,
    /// Arrays only. Array elements contribute their index.
    Arrays,
}

impl FlattenMode {
    /// Whether object frames are flattened.
    #[must_use]
    pub fn objects(self) -> bool {
        matches!(self, Self::All | Self::Objects)
    }

    /// Whether array frames are flattened.
    #[must_use]
    pub fn arrays(self) -> bool {
        matches!(self, Self::All | Self::Arrays)
    }
}

/// Rewrites nested structure into scalar properties with composite names.
///
/// With separator `.`, the value `name` of the second element of array
/// `items` becomes the top-level property `items.2.name`.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flatten {
    /// Joins the segments of a flattened name.
    ///
    /// # Default
    ///
    /// `"."`
    pub separator: String,

    /// What gets flattened.
    ///
    /// # Default
    ///
    /// [`FlattenMode::All`]
    pub include: FlattenMode,
}

impl Default for Flatten {
    fn default() -> Self {
        Self {
            separator: ".".into(),
            include: FlattenMode::All,
        }
    }
}

/// What a decoder does with a source `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NullPolicy {
    /// Emit a `STRING` value without content.
    #[default]
    Emit,
    /// Emit nothing.
    Skip,
    /// Emit the given sentinel as a `STRING` value.
    Substitute(String),
}

/// Top-level shape of a JSON source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonLayout {
    /// A top-level object is one feature; a top-level array holds one
    /// feature per element.
    #[default]
    Features,
    /// A GeoJSON `FeatureCollection` or a single `Feature`.
    GeoJson,
}

/// Configuration for the source decoders.
///
/// # Examples
///
/// ```rust
/// use renest::{path, DecoderOptions, NullPolicy};
///
/// let options = DecoderOptions {
///     array_paths: vec![path!["tags"]],
///     null_policy: NullPolicy::Substitute("N/A".into()),
///     ..Default::default()
/// };
/// assert_eq!(options.array_paths.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Paths known to repeat, relative to the feature root.
    ///
    /// Usually taken from `SchemaMapping::array_source_paths`. The JSON
    /// decoder also registers every named array it meets, so anonymous
    /// elements of undeclared arrays are still balanced.
    ///
    /// # Default
    ///
    /// Empty.
    pub array_paths: Vec<Path>,

    /// How source nulls are reported.
    ///
    /// # Default
    ///
    /// [`NullPolicy::Emit`]
    pub null_policy: NullPolicy,

    /// Top-level shape of JSON input. Ignored by the row decoder.
    ///
    /// # Default
    ///
    /// [`JsonLayout::Features`]
    pub layout: JsonLayout,
}

/// Configuration for the schema-mapping transformer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformerOptions {
    /// Flattening applied to the output.
    ///
    /// When `None`, a flatten transformation declared on the schema root is
    /// used instead, if any.
    ///
    /// # Default
    ///
    /// `None`
    pub flatten: Option<Flatten>,
}
