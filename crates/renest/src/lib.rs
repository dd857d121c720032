//! Schema-driven re-nesting of feature token streams.
//!
//! Sources rarely deliver the balanced object and array boundaries a target
//! schema needs: relational rows repeat keys, a JSON pull parser only reports
//! names and depth, and a target schema may rename, flatten, coalesce or
//! concatenate several source shapes into one. This crate turns such input
//! into a canonical, strictly nested [`Token`] stream and re-projects it onto
//! a target schema.
//!
//! The moving parts, leaves first:
//!
//! - [`PathTracker`] and [`MultiplicityTracker`] address values and count
//!   array repetitions without buffering a feature.
//! - [`SchemaMapping`] indexes a [`SchemaDefinition`] tree by source and
//!   target path. It is immutable and shared across features.
//! - [`NestingTracker`] keeps the open frames and reconciles them against the
//!   next schema node to emit.
//! - Decoders ([`PropertiesDecoder`], [`JsonFeatureDecoder`], [`RowDecoder`])
//!   produce canonical tokens from source shapes.
//! - [`SchemaMappingTransformer`] reshapes a canonical stream to the target
//!   schema, and [`Validator`] checks structure on the way through.
//!
//! ```
//! use renest::{Context, FeatureEventHandler, TokenRecorder, Validator};
//!
//! let mut validator = Validator::new(TokenRecorder::default());
//! let mut ctx = Context::default();
//! validator.on_start(&mut ctx).unwrap();
//! validator.on_feature_start(&mut ctx).unwrap();
//! validator.on_feature_end(&mut ctx).unwrap();
//! validator.on_end(&mut ctx).unwrap();
//! assert_eq!(validator.into_inner().tokens().len(), 4);
//! ```

#![no_std]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod decoder;
mod error;
mod event;
mod mapping;
mod multiplicity;
mod nesting;
mod options;
mod path;
mod schema;
mod transformer;
mod validator;

#[cfg(test)]
mod tests;

#[cfg(feature = "json")]
pub use decoder::json::JsonTokenizer;
pub use decoder::{
    JsonFeatureDecoder, PropertiesDecoder, RawToken, Row, RowDecoder, Scalar, TokenSource,
};
pub use error::{Action, DecodeError, Element, Error, SchemaError, StructuralError};
pub use event::{Context, CustomSchema, FeatureEventHandler, Metadata, Token, TokenRecorder};
pub use mapping::{SchemaMapping, ValueStep, ValueTransforms};
pub use multiplicity::MultiplicityTracker;
pub use nesting::{Frame, FrameKind, NestingTracker};
pub use options::{DecoderOptions, Flatten, FlattenMode, JsonLayout, NullPolicy, TransformerOptions};
pub use path::{DisplayPath, Path, PathTracker, Segment, parse_source_path};
pub use schema::{
    Alternative, AlternativeKind, GeometryType, NodeId, PropertyType, Role, Schema,
    SchemaDefinition, SchemaKind, SchemaNode, Transformation, ValueType,
};
pub use transformer::{CoordinateHook, CoordinatePrecision, SchemaMappingTransformer};
pub use validator::Validator;

#[doc(hidden)]
pub use alloc::vec;

/// Macro to build a [`Path`] from a list of segments.
///
/// ```rust
/// # use renest::{path, Segment};
/// let p = path!["properties", "tags"];
/// assert_eq!(p, vec![Segment::from("properties"), Segment::from("tags")]);
/// assert!(path![].is_empty());
/// ```
#[macro_export]
macro_rules! path {
    ( $( $elem:expr ),* $(,)? ) => {{
        let path: $crate::Path = $crate::vec![$($crate::Segment::from($elem)),*];
        path
    }};
}
