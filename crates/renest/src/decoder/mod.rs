//! Source decoders.
//!
//! A decoder reads some source shape and pushes canonical tokens into a
//! [`FeatureEventHandler`]. The JSON decoders work on top of a pull-style
//! [`TokenSource`] that reports structural tokens together with the member
//! name they are bound to, so the nesting of the source is inferred from
//! names and depth only.
use alloc::{
    format,
    string::{String, ToString},
};
use core::fmt;

use tracing::{debug, trace};

use crate::{
    error::{DecodeError, Error},
    event::{Context, FeatureEventHandler},
    multiplicity::MultiplicityTracker,
    options::{DecoderOptions, NullPolicy},
    path::{DisplayPath, Segment},
    schema::ValueType,
};

mod features;
#[cfg(feature = "json")]
pub(crate) mod json;
mod rows;

pub use features::JsonFeatureDecoder;
pub use rows::{Row, RowDecoder};

/// A scalar as reported by a pull parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// `null`
    Null,
    /// `true` or `false`
    Bool(bool),
    /// An integer that fits in `i64`.
    Int(i64),
    /// Any other number.
    Float(f64),
    /// A string.
    String(String),
}

impl Scalar {
    /// Value type a decoder reports for this scalar. Nulls are strings.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null | Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Boolean,
            Self::Int(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
        }
    }

    /// The textual value, `None` for null.
    #[must_use]
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(format!("{value:?}")),
            Self::String(value) => Some(value),
        }
    }
}

/// One structural token of a pull parser.
#[derive(Debug, Clone, PartialEq)]
pub enum RawToken {
    /// `{`
    StartObject,
    /// `}`
    EndObject,
    /// `[`
    StartArray,
    /// `]`
    EndArray,
    /// A scalar.
    Scalar(Scalar),
}

impl fmt::Display for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartObject => f.write_str("start of object"),
            Self::EndObject => f.write_str("end of object"),
            Self::StartArray => f.write_str("start of array"),
            Self::EndArray => f.write_str("end of array"),
            Self::Scalar(Scalar::Null) => f.write_str("null"),
            Self::Scalar(Scalar::Bool(value)) => write!(f, "{value}"),
            Self::Scalar(Scalar::Int(value)) => write!(f, "number {value}"),
            Self::Scalar(Scalar::Float(value)) => write!(f, "number {value}"),
            Self::Scalar(Scalar::String(value)) => write!(f, "string {value:?}"),
        }
    }
}

/// A pull parser.
///
/// Every token comes with the name of the object member it starts, ends or
/// is the value of; array elements and the top-level value have no name.
pub trait TokenSource {
    /// The next token, or `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed input.
    fn next_token(&mut self) -> Result<Option<(RawToken, Option<Segment>)>, DecodeError>;
}

impl<S: TokenSource + ?Sized> TokenSource for &mut S {
    fn next_token(&mut self) -> Result<Option<(RawToken, Option<Segment>)>, DecodeError> {
        (**self).next_token()
    }
}

/// Replays pre-recorded tokens.
impl TokenSource for alloc::vec::IntoIter<(RawToken, Option<Segment>)> {
    fn next_token(&mut self) -> Result<Option<(RawToken, Option<Segment>)>, DecodeError> {
        Ok(self.next())
    }
}

pub(crate) fn unexpected(expected: &'static str, found: &RawToken) -> Error {
    DecodeError::UnexpectedToken {
        expected,
        found: found.to_string(),
    }
    .into()
}

/// Turns the members of one feature into canonical tokens.
///
/// Named objects and arrays push their name on the context path. Anonymous
/// objects are elements of the enclosing array: each one advances the
/// multiplicity of the array path and becomes one `ObjectStart`. Anonymous
/// arrays nested in arrays are transparent. Anonymous scalars are elements
/// of a value array and carry their position as the last index.
///
/// `feature_depth` is the depth of the context path at which the feature's
/// members start; the path is truncated back to it after every member.
#[derive(Debug, Clone)]
pub struct PropertiesDecoder {
    multiplicity: MultiplicityTracker,
    null_policy: NullPolicy,
    feature_depth: usize,
    depth: usize,
    value_index: usize,
}

impl PropertiesDecoder {
    /// Creates a decoder for the given options.
    #[must_use]
    pub fn new(options: &DecoderOptions) -> Self {
        Self {
            multiplicity: MultiplicityTracker::new(options.array_paths.iter().cloned()),
            null_policy: options.null_policy.clone(),
            feature_depth: 0,
            depth: 0,
            value_index: 0,
        }
    }

    /// Sets the depth at which feature members start.
    #[must_use]
    pub fn with_feature_depth(mut self, feature_depth: usize) -> Self {
        self.feature_depth = feature_depth;
        self
    }

    /// Resets the per-feature state. Registered array paths are kept.
    pub fn reset(&mut self) {
        self.multiplicity.reset();
        self.depth = 0;
        self.value_index = 0;
    }

    /// Number of named containers currently open.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The multiplicity tracker behind the emitted indexes.
    #[must_use]
    pub fn multiplicity(&self) -> &MultiplicityTracker {
        &self.multiplicity
    }

    /// Decodes one token.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    ///
    /// ```
    /// use renest::{path, Context, DecoderOptions, PropertiesDecoder, RawToken, Scalar, TokenRecorder};
    ///
    /// let mut decoder = PropertiesDecoder::new(&DecoderOptions::default());
    /// let mut recorder = TokenRecorder::default();
    /// let mut ctx = Context::default();
    /// for (token, name) in [
    ///     (RawToken::StartArray, Some("tags")),
    ///     (RawToken::Scalar(Scalar::String("a".into())), None),
    ///     (RawToken::Scalar(Scalar::String("b".into())), None),
    ///     (RawToken::EndArray, Some("tags")),
    /// ] {
    ///     decoder.feed(token, name, &mut ctx, &mut recorder).unwrap();
    ///     if name.is_none() {
    ///         assert_eq!(ctx.path(), path!["tags"].as_slice());
    ///     }
    /// }
    /// assert_eq!(recorder.tokens().len(), 4);
    /// assert_eq!(ctx.indexes, vec![2]);
    /// ```
    pub fn feed<H>(
        &mut self,
        token: RawToken,
        name: Option<&str>,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        match token {
            RawToken::StartObject => {
                if let Some(name) = name {
                    context.path_tracker_mut().track(name);
                    self.depth += 1;
                } else if self.multiplicity.is_array_path(context.path()) {
                    self.multiplicity.track(context.path());
                } else {
                    debug!(path = %DisplayPath(context.path()), "anonymous object outside of array");
                    return Ok(());
                }
                context.indexes = self.multiplicity.get_multiplicities_for_path(context.path());
                trace!(path = %DisplayPath(context.path()), indexes = ?context.indexes, depth = self.depth, "object");
                downstream.on_object_start(context)
            }
            RawToken::StartArray => {
                let Some(name) = name else {
                    return Ok(());
                };
                context.path_tracker_mut().track(name);
                self.multiplicity.register(context.path().to_vec());
                self.depth += 1;
                self.value_index = 0;
                let path = context.path();
                context.indexes = self
                    .multiplicity
                    .get_multiplicities_for_path(&path[..path.len() - 1]);
                trace!(path = %DisplayPath(context.path()), depth = self.depth, "array");
                downstream.on_array_start(context)
            }
            RawToken::EndArray => {
                if name.is_none() {
                    return Ok(());
                }
                downstream.on_array_end(context)?;
                self.depth = self.depth.saturating_sub(1);
                self.rewind(context);
                Ok(())
            }
            RawToken::EndObject => {
                if name.is_some() {
                    downstream.on_object_end(context)?;
                    self.depth = self.depth.saturating_sub(1);
                } else if self.multiplicity.is_array_path(context.path()) {
                    downstream.on_object_end(context)?;
                }
                self.rewind(context);
                Ok(())
            }
            RawToken::Scalar(scalar) => self.value(scalar, name, context, downstream),
        }
    }

    fn value<H>(
        &mut self,
        scalar: Scalar,
        name: Option<&str>,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        context.value_type = scalar.value_type();
        if let Some(name) = name {
            context.path_tracker_mut().track(name);
        }
        let value = match (scalar, &self.null_policy) {
            (Scalar::Null, NullPolicy::Skip) => {
                self.rewind(context);
                return Ok(());
            }
            (Scalar::Null, NullPolicy::Substitute(sentinel)) => Some(sentinel.clone()),
            (scalar, _) => scalar.into_value(),
        };

        let path = context.path();
        context.indexes = if name.is_some() {
            self.multiplicity.get_multiplicities_for_path(path)
        } else {
            self.value_index += 1;
            let mut indexes = self
                .multiplicity
                .get_multiplicities_for_path(&path[..path.len().saturating_sub(1)]);
            indexes.push(self.value_index);
            indexes
        };
        context.value = value;
        downstream.on_value(context)?;
        self.rewind(context);
        Ok(())
    }

    fn rewind(&self, context: &mut Context) {
        context
            .path_tracker_mut()
            .truncate(self.depth + self.feature_depth);
    }
}
