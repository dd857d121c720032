//! The canonical token vocabulary and the per-feature context.
//!
//! Every stage of a pipeline implements [`FeatureEventHandler`]. A stage
//! receives the upstream [`Context`] by exclusive reference, derives its own
//! output context and pushes zero or more tokens to its downstream. Handlers
//! must not keep the context beyond a call.
//!
//! ```
//! use renest::{path, Context, FeatureEventHandler, Token, TokenRecorder, ValueType};
//!
//! let mut recorder = TokenRecorder::default();
//! let mut ctx = Context::default();
//! ctx.set_path(&path!["name"]);
//! ctx.value = Some("A".into());
//! recorder.on_value(&mut ctx).unwrap();
//! assert_eq!(
//!     recorder.tokens(),
//!     &[Token::Value { path: path!["name"], value: Some("A".into()), value_type: ValueType::String }]
//! );
//! ```
use alloc::{string::String, vec::Vec};
use core::fmt::{self, Write};

use crate::{
    error::Error,
    path::{DisplayPath, Path, PathTracker, Segment},
    schema::{GeometryType, NodeId, ValueType},
};

/// One atomic event of the canonical feature stream.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind")
)]
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Start of the stream.
    Start {
        /// Number of features matching the query, if the source knows it.
        number_matched: Option<u64>,
        /// Number of features in this response, if the source knows it.
        number_returned: Option<u64>,
    },
    /// End of the stream.
    End,
    /// Start of one feature.
    FeatureStart {
        /// Location of the feature in the source, if any.
        path: Option<Path>,
    },
    /// End of one feature.
    FeatureEnd,
    /// Start of an object, or of a geometry.
    ObjectStart {
        /// The path to the object.
        path: Path,
        /// Set for geometries.
        geometry_type: Option<GeometryType>,
    },
    /// End of an object.
    ObjectEnd {
        /// The path to the object.
        path: Path,
    },
    /// Start of an array.
    ArrayStart {
        /// The path to the array.
        path: Path,
    },
    /// End of an array.
    ArrayEnd {
        /// The path to the array.
        path: Path,
    },
    /// A scalar value.
    Value {
        /// The path to the value. Elements of value arrays carry the path of
        /// the array.
        path: Path,
        /// Raw value, `None` for null.
        value: Option<String>,
        /// How to interpret `value`.
        value_type: ValueType,
    },
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start {
                number_matched,
                number_returned,
            } => {
                f.write_str("Start")?;
                if let Some(matched) = number_matched {
                    write!(f, " matched={matched}")?;
                }
                if let Some(returned) = number_returned {
                    write!(f, " returned={returned}")?;
                }
                Ok(())
            }
            Self::End => f.write_str("End"),
            Self::FeatureStart { path: None } => f.write_str("FeatureStart"),
            Self::FeatureStart { path: Some(path) } => {
                write!(f, "FeatureStart {}", DisplayPath(path))
            }
            Self::FeatureEnd => f.write_str("FeatureEnd"),
            Self::ObjectStart {
                path,
                geometry_type: None,
            } => write!(f, "ObjectStart {}", DisplayPath(path)),
            Self::ObjectStart {
                path,
                geometry_type: Some(geometry_type),
            } => write!(f, "ObjectStart {} {geometry_type}", DisplayPath(path)),
            Self::ObjectEnd { path } => write!(f, "ObjectEnd {}", DisplayPath(path)),
            Self::ArrayStart { path } => write!(f, "ArrayStart {}", DisplayPath(path)),
            Self::ArrayEnd { path } => write!(f, "ArrayEnd {}", DisplayPath(path)),
            Self::Value {
                path,
                value: Some(value),
                value_type,
            } => write!(f, "Value {} {value:?} {value_type}", DisplayPath(path)),
            Self::Value {
                path,
                value: None,
                value_type,
            } => write!(f, "Value {} null {value_type}", DisplayPath(path)),
        }
    }
}

/// Feature collection metadata forwarded on `Start`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Number of features matching the query.
    pub number_matched: Option<u64>,
    /// Number of features in this response.
    pub number_returned: Option<u64>,
    /// Whether the source holds a single feature instead of a collection.
    pub single_feature: bool,
}

/// Ad hoc override of schema attributes for the current token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomSchema {
    /// Geometry type seen in the data when it differs from the declared one.
    pub geometry_type: Option<GeometryType>,
}

/// The mutable, feature-scoped cursor handed along a pipeline.
///
/// One context is owned by each stage that emits tokens and reused for every
/// token of every feature it emits; it is never shared between concurrently
/// processed features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    path: PathTracker,
    /// Repetition index of every array ancestor of the current path,
    /// outermost first, 1-based.
    pub indexes: Vec<usize>,
    /// Schema node the current token belongs to, when the emitter knows it.
    pub schema: Option<NodeId>,
    /// Override of schema attributes for the current token.
    pub custom_schema: Option<CustomSchema>,
    /// Raw value of the current `Value` token.
    pub value: Option<String>,
    /// Type of [`Context::value`].
    pub value_type: ValueType,
    /// Geometry type of the current geometry.
    pub geometry_type: Option<GeometryType>,
    /// Coordinate dimension of the current geometry.
    pub geometry_dimension: Option<u8>,
    /// Whether tokens belong to a geometry.
    pub in_geometry: bool,
    /// Whether the innermost open frame is an object.
    pub in_object: bool,
    /// Whether the innermost open frame is an array.
    pub in_array: bool,
    /// Name of the feature type being streamed.
    pub feature_type: Option<Segment>,
    /// Collection metadata.
    pub metadata: Metadata,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current path.
    #[must_use]
    pub fn path(&self) -> &[Segment] {
        self.path.as_slice()
    }

    /// The path tracker behind [`Context::path`].
    #[must_use]
    pub fn path_tracker(&self) -> &PathTracker {
        &self.path
    }

    /// Mutable access to the path tracker.
    pub fn path_tracker_mut(&mut self) -> &mut PathTracker {
        &mut self.path
    }

    /// Replaces the current path.
    pub fn set_path(&mut self, path: &[Segment]) {
        self.path.replace(path);
    }

    /// The innermost repetition index, 0 outside of arrays.
    #[must_use]
    pub fn index(&self) -> usize {
        self.indexes.last().copied().unwrap_or(0)
    }

    /// The geometry type downstream stages should assume.
    #[must_use]
    pub fn effective_geometry_type(&self) -> Option<GeometryType> {
        self.custom_schema
            .and_then(|custom| custom.geometry_type)
            .or(self.geometry_type)
    }

    /// Clears the geometry attributes.
    pub fn clear_geometry(&mut self) {
        self.in_geometry = false;
        self.geometry_type = None;
        self.geometry_dimension = None;
        self.custom_schema = None;
    }

    /// Resets everything that is scoped to one feature.
    pub fn reset_feature(&mut self) {
        self.path.clear();
        self.indexes.clear();
        self.schema = None;
        self.value = None;
        self.value_type = ValueType::default();
        self.in_object = false;
        self.in_array = false;
        self.clear_geometry();
    }
}

/// A consumer of canonical tokens.
///
/// All methods default to accepting the token and doing nothing.
#[allow(unused_variables)]
pub trait FeatureEventHandler {
    /// Start of the stream.
    ///
    /// # Errors
    ///
    /// Implementations fail when they cannot process the token; the error
    /// aborts the stream.
    fn on_start(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// End of the stream.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_end(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// Start of a feature.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_feature_start(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// End of a feature.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_feature_end(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// Start of an object or geometry at `context.path()`.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_object_start(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// End of an object or geometry at `context.path()`.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_object_end(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// Start of an array at `context.path()`.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_array_start(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// End of an array at `context.path()`.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_array_end(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// A value at `context.path()`.
    ///
    /// # Errors
    ///
    /// See [`FeatureEventHandler::on_start`].
    fn on_value(&mut self, context: &mut Context) -> Result<(), Error> {
        Ok(())
    }
}

impl<H: FeatureEventHandler + ?Sized> FeatureEventHandler for &mut H {
    fn on_start(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_start(context)
    }

    fn on_end(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_end(context)
    }

    fn on_feature_start(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_feature_start(context)
    }

    fn on_feature_end(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_feature_end(context)
    }

    fn on_object_start(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_object_start(context)
    }

    fn on_object_end(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_object_end(context)
    }

    fn on_array_start(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_array_start(context)
    }

    fn on_array_end(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_array_end(context)
    }

    fn on_value(&mut self, context: &mut Context) -> Result<(), Error> {
        (**self).on_value(context)
    }
}

/// A sink that records every token it receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenRecorder {
    tokens: Vec<Token>,
}

impl TokenRecorder {
    /// The recorded tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Takes the recorded tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// One line per token.
    #[must_use]
    pub fn trace(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            // writing into a String cannot fail
            let _ = writeln!(out, "{token}");
        }
        out
    }

    fn path(context: &Context) -> Path {
        context.path().to_vec()
    }
}

impl FeatureEventHandler for TokenRecorder {
    fn on_start(&mut self, context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::Start {
            number_matched: context.metadata.number_matched,
            number_returned: context.metadata.number_returned,
        });
        Ok(())
    }

    fn on_end(&mut self, _context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::End);
        Ok(())
    }

    fn on_feature_start(&mut self, context: &mut Context) -> Result<(), Error> {
        let path = (!context.path().is_empty()).then(|| Self::path(context));
        self.tokens.push(Token::FeatureStart { path });
        Ok(())
    }

    fn on_feature_end(&mut self, _context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::FeatureEnd);
        Ok(())
    }

    fn on_object_start(&mut self, context: &mut Context) -> Result<(), Error> {
        let geometry_type = if context.in_geometry {
            context.effective_geometry_type()
        } else {
            None
        };
        self.tokens.push(Token::ObjectStart {
            path: Self::path(context),
            geometry_type,
        });
        Ok(())
    }

    fn on_object_end(&mut self, context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::ObjectEnd {
            path: Self::path(context),
        });
        Ok(())
    }

    fn on_array_start(&mut self, context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::ArrayStart {
            path: Self::path(context),
        });
        Ok(())
    }

    fn on_array_end(&mut self, context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::ArrayEnd {
            path: Self::path(context),
        });
        Ok(())
    }

    fn on_value(&mut self, context: &mut Context) -> Result<(), Error> {
        self.tokens.push(Token::Value {
            path: Self::path(context),
            value: context.value.clone(),
            value_type: context.value_type,
        });
        Ok(())
    }
}
