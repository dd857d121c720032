use alloc::string::String;
use core::fmt;

use thiserror::Error;

use crate::path::{DisplayPath, Path};

/// Errors surfaced while building a schema mapping or processing a stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Open and close tokens do not respect stack discipline.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// The source bytes could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The schema configuration is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Whether a token opens or closes something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A start token or a value.
    Open,
    /// An end token.
    Close,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Close => "close",
        })
    }
}

/// The structural element a token addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    /// An object frame.
    Object,
    /// An array frame.
    Array,
    /// A scalar value.
    Value,
    /// A whole feature.
    Feature,
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Value => "value",
            Self::Feature => "feature",
        })
    }
}

/// A token that breaks the nesting of the current feature.
///
/// `stack` is the rendered nesting stack at the time of the violation, one
/// frame per line.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Cannot {action} {element} with path {}. Current nesting stack:\n{stack}",
    DisplayPath(.path)
)]
pub struct StructuralError {
    /// What the offending token tried to do.
    pub action: Action,
    /// What the offending token addresses.
    pub element: Element,
    /// Path carried by the offending token.
    pub path: Path,
    /// The open frames, outermost first.
    pub stack: String,
}

/// Malformed source input. Fatal for the whole stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The pull parser rejected the input.
    #[error("{message} at position {position}")]
    Syntax {
        /// Parser message.
        message: String,
        /// Byte offset of the failure.
        position: usize,
    },
    /// The input ended inside a document.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A well-formed token arrived where the layout does not allow it.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the decoder was waiting for.
        expected: &'static str,
        /// What arrived instead.
        found: String,
    },
    /// A geometry declares a type this crate does not know.
    #[error("unsupported geometry type '{0}'")]
    UnsupportedGeometry(String),
}

/// Invalid schema configuration, reported before streaming begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A non-root property has no name.
    #[error("property without name below '{0}'")]
    EmptyName(String),
    /// A declared source path has an empty segment.
    #[error("invalid source path '{0}'")]
    InvalidSourcePath(String),
    /// A property that is neither object nor object array declares
    /// properties.
    #[error("property '{name}' of type {kind} cannot declare properties")]
    UnexpectedProperties {
        /// Offending property.
        name: String,
        /// Its declared type.
        kind: &'static str,
    },
    /// Coalesce or concat alternatives do not fit the owner.
    #[error("'{operation}' alternatives of '{name}' are not supported for its type")]
    InvalidAlternatives {
        /// Offending property.
        name: String,
        /// `coalesce` or `concat`.
        operation: &'static str,
    },
    /// A flatten transformation is declared below the root.
    #[error("flatten is only supported on the root, found on '{0}'")]
    FlattenNotAtRoot(String),
}
