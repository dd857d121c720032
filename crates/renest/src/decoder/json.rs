//! [`TokenSource`] over a JSON document, backed by `jiter`.
use alloc::{string::ToString, vec::Vec};

use jiter::{Jiter, JiterError, NumberAny, NumberInt, Peek};

use super::{RawToken, Scalar, TokenSource};
use crate::{error::DecodeError, path::Segment};

impl From<JiterError> for DecodeError {
    fn from(error: JiterError) -> Self {
        Self::Syntax {
            message: error.error_type.to_string(),
            position: error.index,
        }
    }
}

#[derive(Debug)]
enum Container {
    /// `key` is the name of the next member, `None` once `}` was consumed.
    Object {
        name: Option<Segment>,
        key: Option<Segment>,
    },
    /// `peeked` is the start of the next element, `None` once `]` was
    /// consumed.
    Array {
        name: Option<Segment>,
        peeked: Option<Peek>,
    },
}

/// Pull tokenizer over a complete JSON document.
///
/// ```
/// use renest::{JsonTokenizer, RawToken, Scalar, TokenSource};
///
/// let mut tokenizer = JsonTokenizer::new(br#"{"a": [1]}"#);
/// let mut tokens = Vec::new();
/// while let Some((token, name)) = tokenizer.next_token().unwrap() {
///     tokens.push((token, name.map(|n| n.to_string())));
/// }
/// assert_eq!(
///     tokens,
///     [
///         (RawToken::StartObject, None),
///         (RawToken::StartArray, Some("a".into())),
///         (RawToken::Scalar(Scalar::Int(1)), None),
///         (RawToken::EndArray, Some("a".into())),
///         (RawToken::EndObject, None),
///     ]
/// );
/// ```
pub struct JsonTokenizer<'j> {
    jiter: Jiter<'j>,
    stack: Vec<Container>,
    started: bool,
    done: bool,
}

impl<'j> JsonTokenizer<'j> {
    /// Creates a tokenizer over `data`.
    #[must_use]
    pub fn new(data: &'j [u8]) -> Self {
        Self {
            jiter: Jiter::new(data),
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    fn value(&mut self, peek: Peek, name: Option<Segment>) -> Result<RawToken, DecodeError> {
        let token = match peek {
            Peek::Object => {
                let key = self.jiter.known_object()?.map(Segment::from);
                self.stack.push(Container::Object { name, key });
                return Ok(RawToken::StartObject);
            }
            Peek::Array => {
                let peeked = self.jiter.known_array()?;
                self.stack.push(Container::Array { name, peeked });
                return Ok(RawToken::StartArray);
            }
            Peek::Null => {
                self.jiter.known_null()?;
                Scalar::Null
            }
            Peek::True | Peek::False => Scalar::Bool(self.jiter.known_bool(peek)?),
            Peek::String => Scalar::String(self.jiter.known_str()?.into()),
            _ => match self.jiter.known_number(peek)? {
                NumberAny::Int(NumberInt::Int(int)) => Scalar::Int(int),
                NumberAny::Float(float) => Scalar::Float(float),
                #[allow(unreachable_patterns)]
                NumberAny::Int(big) => Scalar::Float(f64::from(big)),
            },
        };
        self.advance()?;
        Ok(RawToken::Scalar(token))
    }

    /// Moves the innermost container past the value that just completed.
    fn advance(&mut self) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(Container::Object { key, .. }) => {
                *key = self.jiter.next_key()?.map(Segment::from);
            }
            Some(Container::Array { peeked, .. }) => *peeked = self.jiter.array_step()?,
            None => {
                self.jiter.finish()?;
                self.done = true;
            }
        }
        Ok(())
    }
}

impl TokenSource for JsonTokenizer<'_> {
    fn next_token(&mut self) -> Result<Option<(RawToken, Option<Segment>)>, DecodeError> {
        if self.done {
            return Ok(None);
        }
        match self.stack.pop() {
            None if self.started => {
                self.done = true;
                Ok(None)
            }
            None => {
                self.started = true;
                let peek = self.jiter.peek()?;
                Ok(Some((self.value(peek, None)?, None)))
            }
            Some(Container::Object { name, key: Some(key) }) => {
                self.stack.push(Container::Object { name, key: None });
                let peek = self.jiter.peek()?;
                Ok(Some((self.value(peek, Some(key.clone()))?, Some(key))))
            }
            Some(Container::Object { name, key: None }) => {
                self.advance()?;
                Ok(Some((RawToken::EndObject, name)))
            }
            Some(Container::Array { name, peeked: Some(peek) }) => {
                self.stack.push(Container::Array { name, peeked: None });
                Ok(Some((self.value(peek, None)?, None)))
            }
            Some(Container::Array { name, peeked: None }) => {
                self.advance()?;
                Ok(Some((RawToken::EndArray, name)))
            }
        }
    }
}
