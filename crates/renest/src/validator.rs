//! A pass-through stage that checks nesting discipline.
use tracing::trace;

use crate::{
    error::{Action, Element, Error, StructuralError},
    event::{Context, FeatureEventHandler},
    nesting::{FrameKind, NestingTracker},
    path::DisplayPath,
};

/// Forwards every token to `downstream` after checking that it respects
/// stack discipline.
///
/// The first violation is returned as [`Error::Structural`], carrying the
/// offending path and the rendered stack; the token is not forwarded.
#[derive(Debug)]
pub struct Validator<D> {
    tracker: NestingTracker<()>,
    downstream: D,
}

impl<D: FeatureEventHandler> Validator<D> {
    /// Wraps `downstream`.
    pub fn new(downstream: D) -> Self {
        Self {
            tracker: NestingTracker::new(),
            downstream,
        }
    }

    /// The wrapped handler.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Unwraps the wrapped handler.
    pub fn into_inner(self) -> D {
        self.downstream
    }

    fn error(&self, action: Action, element: Element, context: &Context) -> Error {
        StructuralError {
            action,
            element,
            path: context.path().to_vec(),
            stack: self.tracker.render(),
        }
        .into()
    }

    fn breaks_prefix(&self, context: &Context) -> bool {
        self.tracker.is_nested() && self.tracker.does_not_start_with_previous_path(context.path())
    }
}

impl<D: FeatureEventHandler> FeatureEventHandler for Validator<D> {
    fn on_start(&mut self, context: &mut Context) -> Result<(), Error> {
        self.downstream.on_start(context)
    }

    fn on_end(&mut self, context: &mut Context) -> Result<(), Error> {
        self.downstream.on_end(context)
    }

    fn on_feature_start(&mut self, context: &mut Context) -> Result<(), Error> {
        trace!(path = %DisplayPath(context.path()), indexes = ?context.indexes, "feature start");
        self.tracker.reset();
        self.downstream.on_feature_start(context)
    }

    fn on_feature_end(&mut self, context: &mut Context) -> Result<(), Error> {
        trace!(path = %DisplayPath(context.path()), "feature end");
        if self.tracker.is_nested() {
            return Err(self.error(Action::Close, Element::Feature, context));
        }
        self.downstream.on_feature_end(context)
    }

    fn on_object_start(&mut self, context: &mut Context) -> Result<(), Error> {
        trace!(path = %DisplayPath(context.path()), indexes = ?context.indexes, "object start");
        if self.breaks_prefix(context)
            || (self.tracker.in_array() && !self.tracker.is_same_path(context.path()))
        {
            return Err(self.error(Action::Open, Element::Object, context));
        }
        self.tracker
            .push(FrameKind::Object, context.path().to_vec(), (), context.indexes.clone());
        self.downstream.on_object_start(context)
    }

    fn on_object_end(&mut self, context: &mut Context) -> Result<(), Error> {
        trace!(path = %DisplayPath(context.path()), "object end");
        if !self.tracker.in_object() || !self.tracker.is_same_path(context.path()) {
            return Err(self.error(Action::Close, Element::Object, context));
        }
        self.tracker.pop();
        self.downstream.on_object_end(context)
    }

    fn on_array_start(&mut self, context: &mut Context) -> Result<(), Error> {
        if !context.in_geometry {
            trace!(path = %DisplayPath(context.path()), "array start");
        }
        if self.breaks_prefix(context) || (self.tracker.in_array() && !context.in_geometry) {
            return Err(self.error(Action::Open, Element::Array, context));
        }
        self.tracker
            .push(FrameKind::Array, context.path().to_vec(), (), context.indexes.clone());
        self.downstream.on_array_start(context)
    }

    fn on_array_end(&mut self, context: &mut Context) -> Result<(), Error> {
        if !context.in_geometry {
            trace!(path = %DisplayPath(context.path()), "array end");
        }
        if !self.tracker.in_array() || !self.tracker.is_same_path(context.path()) {
            return Err(self.error(Action::Close, Element::Array, context));
        }
        self.tracker.pop();
        self.downstream.on_array_end(context)
    }

    fn on_value(&mut self, context: &mut Context) -> Result<(), Error> {
        if !context.in_geometry {
            trace!(path = %DisplayPath(context.path()), value = ?context.value, "value");
        }
        let nested = self.tracker.is_nested();
        if self.breaks_prefix(context)
            || (self.tracker.in_array() && !self.tracker.is_same_path(context.path()))
            || (!nested && context.path().len() > 1)
        {
            return Err(self.error(Action::Open, Element::Value, context));
        }
        self.downstream.on_value(context)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{event::TokenRecorder, path, path::Path};

    enum Step {
        ObjectStart(Path),
        ObjectEnd(Path),
        ArrayStart(Path),
        ArrayEnd(Path),
        Value(Path),
    }

    fn run(steps: &[Step]) -> Result<Validator<TokenRecorder>, Error> {
        let mut validator = Validator::new(TokenRecorder::default());
        let mut ctx = Context::default();
        validator.on_feature_start(&mut ctx)?;
        for step in steps {
            let (Step::ObjectStart(path)
            | Step::ObjectEnd(path)
            | Step::ArrayStart(path)
            | Step::ArrayEnd(path)
            | Step::Value(path)) = step;
            ctx.set_path(path);
            match step {
                Step::ObjectStart(_) => validator.on_object_start(&mut ctx)?,
                Step::ObjectEnd(_) => validator.on_object_end(&mut ctx)?,
                Step::ArrayStart(_) => validator.on_array_start(&mut ctx)?,
                Step::ArrayEnd(_) => validator.on_array_end(&mut ctx)?,
                Step::Value(_) => validator.on_value(&mut ctx)?,
            }
        }
        ctx.set_path(&[]);
        validator.on_feature_end(&mut ctx)?;
        Ok(validator)
    }

    #[test]
    fn accepts_balanced_stream() {
        let validator = run(&[
            Step::Value(path!["id"]),
            Step::ArrayStart(path!["parts"]),
            Step::ObjectStart(path!["parts"]),
            Step::Value(path!["parts", "name"]),
            Step::ObjectEnd(path!["parts"]),
            Step::ObjectStart(path!["parts"]),
            Step::ObjectEnd(path!["parts"]),
            Step::ArrayEnd(path!["parts"]),
        ])
        .unwrap();
        assert_eq!(validator.into_inner().tokens().len(), 10);
    }

    #[test]
    fn rejects_close_of_wrong_frame() {
        let error = run(&[
            Step::ArrayStart(path!["b"]),
            Step::ObjectEnd(path!["a"]),
        ])
        .unwrap_err();
        assert_snapshot!(error, @r"
        Cannot close object with path [a]. Current nesting stack:
        [b] array
        ");
    }

    #[test]
    fn rejects_value_outside_open_object() {
        let error = run(&[
            Step::ObjectStart(path!["a"]),
            Step::Value(path!["b"]),
        ])
        .unwrap_err();
        let Error::Structural(error) = error else {
            panic!("expected a structural error");
        };
        assert_eq!(error.action, Action::Open);
        assert_eq!(error.element, Element::Value);
        assert_eq!(error.path, path!["b"]);
    }

    #[test]
    fn rejects_nested_value_without_enclosing_object() {
        let error = run(&[Step::Value(path!["a", "x"])]).unwrap_err();
        let Error::Structural(error) = error else {
            panic!("expected a structural error");
        };
        assert_eq!((error.action, error.element), (Action::Open, Element::Value));
        assert_eq!(error.path, path!["a", "x"]);
        assert!(error.stack.is_empty());
        assert!(run(&[Step::Value(path!["a"])]).is_ok());
    }

    #[test]
    fn rejects_nested_array_outside_geometry() {
        let error = run(&[
            Step::ArrayStart(path!["a"]),
            Step::ArrayStart(path!["a"]),
        ])
        .unwrap_err();
        assert!(matches!(
            error,
            Error::Structural(StructuralError { element: Element::Array, action: Action::Open, .. })
        ));
    }

    #[test]
    fn rejects_unclosed_feature() {
        let error = run(&[Step::ObjectStart(path!["a"])]).unwrap_err();
        assert!(matches!(
            error,
            Error::Structural(StructuralError { element: Element::Feature, .. })
        ));
    }

    #[test]
    fn accepts_nested_geometry_arrays() {
        let mut validator = Validator::new(TokenRecorder::default());
        let mut ctx = Context::default();
        validator.on_feature_start(&mut ctx).unwrap();
        ctx.set_path(&path!["geometry"]);
        ctx.in_geometry = true;
        validator.on_object_start(&mut ctx).unwrap();
        validator.on_array_start(&mut ctx).unwrap();
        validator.on_array_start(&mut ctx).unwrap();
        validator.on_value(&mut ctx).unwrap();
        validator.on_array_end(&mut ctx).unwrap();
        validator.on_array_end(&mut ctx).unwrap();
        validator.on_object_end(&mut ctx).unwrap();
        ctx.clear_geometry();
        ctx.set_path(&[]);
        validator.on_feature_end(&mut ctx).unwrap();
    }
}
