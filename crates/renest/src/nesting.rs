//! The frame stack that keeps a token stream balanced.
//!
//! A [`NestingTracker`] holds the currently open object and array frames.
//! Each frame remembers its logical path, an opaque payload (the schema node
//! or source path that opened it) and its *scope*: the prefix of the index
//! vector that identifies which repetition of its enclosing arrays it
//! belongs to. A frame whose scope is no longer a prefix of the incoming
//! index vector belongs to a finished repetition and must close.
//!
//! With flattening enabled, frames can be *absorbed*: they are tracked but
//! not emitted, and their name (or, for elements of flattened arrays, their
//! index) becomes part of a composite name for everything emitted inside.
use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use tracing::{debug, trace};

use crate::{
    error::Error,
    event::{Context, FeatureEventHandler},
    mapping::SchemaMapping,
    options::Flatten,
    path::{DisplayPath, Path, Segment},
    schema::{NodeId, SchemaKind},
};

/// Kind of a nesting frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// An open object.
    Object,
    /// An open array.
    Array,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Object => "object",
            Self::Array => "array",
        })
    }
}

/// One open object or array.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<P> {
    /// Object or array.
    pub kind: FrameKind,
    /// Logical path of the frame. Elements of an array share its path.
    pub path: Path,
    /// What opened the frame.
    pub payload: P,
    /// Index prefix identifying the repetition the frame belongs to.
    pub scope: Vec<usize>,
    emitted: Path,
    pending: Vec<Segment>,
    absorbed: bool,
}

impl<P> Frame<P> {
    /// Path carried by the frame's start and end tokens. For absorbed frames
    /// this is the path of the nearest emitted ancestor.
    #[must_use]
    pub fn emitted_path(&self) -> &[Segment] {
        &self.emitted
    }

    /// Whether flattening swallowed the frame's start and end tokens.
    #[must_use]
    pub fn is_absorbed(&self) -> bool {
        self.absorbed
    }
}

/// A stack of open frames.
///
/// ```
/// use renest::{path, Context, FrameKind, NestingTracker, TokenRecorder};
///
/// let mut tracker = NestingTracker::<()>::new();
/// let mut recorder = TokenRecorder::default();
/// let mut ctx = Context::default();
///
/// tracker.open_array(path!["items"], (), vec![], &mut ctx, &mut recorder).unwrap();
/// tracker.open_object(path!["items"], (), vec![1], &mut ctx, &mut recorder).unwrap();
/// assert!(tracker.is_object_in_array());
/// assert!(tracker.does_start_with_previous_path(&path!["items", "name"]));
/// assert!(tracker.has_index_changed(&[2]));
///
/// tracker.close_all(&mut ctx, &mut recorder).unwrap();
/// assert!(!tracker.is_nested());
/// assert_eq!(recorder.tokens().len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct NestingTracker<P> {
    frames: Vec<Frame<P>>,
    flatten: Option<Flatten>,
}

impl<P> Default for NestingTracker<P> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            flatten: None,
        }
    }
}

impl<P> NestingTracker<P> {
    /// Creates an empty tracker that emits every frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tracker that flattens according to `flatten`.
    #[must_use]
    pub fn with_flatten(flatten: Option<Flatten>) -> Self {
        Self {
            frames: Vec::new(),
            flatten,
        }
    }

    /// The flattening in effect.
    #[must_use]
    pub fn flatten(&self) -> Option<&Flatten> {
        self.flatten.as_ref()
    }

    /// Drops all frames without emitting anything.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Open frames, outermost first.
    #[must_use]
    pub fn frames(&self) -> &[Frame<P>] {
        &self.frames
    }

    /// The innermost open frame.
    #[must_use]
    pub fn top(&self) -> Option<&Frame<P>> {
        self.frames.last()
    }

    /// Logical path of the innermost frame, empty when nothing is open.
    #[must_use]
    pub fn current_path(&self) -> &[Segment] {
        self.top().map_or(&[], |frame| frame.path.as_slice())
    }

    // ── predicates ─────────────────────────────────────────────────────────

    /// Whether any frame is open.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Whether the innermost frame is an array.
    #[must_use]
    pub fn in_array(&self) -> bool {
        self.top().is_some_and(|frame| frame.kind == FrameKind::Array)
    }

    /// Whether the innermost frame is an object.
    #[must_use]
    pub fn in_object(&self) -> bool {
        self.top().is_some_and(|frame| frame.kind == FrameKind::Object)
    }

    /// Whether the innermost frame is an element object of the array below
    /// it.
    #[must_use]
    pub fn is_object_in_array(&self) -> bool {
        match self.frames.as_slice() {
            [.., array, object] => {
                object.kind == FrameKind::Object
                    && array.kind == FrameKind::Array
                    && object.path == array.path
            }
            _ => false,
        }
    }

    /// Whether any open frame of `kind` has exactly this path.
    #[must_use]
    pub fn has_frame(&self, kind: FrameKind, path: &[Segment]) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.kind == kind && frame.path == path)
    }

    /// Whether the innermost frame has exactly this path.
    #[must_use]
    pub fn is_same_path(&self, path: &[Segment]) -> bool {
        self.top().is_some_and(|frame| frame.path == path)
    }

    /// Whether the innermost frame's path is not a prefix of `path`.
    #[must_use]
    pub fn does_not_start_with_previous_path(&self, path: &[Segment]) -> bool {
        !path.starts_with(self.current_path())
    }

    /// Whether the innermost frame's path is a strict prefix of `path`.
    #[must_use]
    pub fn does_start_with_previous_path(&self, path: &[Segment]) -> bool {
        let current = self.current_path();
        path.len() > current.len() && path.starts_with(current)
    }

    /// Whether `indexes` leaves the repetition of the innermost frame.
    #[must_use]
    pub fn has_index_changed(&self, indexes: &[usize]) -> bool {
        self.top()
            .is_some_and(|frame| !indexes.starts_with(&frame.scope))
    }

    /// Whether `indexes` advances the repetition one level above its last
    /// entry, compared to the innermost frame.
    #[must_use]
    pub fn has_parent_index_changed(&self, indexes: &[usize]) -> bool {
        let Some(frame) = self.top() else {
            return false;
        };
        let len = indexes.len();
        len > 1 && frame.scope.len() >= len - 1 && indexes[len - 2] > frame.scope[len - 2]
    }

    /// Whether `indexes` addresses the first element of its innermost array.
    #[must_use]
    pub fn is_first(indexes: &[usize]) -> bool {
        indexes.last() == Some(&1)
    }

    // ── bookkeeping without emission ───────────────────────────────────────

    /// Pushes a frame without emitting anything.
    pub fn push(&mut self, kind: FrameKind, path: Path, payload: P, scope: Vec<usize>) -> &Frame<P> {
        let (absorbed, index) = self.absorbs(kind);
        let (emitted, pending) = match &self.flatten {
            None => (path.clone(), Vec::new()),
            Some(_) => {
                let tail = self.tail(&path);
                let index = index.then(|| scope.last().copied().unwrap_or(1));
                if absorbed {
                    self.absorbed_names(tail, index)
                } else {
                    (self.project(tail, index), Vec::new())
                }
            }
        };
        self.frames.push(Frame {
            kind,
            path,
            payload,
            scope,
            emitted,
            pending,
            absorbed,
        });
        &self.frames[self.frames.len() - 1]
    }

    /// Pops the innermost frame without emitting anything.
    pub fn pop(&mut self) -> Option<Frame<P>> {
        self.frames.pop()
    }

    /// Path to emit for a value whose logical path is the current path
    /// followed by `tail`.
    ///
    /// `index` is the element index of a value inside a value array. It only
    /// shows up in the name when that array is flattened.
    #[must_use]
    pub fn value_path(&self, tail: &[Segment], index: Option<usize>) -> Path {
        if self.flatten.is_none() {
            let mut path = self.current_path().to_vec();
            path.extend_from_slice(tail);
            return path;
        }
        let index = index.filter(|_| self.top().is_some_and(|f| f.absorbed));
        self.project(tail, index)
    }

    fn absorbs(&self, kind: FrameKind) -> (bool, bool) {
        let Some(flatten) = &self.flatten else {
            return (false, false);
        };
        let (objects, arrays) = (flatten.include.objects(), flatten.include.arrays());
        match kind {
            FrameKind::Array => (arrays, false),
            FrameKind::Object if arrays && self.in_array() => (true, true),
            FrameKind::Object => (objects && (arrays || !self.in_array()), false),
        }
    }

    fn tail<'a>(&self, path: &'a [Segment]) -> &'a [Segment] {
        let current = self.current_path();
        if path.starts_with(current) {
            &path[current.len()..]
        } else {
            path
        }
    }

    fn parent_parts(&self) -> (Path, Vec<Segment>) {
        match self.top() {
            None => (Vec::new(), Vec::new()),
            Some(top) if top.absorbed => (top.emitted.clone(), top.pending.clone()),
            Some(top) => (top.emitted.clone(), Vec::new()),
        }
    }

    fn absorbed_names(&self, tail: &[Segment], index: Option<usize>) -> (Path, Vec<Segment>) {
        let (base, mut names) = self.parent_parts();
        names.extend_from_slice(tail);
        names.extend(index.map(|i| Segment::from(i.to_string())));
        (base, names)
    }

    fn project(&self, tail: &[Segment], index: Option<usize>) -> Path {
        let (mut base, pending) = self.parent_parts();
        if pending.is_empty() && index.is_none() {
            base.extend_from_slice(tail);
            return base;
        }
        let mut names = pending;
        names.extend_from_slice(tail);
        names.extend(index.map(|i| Segment::from(i.to_string())));
        let separator = self.flatten.as_ref().map_or(".", |f| f.separator.as_str());
        base.push(Segment::from(names.join(separator)));
        base
    }

    // ── emission ───────────────────────────────────────────────────────────

    /// Pushes an object frame and emits `ObjectStart` unless it is absorbed.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn open_object<H>(
        &mut self,
        path: Path,
        payload: P,
        scope: Vec<usize>,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.open(FrameKind::Object, path, payload, scope, context, downstream)
    }

    /// Pushes an array frame and emits `ArrayStart` unless it is absorbed.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn open_array<H>(
        &mut self,
        path: Path,
        payload: P,
        scope: Vec<usize>,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.open(FrameKind::Array, path, payload, scope, context, downstream)
    }

    fn open<H>(
        &mut self,
        kind: FrameKind,
        path: Path,
        payload: P,
        scope: Vec<usize>,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        context.indexes.clone_from(&scope);
        let frame = self.push(kind, path, payload, scope);
        context.set_path(&frame.emitted);
        context.in_object = kind == FrameKind::Object;
        context.in_array = kind == FrameKind::Array;
        trace!(path = %DisplayPath(&frame.path), %kind, absorbed = frame.absorbed, "open");
        if frame.absorbed {
            return Ok(());
        }
        match kind {
            FrameKind::Object => downstream.on_object_start(context),
            FrameKind::Array => downstream.on_array_start(context),
        }
    }

    /// Closes the innermost frame if it is an object.
    ///
    /// A mismatch is logged and ignored; use [`NestingTracker::close`] to
    /// close whatever is on top.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn close_object<H>(&mut self, context: &mut Context, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        if !self.in_object() {
            debug!(path = %DisplayPath(self.current_path()), "no object to close");
            return Ok(());
        }
        self.close(context, downstream)
    }

    /// Closes the innermost frame if it is an array.
    ///
    /// A mismatch is logged and ignored.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn close_array<H>(&mut self, context: &mut Context, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        if !self.in_array() {
            debug!(path = %DisplayPath(self.current_path()), "no array to close");
            return Ok(());
        }
        self.close(context, downstream)
    }

    /// Closes the innermost frame, whatever its kind, and moves the context
    /// path back to the new innermost frame. Does nothing when no frame is
    /// open.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn close<H>(&mut self, context: &mut Context, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        trace!(path = %DisplayPath(&frame.path), kind = %frame.kind, "close");
        if !frame.absorbed {
            context.set_path(&frame.emitted);
            context.indexes.clone_from(&frame.scope);
            match frame.kind {
                FrameKind::Object => downstream.on_object_end(context)?,
                FrameKind::Array => downstream.on_array_end(context)?,
            }
        }
        self.sync(context);
        Ok(())
    }

    /// Closes frames from the top for as long as `predicate` holds.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn close_while<H, F>(
        &mut self,
        mut predicate: F,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
        F: FnMut(&Frame<P>) -> bool,
    {
        while self.top().is_some_and(&mut predicate) {
            self.close(context, downstream)?;
        }
        Ok(())
    }

    /// Closes every open frame.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn close_all<H>(&mut self, context: &mut Context, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.close_while(|_| true, context, downstream)
    }

    fn sync(&self, context: &mut Context) {
        match self.top() {
            Some(frame) => {
                context.set_path(&frame.emitted);
                context.in_object = frame.kind == FrameKind::Object;
                context.in_array = frame.kind == FrameKind::Array;
            }
            None => {
                context.set_path(&[]);
                context.in_object = false;
                context.in_array = false;
            }
        }
    }

    /// Renders the stack, one `path kind` line per frame, outermost first.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl<P> fmt::Display for NestingTracker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{} {}", DisplayPath(&frame.path), frame.kind)?;
        }
        Ok(())
    }
}

/// Reconciliation against a target schema.
impl NestingTracker<NodeId> {
    /// Closes and opens frames so that a token for schema node `id` with
    /// index vector `indexes` can be emitted next.
    ///
    /// 1. Frames close from the top while their path is not a prefix of the
    ///    node's target path, or their scope is not a prefix of `indexes`
    ///    (a new repetition of an enclosing array has begun), or they are
    ///    element objects of another concat alternative.
    /// 2. Missing ancestors open outermost first. The walk up stops at the
    ///    first ancestor that declares its own source path and is already
    ///    open, since such ancestors are opened by their own visit.
    /// 3. The node itself opens: arrays get their frame, object array
    ///    elements get one object per repetition when `open_element` is
    ///    set, plain objects get their frame. Values open nothing.
    ///
    /// Calling this twice with the same input opens and closes nothing the
    /// second time.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn reconcile<H>(
        &mut self,
        mapping: &SchemaMapping,
        id: NodeId,
        indexes: &[usize],
        open_element: bool,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        if id == mapping.root() {
            return Ok(());
        }
        let target = mapping.node(id).full_path();
        self.close_while(
            |frame| {
                !target.starts_with(&frame.path)
                    || !indexes.starts_with(&frame.scope)
                    || switches_alternative(mapping, id, frame)
            },
            context,
            downstream,
        )?;

        let root = mapping.root();
        let missing: Vec<NodeId> = mapping
            .parents(id)
            .iter()
            .copied()
            .take_while(|&parent| {
                parent != root
                    && !(mapping.node(parent).source_path().is_some()
                        && self.is_open(mapping, parent))
            })
            .collect();
        for parent in missing.into_iter().rev() {
            self.open_node(mapping, parent, indexes, true, context, downstream)?;
        }
        self.open_node(mapping, id, indexes, open_element, context, downstream)
    }

    fn is_open(&self, mapping: &SchemaMapping, id: NodeId) -> bool {
        let node = mapping.node(id);
        let kind = match node.kind() {
            SchemaKind::Object | SchemaKind::ObjectArray => FrameKind::Object,
            SchemaKind::ValueArray(_) => FrameKind::Array,
            SchemaKind::Value(_) | SchemaKind::Geometry => return false,
        };
        self.has_frame(kind, node.full_path())
    }

    fn open_node<H>(
        &mut self,
        mapping: &SchemaMapping,
        id: NodeId,
        indexes: &[usize],
        open_element: bool,
        context: &mut Context,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        let node = mapping.node(id);
        let path = node.full_path();
        let above = node.arrays_above();
        match node.kind() {
            SchemaKind::ObjectArray => {
                if !self.has_frame(FrameKind::Array, path) {
                    self.open_array(path.to_vec(), id, scope(indexes, above), context, downstream)?;
                }
                let at_array = self
                    .top()
                    .is_some_and(|top| top.kind == FrameKind::Array && top.path == path);
                if open_element && at_array {
                    let element = scope(indexes, above + 1);
                    self.open_object(path.to_vec(), id, element, context, downstream)?;
                }
            }
            SchemaKind::ValueArray(_) => {
                if !self.has_frame(FrameKind::Array, path) {
                    self.open_array(path.to_vec(), id, scope(indexes, above), context, downstream)?;
                }
            }
            SchemaKind::Object => {
                if !self.has_frame(FrameKind::Object, path) {
                    self.open_object(path.to_vec(), id, scope(indexes, above), context, downstream)?;
                }
            }
            SchemaKind::Value(_) | SchemaKind::Geometry => {}
        }
        Ok(())
    }
}

fn scope(indexes: &[usize], len: usize) -> Vec<usize> {
    indexes[..len.min(indexes.len())].to_vec()
}

/// Whether `frame` is an element object opened by one concat alternative
/// while `id` belongs to another one at the same path.
fn switches_alternative(mapping: &SchemaMapping, id: NodeId, frame: &Frame<NodeId>) -> bool {
    if frame.kind != FrameKind::Object || !mapping.node(frame.payload).is_concat_alternative() {
        return false;
    }
    core::iter::once(id)
        .chain(mapping.parents(id).iter().copied())
        .any(|other| {
            let node = mapping.node(other);
            other != frame.payload && node.full_path() == frame.path && node.is_concat_alternative()
        })
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use rstest::rstest;

    use super::*;
    use crate::{event::TokenRecorder, options::FlattenMode, path};

    type Tracker = NestingTracker<()>;

    fn opened(frames: &[(FrameKind, Path, Vec<usize>)]) -> Tracker {
        let mut tracker = Tracker::new();
        for (kind, path, scope) in frames {
            tracker.push(*kind, path.clone(), (), scope.clone());
        }
        tracker
    }

    #[test]
    fn close_object_on_array_is_a_no_op() {
        let mut tracker = opened(&[(FrameKind::Array, path!["b"], vec![])]);
        let mut recorder = TokenRecorder::default();
        let mut ctx = Context::default();
        tracker.close_object(&mut ctx, &mut recorder).unwrap();
        assert!(tracker.is_nested());
        assert!(recorder.tokens().is_empty());

        tracker.close_array(&mut ctx, &mut recorder).unwrap();
        assert!(!tracker.is_nested());
        assert_eq!(recorder.trace(), "ArrayEnd [b]\n");
    }

    #[test]
    fn close_restores_path_of_new_top() {
        let mut tracker = Tracker::new();
        let mut recorder = TokenRecorder::default();
        let mut ctx = Context::default();
        tracker.open_object(path!["a"], (), vec![], &mut ctx, &mut recorder).unwrap();
        tracker.open_array(path!["a", "b"], (), vec![], &mut ctx, &mut recorder).unwrap();
        assert_eq!(ctx.path(), path!["a", "b"].as_slice());
        assert!(ctx.in_array);

        tracker.close(&mut ctx, &mut recorder).unwrap();
        assert_eq!(ctx.path(), path!["a"].as_slice());
        assert!(ctx.in_object);
        tracker.close(&mut ctx, &mut recorder).unwrap();
        assert!(ctx.path().is_empty());
        tracker.close(&mut ctx, &mut recorder).unwrap();
        assert_eq!(recorder.tokens().len(), 4);
    }

    #[rstest]
    #[case(&["a"], true, false)]
    #[case(&["a", "b"], false, false)]
    #[case(&["a", "b", "c"], false, true)]
    #[case(&["x"], true, false)]
    fn prefix_predicates(
        #[case] next: &[&str],
        #[case] does_not_start: bool,
        #[case] strictly_starts: bool,
    ) {
        let tracker = opened(&[(FrameKind::Object, path!["a", "b"], vec![])]);
        let next: Path = next.iter().map(|s| Segment::from(*s)).collect();
        assert_eq!(tracker.does_not_start_with_previous_path(&next), does_not_start);
        assert_eq!(tracker.does_start_with_previous_path(&next), strictly_starts);
        assert_eq!(tracker.is_same_path(&next), next == path!["a", "b"]);
    }

    #[rstest]
    #[case(&[1], &[1], false, false)]
    #[case(&[1], &[2], true, false)]
    #[case(&[1, 1], &[1, 2], true, false)]
    #[case(&[1, 1], &[2, 1], true, true)]
    #[case(&[], &[5], false, false)]
    fn index_predicates(
        #[case] scope: &[usize],
        #[case] next: &[usize],
        #[case] changed: bool,
        #[case] parent_changed: bool,
    ) {
        let tracker = opened(&[(FrameKind::Object, path!["a"], scope.to_vec())]);
        assert_eq!(tracker.has_index_changed(next), changed);
        assert_eq!(tracker.has_parent_index_changed(next), parent_changed);
    }

    #[test]
    fn first_element_and_object_in_array() {
        assert!(Tracker::is_first(&[3, 1]));
        assert!(!Tracker::is_first(&[1, 2]));
        assert!(!Tracker::is_first(&[]));

        let tracker = opened(&[
            (FrameKind::Array, path!["items"], vec![]),
            (FrameKind::Object, path!["items"], vec![1]),
        ]);
        assert!(tracker.is_object_in_array());
        assert!(tracker.in_object());
        assert!(!opened(&[(FrameKind::Object, path!["items"], vec![])]).is_object_in_array());
    }

    #[test]
    fn renders_stack_outermost_first() {
        let tracker = opened(&[
            (FrameKind::Array, path!["items"], vec![]),
            (FrameKind::Object, path!["items"], vec![1]),
        ]);
        assert_eq!(tracker.render(), "[items] array\n[items] object\n");
    }

    fn flattening(include: FlattenMode) -> Tracker {
        Tracker::with_flatten(Some(Flatten {
            separator: ".".into(),
            include,
        }))
    }

    #[rstest]
    #[case::all(FlattenMode::All, &["items.2.address.city"], &["items.2.tags.3"], 0)]
    #[case::objects(FlattenMode::Objects, &["items", "address.city"], &["items", "tags"], 3)]
    #[case::arrays(FlattenMode::Arrays, &["items.2.address", "city"], &["items.2.tags.3"], 1)]
    fn flattened_names(
        #[case] include: FlattenMode,
        #[case] city: &[&str],
        #[case] tag: &[&str],
        #[case] emitted_frames: usize,
    ) {
        let to_path = |s: &[&str]| -> Path { s.iter().map(|s| Segment::from(*s)).collect() };
        let mut tracker = flattening(include);
        let mut recorder = TokenRecorder::default();
        let mut ctx = Context::default();

        tracker.open_array(path!["items"], (), vec![], &mut ctx, &mut recorder).unwrap();
        tracker.open_object(path!["items"], (), vec![2], &mut ctx, &mut recorder).unwrap();
        tracker
            .open_object(path!["items", "address"], (), vec![2], &mut ctx, &mut recorder)
            .unwrap();
        assert_eq!(tracker.value_path(&path!["city"], None), to_path(city));
        tracker.close(&mut ctx, &mut recorder).unwrap();

        tracker
            .open_array(path!["items", "tags"], (), vec![2], &mut ctx, &mut recorder)
            .unwrap();
        assert_eq!(tracker.value_path(&[], Some(3)), to_path(tag));
        tracker.close_all(&mut ctx, &mut recorder).unwrap();

        let starts = recorder
            .tokens()
            .iter()
            .filter(|t| {
                matches!(
                    t,
                    crate::Token::ObjectStart { .. } | crate::Token::ArrayStart { .. }
                )
            })
            .count();
        assert_eq!(starts, emitted_frames);
        assert_eq!(recorder.tokens().len(), emitted_frames * 2);
    }
}
