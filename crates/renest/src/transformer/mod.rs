//! Re-projection of a canonical source stream onto a target schema.
//!
//! The transformer looks up every incoming token by its source path,
//! reconciles its own nesting stack against the matching schema node and
//! emits the token at the node's target path. Source end tokens carry no
//! information the target needs: frames close lazily, when the next token
//! does not fit into them or the feature ends.
use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    vec::Vec,
};
use core::fmt;

use tracing::debug;

use crate::{
    error::Error,
    event::{Context, CustomSchema, FeatureEventHandler},
    mapping::SchemaMapping,
    nesting::NestingTracker,
    options::TransformerOptions,
    path::{DisplayPath, Path, Segment},
    schema::{AlternativeKind, GeometryType, NodeId, SchemaKind, ValueType},
};

mod coordinates;

pub use coordinates::{CoordinateHook, CoordinatePrecision};

#[derive(Debug)]
struct Geometry {
    /// Output path, `None` while skipping an unmapped geometry.
    path: Option<Path>,
    axis: usize,
}

/// Reshapes a canonical token stream to the target schema of a
/// [`SchemaMapping`] and forwards it to `D`.
///
/// ```
/// use std::sync::Arc;
///
/// use renest::{
///     path, Context, FeatureEventHandler, PropertyType, SchemaDefinition, SchemaMapping,
///     SchemaMappingTransformer, TokenRecorder, TransformerOptions,
/// };
///
/// let mapping = SchemaMapping::new(
///     &SchemaDefinition::new("building", PropertyType::Object).with_property(
///         SchemaDefinition::new("address", PropertyType::Object)
///             .with_property(SchemaDefinition::new("city", PropertyType::String).with_source_path("city")),
///     ),
/// )
/// .unwrap();
/// let mut transformer =
///     SchemaMappingTransformer::new(Arc::new(mapping), &TransformerOptions::default(), TokenRecorder::default());
///
/// let mut ctx = Context::default();
/// transformer.on_feature_start(&mut ctx).unwrap();
/// ctx.set_path(&path!["city"]);
/// ctx.value = Some("Bonn".into());
/// transformer.on_value(&mut ctx).unwrap();
/// ctx.set_path(&[]);
/// transformer.on_feature_end(&mut ctx).unwrap();
///
/// assert_eq!(
///     transformer.into_inner().trace(),
///     "FeatureStart\nObjectStart [address]\nValue [address, city] \"Bonn\" STRING\nObjectEnd [address]\nFeatureEnd\n"
/// );
/// ```
pub struct SchemaMappingTransformer<D> {
    mapping: Arc<SchemaMapping>,
    tracker: NestingTracker<NodeId>,
    context: Context,
    downstream: D,
    coalesced: BTreeSet<(NodeId, Vec<usize>)>,
    /// Object alternative chosen per coalesce owner and parent instance.
    winners: BTreeMap<(NodeId, Vec<usize>), NodeId>,
    geometry: Option<Geometry>,
    coordinates: Option<Box<dyn CoordinateHook>>,
}

impl<D> fmt::Debug for SchemaMappingTransformer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaMappingTransformer")
            .field("tracker", &self.tracker)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

impl<D: FeatureEventHandler> SchemaMappingTransformer<D> {
    /// Creates a transformer. Flattening comes from `options`, or else from
    /// the schema root.
    pub fn new(mapping: Arc<SchemaMapping>, options: &TransformerOptions, downstream: D) -> Self {
        let flatten = options
            .flatten
            .clone()
            .or_else(|| mapping.flatten().cloned());
        Self {
            tracker: NestingTracker::with_flatten(flatten),
            mapping,
            context: Context::default(),
            downstream,
            coalesced: BTreeSet::new(),
            winners: BTreeMap::new(),
            geometry: None,
            coordinates: None,
        }
    }

    /// Rewrites every coordinate with `hook`.
    #[must_use]
    pub fn with_coordinate_hook(mut self, hook: impl CoordinateHook + 'static) -> Self {
        self.coordinates = Some(Box::new(hook));
        self
    }

    /// The mapping in use.
    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// The wrapped handler.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Unwraps the wrapped handler.
    pub fn into_inner(self) -> D {
        self.downstream
    }

    fn lookup(&self, context: &Context) -> Option<NodeId> {
        let found = self.mapping.schema_for_source_path(context.path());
        if found.is_none() {
            debug!(path = %DisplayPath(context.path()), "value not found");
        }
        found
    }

    fn reconcile(&mut self, id: NodeId, indexes: &[usize], open_element: bool) -> Result<(), Error> {
        self.tracker.reconcile(
            &self.mapping,
            id,
            indexes,
            open_element,
            &mut self.context,
            &mut self.downstream,
        )
    }

    /// Output path of a node emitted inside the current innermost frame.
    fn target_path(&self, id: NodeId, rename: Option<&Segment>) -> Path {
        let full = self.mapping.node(id).full_path();
        let current = self.tracker.current_path();
        let start = if full.starts_with(current) {
            current.len()
        } else {
            full.len().saturating_sub(1)
        };
        let mut tail = full[start..].to_vec();
        if let (Some(rename), Some(last)) = (rename, tail.last_mut()) {
            last.clone_from(rename);
        }
        self.tracker.value_path(&tail, None)
    }

    /// The object coalesce alternative `id` belongs to, if any.
    fn object_alternative(&self, id: NodeId) -> Option<NodeId> {
        core::iter::once(id)
            .chain(self.mapping.parents(id).iter().copied())
            .find(|&other| {
                let node = self.mapping.node(other);
                node.kind() == SchemaKind::Object
                    && node
                        .alternative()
                        .is_some_and(|alternative| alternative.kind == AlternativeKind::Coalesce)
            })
    }

    /// Whether a property of `id` is dropped because another object
    /// alternative already delivered this instance of the owner. The first
    /// property to arrive picks the alternative.
    fn coalesced_away(&mut self, id: NodeId, indexes: &[usize]) -> bool {
        let Some(alternative) = self.object_alternative(id) else {
            return false;
        };
        let node = self.mapping.node(alternative);
        let Some(owner) = node.alternative().map(|alternative| alternative.owner) else {
            return false;
        };
        let depth = node.arrays_above().min(indexes.len());
        let winner = self
            .winners
            .entry((owner, indexes[..depth].to_vec()))
            .or_insert(alternative);
        *winner != alternative
    }

    fn geometry_start(&mut self, context: &Context) -> Result<(), Error> {
        let found = self
            .lookup(context)
            .filter(|&id| !self.coalesced_away(id, &context.indexes));
        let Some(id) = found else {
            self.geometry = Some(Geometry { path: None, axis: 0 });
            return Ok(());
        };
        self.reconcile(id, &context.indexes, true)?;
        let path = self.target_path(id, None);

        let declared = self.mapping.node(id).geometry_type();
        self.context.custom_schema = declared
            .filter(|declared| *declared != GeometryType::Any && Some(*declared) != context.geometry_type)
            .map(|declared| CustomSchema {
                geometry_type: Some(declared),
            });
        self.context.set_path(&path);
        self.context.indexes.clone_from(&context.indexes);
        self.context.schema = Some(id);
        self.context.in_geometry = true;
        self.context.geometry_type = context.geometry_type;
        self.context.geometry_dimension = context.geometry_dimension;
        self.geometry = Some(Geometry {
            path: Some(path),
            axis: 0,
        });
        self.downstream.on_object_start(&mut self.context)
    }

    fn value(&mut self, id: NodeId, context: &Context) -> Result<(), Error> {
        if self.coalesced_away(id, &context.indexes) {
            return Ok(());
        }
        let node = self.mapping.node(id);
        if let Some(alternative) = node.alternative() {
            if alternative.kind == AlternativeKind::Coalesce {
                if context.value.is_none() {
                    return Ok(());
                }
                let depth = node.arrays_above().min(context.indexes.len());
                let key = (alternative.owner, context.indexes[..depth].to_vec());
                if !self.coalesced.insert(key) {
                    return Ok(());
                }
            }
        }
        let owner = node.alternative().map(|alternative| alternative.owner);
        let transforms = [Some(id), owner]
            .into_iter()
            .flatten()
            .map(|id| self.mapping.transforms(id));
        let mut value = context.value.clone();
        let mut rename = None;
        for transform in transforms {
            if transform.remove {
                return Ok(());
            }
            rename = rename.or(transform.rename.clone());
            value = transform.apply(value);
        }

        let kind = node.kind();
        self.reconcile(id, &context.indexes, true)?;
        let path = match kind {
            SchemaKind::ValueArray(_) => {
                let index = context.indexes.last().copied();
                self.tracker.value_path(&[], index)
            }
            _ => self.target_path(id, rename.as_ref()),
        };
        self.context.set_path(&path);
        self.context.indexes.clone_from(&context.indexes);
        self.context.schema = Some(id);
        self.context.value = value;
        self.context.value_type = match kind.value_type() {
            Some(ValueType::Value) | None => context.value_type,
            Some(value_type) => value_type,
        };
        self.downstream.on_value(&mut self.context)
    }
}

impl<D: FeatureEventHandler> FeatureEventHandler for SchemaMappingTransformer<D> {
    fn on_start(&mut self, context: &mut Context) -> Result<(), Error> {
        self.context.metadata = context.metadata;
        self.downstream.on_start(&mut self.context)
    }

    fn on_end(&mut self, _context: &mut Context) -> Result<(), Error> {
        self.downstream.on_end(&mut self.context)
    }

    fn on_feature_start(&mut self, _context: &mut Context) -> Result<(), Error> {
        self.tracker.reset();
        self.coalesced.clear();
        self.winners.clear();
        self.geometry = None;
        self.context.reset_feature();
        let root = self.mapping.root();
        self.context.feature_type = Some(self.mapping.node(root).name().clone());
        self.context.schema = Some(root);
        self.downstream.on_feature_start(&mut self.context)
    }

    fn on_feature_end(&mut self, _context: &mut Context) -> Result<(), Error> {
        self.tracker.close_all(&mut self.context, &mut self.downstream)?;
        self.context.reset_feature();
        self.context.schema = Some(self.mapping.root());
        self.downstream.on_feature_end(&mut self.context)
    }

    fn on_object_start(&mut self, context: &mut Context) -> Result<(), Error> {
        if context.in_geometry {
            return self.geometry_start(context);
        }
        let Some(id) = self.lookup(context) else {
            return Ok(());
        };
        if !self.mapping.node(id).is_object() {
            debug!(path = %DisplayPath(context.path()), "object start on non-object schema");
            return Ok(());
        }
        // Coalesced objects open with their first property.
        if self.object_alternative(id).is_some() {
            return Ok(());
        }
        self.reconcile(id, &context.indexes, true)
    }

    fn on_object_end(&mut self, context: &mut Context) -> Result<(), Error> {
        if !context.in_geometry {
            return Ok(());
        }
        let Some(geometry) = self.geometry.take() else {
            return Ok(());
        };
        if geometry.path.is_some() {
            self.downstream.on_object_end(&mut self.context)?;
        }
        self.context.clear_geometry();
        let path = self.tracker.value_path(&[], None);
        self.context.set_path(&path);
        Ok(())
    }

    fn on_array_start(&mut self, context: &mut Context) -> Result<(), Error> {
        if let Some(geometry) = &mut self.geometry {
            geometry.axis = 0;
            return match &geometry.path {
                Some(_) => self.downstream.on_array_start(&mut self.context),
                None => Ok(()),
            };
        }
        let Some(id) = self.lookup(context) else {
            return Ok(());
        };
        if !self.mapping.node(id).is_array() {
            debug!(path = %DisplayPath(context.path()), "array start on non-array schema");
            return Ok(());
        }
        if self.object_alternative(id).is_some() {
            return Ok(());
        }
        self.reconcile(id, &context.indexes, false)
    }

    fn on_array_end(&mut self, _context: &mut Context) -> Result<(), Error> {
        match &self.geometry {
            Some(Geometry { path: Some(_), .. }) => self.downstream.on_array_end(&mut self.context),
            _ => Ok(()),
        }
    }

    fn on_value(&mut self, context: &mut Context) -> Result<(), Error> {
        if let Some(geometry) = &mut self.geometry {
            if geometry.path.is_none() {
                return Ok(());
            }
            let axis = geometry.axis;
            geometry.axis += 1;
            self.context.value = match &mut self.coordinates {
                Some(hook) => hook.coordinate(axis, context.value.clone()),
                None => context.value.clone(),
            };
            self.context.value_type = ValueType::Float;
            return self.downstream.on_value(&mut self.context);
        }
        let Some(id) = self.lookup(context) else {
            return Ok(());
        };
        match self.mapping.node(id).kind() {
            SchemaKind::Value(_) | SchemaKind::ValueArray(_) => self.value(id, context),
            SchemaKind::Geometry | SchemaKind::Object | SchemaKind::ObjectArray => {
                debug!(path = %DisplayPath(context.path()), "value on non-value schema");
                Ok(())
            }
        }
    }
}
