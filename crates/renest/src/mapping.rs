//! Path indexes over a [`Schema`].
//!
//! A `SchemaMapping` is computed once per feature type and shared read-only
//! by every stream of that type, typically behind an `Arc`. It answers three
//! questions on the hot path: which nodes claim a source path, which nodes
//! claim a target path, and what the ancestors of a node are.
use alloc::{collections::BTreeMap, format, string::String, vec::Vec};

use tracing::warn;

use crate::{
    error::SchemaError,
    options::Flatten,
    path::{Path, Segment},
    schema::{NodeId, Schema, SchemaDefinition, SchemaNode, Transformation},
};

/// One resolved value rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueStep {
    /// Values equal to one of these become null.
    Nullify(Vec<String>),
    /// Substitute into a template at `{{value}}`.
    Format(String),
    /// Multiply numeric values.
    Multiply(f64),
}

/// Value transformations of one node, resolved once at build time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTransforms {
    /// Name to emit instead of the node name.
    pub rename: Option<Segment>,
    /// Whether values of this node are dropped.
    pub remove: bool,
    /// Rewrites applied in declaration order.
    pub steps: Vec<ValueStep>,
}

impl ValueTransforms {
    fn resolve(transformations: &[Transformation]) -> Self {
        let mut resolved = Self::default();
        for transformation in transformations {
            match transformation {
                Transformation::Rename(name) => resolved.rename = Some(name.as_str().into()),
                Transformation::Remove => resolved.remove = true,
                Transformation::StringFormat(template) => {
                    resolved.steps.push(ValueStep::Format(template.clone()));
                }
                Transformation::Nullify(values) => {
                    resolved.steps.push(ValueStep::Nullify(values.clone()));
                }
                Transformation::Multiply(factor) => {
                    resolved.steps.push(ValueStep::Multiply(*factor));
                }
                Transformation::Flatten(_) => {}
            }
        }
        resolved
    }

    /// Whether values pass through untouched.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.rename.is_none() && !self.remove && self.steps.is_empty()
    }

    /// Applies the value rewrites.
    ///
    /// ```
    /// # use renest::{ValueStep, ValueTransforms};
    /// let transforms = ValueTransforms {
    ///     steps: vec![ValueStep::Multiply(0.5), ValueStep::Format("{{value}} m".into())],
    ///     ..Default::default()
    /// };
    /// assert_eq!(transforms.apply(Some("3".into())), Some("1.5 m".into()));
    /// assert_eq!(transforms.apply(None), None);
    /// ```
    #[must_use]
    pub fn apply(&self, mut value: Option<String>) -> Option<String> {
        for step in &self.steps {
            value = match (step, value) {
                (ValueStep::Nullify(nulls), Some(v)) if nulls.contains(&v) => None,
                (ValueStep::Format(template), Some(v)) => Some(template.replace("{{value}}", &v)),
                (ValueStep::Multiply(factor), Some(v)) => match v.trim().parse::<f64>() {
                    Ok(number) => Some(format!("{}", number * factor)),
                    Err(_) => {
                        warn!(value = %v, "cannot multiply non-numeric value");
                        Some(v)
                    }
                },
                (_, other) => other,
            };
        }
        value
    }
}

/// Source and target path indexes over a schema.
#[derive(Debug, Clone)]
pub struct SchemaMapping {
    schema: Schema,
    by_source: BTreeMap<Path, Vec<NodeId>>,
    by_target: BTreeMap<Path, Vec<NodeId>>,
    parents: Vec<Vec<NodeId>>,
    transforms: Vec<ValueTransforms>,
    array_source_paths: Vec<Path>,
    flatten: Option<Flatten>,
}

impl SchemaMapping {
    /// Builds the schema and its indexes.
    ///
    /// # Errors
    ///
    /// Propagates the [`SchemaError`] of [`Schema::build`].
    pub fn new(definition: &SchemaDefinition) -> Result<Self, SchemaError> {
        Ok(Self::from_schema(Schema::build(definition)?))
    }

    /// Indexes an already built schema.
    #[must_use]
    pub fn from_schema(schema: Schema) -> Self {
        let root = schema.root();
        let mut by_source: BTreeMap<Path, Vec<NodeId>> = BTreeMap::new();
        let mut by_target: BTreeMap<Path, Vec<NodeId>> = BTreeMap::new();
        let mut array_source_paths: Vec<Path> = Vec::new();

        for (id, node) in schema.nodes().filter(|(id, _)| *id != root) {
            by_target.entry(node.full_path().to_vec()).or_default().push(id);
            if node.source_path().is_none() {
                continue;
            }
            let source = node.full_source_path().to_vec();
            if node.is_array() && !array_source_paths.contains(&source) {
                array_source_paths.push(source.clone());
            }
            by_source.entry(source).or_default().push(id);
        }

        let parents = schema
            .nodes()
            .map(|(_, node)| {
                let mut chain = Vec::new();
                let mut next = node.parent();
                while let Some(parent) = next {
                    chain.push(parent);
                    next = schema.node(parent).parent();
                }
                chain
            })
            .collect();
        let transforms = schema
            .nodes()
            .map(|(_, node)| ValueTransforms::resolve(node.transformations()))
            .collect();
        let flatten = schema
            .node(root)
            .transformations()
            .iter()
            .find_map(|t| match t {
                Transformation::Flatten(flatten) => Some(flatten.clone()),
                _ => None,
            });

        Self {
            schema,
            by_source,
            by_target,
            parents,
            transforms,
            array_source_paths,
            flatten,
        }
    }

    /// The indexed schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The feature type node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.schema.root()
    }

    /// Shorthand for `self.schema().node(id)`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        self.schema.node(id)
    }

    /// All nodes claiming a source path, in declaration order.
    #[must_use]
    pub fn schemas_for_source_path(&self, path: &[Segment]) -> &[NodeId] {
        self.by_source.get(path).map_or(&[], Vec::as_slice)
    }

    /// The first node claiming a source path.
    #[must_use]
    pub fn schema_for_source_path(&self, path: &[Segment]) -> Option<NodeId> {
        self.schemas_for_source_path(path).first().copied()
    }

    /// All nodes claiming a target path, owners before their alternatives.
    #[must_use]
    pub fn schemas_for_target_path(&self, path: &[Segment]) -> &[NodeId] {
        self.by_target.get(path).map_or(&[], Vec::as_slice)
    }

    /// The first node claiming a target path.
    #[must_use]
    pub fn schema_for_target_path(&self, path: &[Segment]) -> Option<NodeId> {
        self.schemas_for_target_path(path).first().copied()
    }

    /// Ancestors of a node, immediate parent first and root last.
    #[must_use]
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.parents[id.index()]
    }

    /// Resolved value transformations of a node.
    #[must_use]
    pub fn transforms(&self, id: NodeId) -> &ValueTransforms {
        &self.transforms[id.index()]
    }

    /// Source paths of all array nodes, for the decoders' multiplicity
    /// trackers.
    #[must_use]
    pub fn array_source_paths(&self) -> &[Path] {
        &self.array_source_paths
    }

    /// Flattening declared on the root, if any.
    #[must_use]
    pub fn flatten(&self) -> Option<&Flatten> {
        self.flatten.as_ref()
    }

    /// Every indexed source path, sorted.
    pub fn source_paths(&self) -> impl Iterator<Item = &Path> {
        self.by_source.keys()
    }
}
