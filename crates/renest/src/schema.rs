//! Target schema configuration and its validated, arena-indexed tree.
//!
//! A [`SchemaDefinition`] is the declarative input: a tree of named
//! properties with types, optional source paths and alternatives. It is
//! consumed once by [`Schema::build`], which checks it and resolves every
//! node's target path, source path and array depth. The resulting
//! [`Schema`] is immutable.
//!
//! ```
//! use renest::{path, PropertyType, Schema, SchemaDefinition, ValueType};
//!
//! let definition = SchemaDefinition::new("building", PropertyType::Object).with_property(
//!     SchemaDefinition::new("address", PropertyType::Object)
//!         .with_source_path("addr")
//!         .with_property(SchemaDefinition::new("street", PropertyType::String).with_source_path("str")),
//! );
//! let schema = Schema::build(&definition).unwrap();
//! let (_, street) = schema.nodes().last().unwrap();
//! assert_eq!(street.full_path(), path!["address", "street"].as_slice());
//! assert_eq!(street.full_source_path(), path!["addr", "str"].as_slice());
//! assert_eq!(street.value_type(), Some(ValueType::String));
//! ```
use alloc::{string::String, vec, vec::Vec};
use core::fmt;

use crate::{
    error::SchemaError,
    options::Flatten,
    path::{Path, Segment, parse_source_path},
};

/// Type of a scalar value, both in the schema and on `Value` tokens.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Text.
    #[default]
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// `true` or `false`.
    Boolean,
    /// Timestamp.
    Datetime,
    /// Calendar date.
    Date,
    /// Untyped; the source value type is kept.
    Value,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Datetime => "DATETIME",
            Self::Date => "DATE",
            Self::Value => "VALUE",
        })
    }
}

/// Declared `type` of a property in a [`SchemaDefinition`].
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Date,
    Value,
    Geometry,
    #[default]
    Object,
    ObjectArray,
    ValueArray,
}

impl PropertyType {
    /// Resolves the declared type into a [`SchemaKind`]. `value_type` only
    /// matters for `VALUE` and `VALUE_ARRAY`.
    #[must_use]
    pub fn kind(self, value_type: Option<ValueType>) -> SchemaKind {
        match self {
            Self::String => SchemaKind::Value(ValueType::String),
            Self::Integer => SchemaKind::Value(ValueType::Integer),
            Self::Float => SchemaKind::Value(ValueType::Float),
            Self::Boolean => SchemaKind::Value(ValueType::Boolean),
            Self::Datetime => SchemaKind::Value(ValueType::Datetime),
            Self::Date => SchemaKind::Value(ValueType::Date),
            Self::Value => SchemaKind::Value(value_type.unwrap_or(ValueType::Value)),
            Self::Geometry => SchemaKind::Geometry,
            Self::Object => SchemaKind::Object,
            Self::ObjectArray => SchemaKind::ObjectArray,
            Self::ValueArray => SchemaKind::ValueArray(value_type.unwrap_or(ValueType::String)),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Datetime => "DATETIME",
            Self::Date => "DATE",
            Self::Value => "VALUE",
            Self::Geometry => "GEOMETRY",
            Self::Object => "OBJECT",
            Self::ObjectArray => "OBJECT_ARRAY",
            Self::ValueArray => "VALUE_ARRAY",
        }
    }
}

/// Resolved kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// A scalar of the given type.
    Value(ValueType),
    /// A geometry; its content is passed through as a unit.
    Geometry,
    /// A nested object.
    Object,
    /// A repeated nested object.
    ObjectArray,
    /// A repeated scalar of the given type.
    ValueArray(ValueType),
}

impl SchemaKind {
    /// `OBJECT_ARRAY` or `VALUE_ARRAY`.
    #[must_use]
    pub fn is_array(self) -> bool {
        matches!(self, Self::ObjectArray | Self::ValueArray(_))
    }

    /// `OBJECT` or `OBJECT_ARRAY`.
    #[must_use]
    pub fn is_object(self) -> bool {
        matches!(self, Self::Object | Self::ObjectArray)
    }

    /// Scalar or repeated scalar.
    #[must_use]
    pub fn is_value(self) -> bool {
        matches!(self, Self::Value(_) | Self::ValueArray(_))
    }

    /// The scalar type carried by value kinds.
    #[must_use]
    pub fn value_type(self) -> Option<ValueType> {
        match self {
            Self::Value(value_type) | Self::ValueArray(value_type) => Some(value_type),
            Self::Geometry | Self::Object | Self::ObjectArray => None,
        }
    }
}

/// Special meaning of a property for encoders and queries.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Role {
    Id,
    Type,
    PrimaryGeometry,
    PrimaryInstant,
    PrimaryIntervalStart,
    PrimaryIntervalEnd,
    SecondaryGeometry,
}

/// Simple feature geometry types.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    Any,
}

impl GeometryType {
    /// Parses a GeoJSON `type` member.
    ///
    /// ```
    /// # use renest::GeometryType;
    /// assert_eq!(GeometryType::from_geojson("MultiPolygon"), Some(GeometryType::MultiPolygon));
    /// assert_eq!(GeometryType::from_geojson("Feature"), None);
    /// ```
    #[must_use]
    pub fn from_geojson(name: &str) -> Option<Self> {
        Some(match name {
            "Point" => Self::Point,
            "MultiPoint" => Self::MultiPoint,
            "LineString" => Self::LineString,
            "MultiLineString" => Self::MultiLineString,
            "Polygon" => Self::Polygon,
            "MultiPolygon" => Self::MultiPolygon,
            "GeometryCollection" => Self::GeometryCollection,
            _ => return None,
        })
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Point => "POINT",
            Self::MultiPoint => "MULTI_POINT",
            Self::LineString => "LINE_STRING",
            Self::MultiLineString => "MULTI_LINE_STRING",
            Self::Polygon => "POLYGON",
            Self::MultiPolygon => "MULTI_POLYGON",
            Self::GeometryCollection => "GEOMETRY_COLLECTION",
            Self::Any => "ANY",
        })
    }
}

/// A per-property transformation applied by the schema-mapping transformer.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
#[derive(Debug, Clone, PartialEq)]
pub enum Transformation {
    /// Emit the value under another name.
    Rename(String),
    /// Drop the value.
    Remove,
    /// Substitute the value into a template; `{{value}}` marks the spot.
    StringFormat(String),
    /// Replace any of the listed values with null.
    Nullify(Vec<String>),
    /// Multiply numeric values by a factor, e.g. to convert units.
    Multiply(f64),
    /// Flatten nested objects and/or arrays into composite names. Only
    /// valid on the root.
    Flatten(Flatten),
}

/// Declarative description of one property of the target schema.
///
/// The root describes the feature type itself. Its name is the feature
/// type name and it contributes no segment to target paths.
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    /// Property name, the segment it adds to target paths.
    pub name: String,
    /// Declared type.
    #[cfg_attr(any(test, feature = "serde"), serde(rename = "type"))]
    pub kind: PropertyType,
    /// Element type for `VALUE` and `VALUE_ARRAY`.
    pub value_type: Option<ValueType>,
    /// Source path relative to the parent's, segments separated by `/`.
    pub source_path: Option<String>,
    /// Nested properties of objects.
    pub properties: Vec<SchemaDefinition>,
    /// Groups of properties read from another source location but emitted
    /// as properties of this node.
    pub merge: Vec<SchemaDefinition>,
    /// Alternative array shapes streamed one after another into this array.
    pub concat: Vec<SchemaDefinition>,
    /// Alternative value sources; the first non-null one wins.
    pub coalesce: Vec<SchemaDefinition>,
    /// Special meaning of the property.
    pub role: Option<Role>,
    /// Declared geometry type of `GEOMETRY` properties.
    pub geometry_type: Option<GeometryType>,
    /// Transformations applied to emitted values.
    pub transformations: Vec<Transformation>,
}

impl SchemaDefinition {
    /// Creates a definition with the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// Sets the source path.
    #[must_use]
    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    /// Sets the value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Appends a nested property.
    #[must_use]
    pub fn with_property(mut self, property: SchemaDefinition) -> Self {
        self.properties.push(property);
        self
    }

    /// Appends a merge group.
    #[must_use]
    pub fn with_merge(mut self, group: SchemaDefinition) -> Self {
        self.merge.push(group);
        self
    }

    /// Appends a concat alternative.
    #[must_use]
    pub fn with_concat(mut self, alternative: SchemaDefinition) -> Self {
        self.concat.push(alternative);
        self
    }

    /// Appends a coalesce alternative.
    #[must_use]
    pub fn with_coalesce(mut self, alternative: SchemaDefinition) -> Self {
        self.coalesce.push(alternative);
        self
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets the declared geometry type.
    #[must_use]
    pub fn with_geometry_type(mut self, geometry_type: GeometryType) -> Self {
        self.geometry_type = Some(geometry_type);
        self
    }

    /// Appends a transformation.
    #[must_use]
    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }
}

/// Index of a node in its [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in [`Schema::nodes`].
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// How an alternative relates to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeKind {
    /// First non-null alternative wins.
    Coalesce,
    /// All alternatives are streamed into one array.
    Concat,
}

/// Marks a node as one alternative shape of another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alternative {
    /// The node whose target path the alternative shares.
    pub owner: NodeId,
    /// Coalesce or concat.
    pub kind: AlternativeKind,
    /// Declaration position among the owner's alternatives.
    pub index: usize,
}

/// One validated node of a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    name: Segment,
    kind: SchemaKind,
    role: Option<Role>,
    geometry_type: Option<GeometryType>,
    source_path: Option<Path>,
    full_source_path: Path,
    full_path: Path,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alternatives: Vec<NodeId>,
    alternative: Option<Alternative>,
    arrays_above: usize,
    transformations: Vec<Transformation>,
}

#[allow(missing_docs)]
impl SchemaNode {
    #[must_use]
    pub fn name(&self) -> &Segment {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[must_use]
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry_type
    }

    /// The declared source path, if the node is addressable in the source.
    #[must_use]
    pub fn source_path(&self) -> Option<&[Segment]> {
        self.source_path.as_deref()
    }

    /// The declared source path prefixed by every ancestor's.
    #[must_use]
    pub fn full_source_path(&self) -> &[Segment] {
        &self.full_source_path
    }

    /// Path of the node in the target shape. Empty for the root.
    #[must_use]
    pub fn full_path(&self) -> &[Segment] {
        &self.full_path
    }

    /// Structural parent. Alternatives report the parent of their owner.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Coalesce and concat alternatives of this node, in declaration order.
    #[must_use]
    pub fn alternatives(&self) -> &[NodeId] {
        &self.alternatives
    }

    #[must_use]
    pub fn alternative(&self) -> Option<Alternative> {
        self.alternative
    }

    /// Number of array ancestors, i.e. how many entries of an index vector
    /// address the enclosing repetitions.
    #[must_use]
    pub fn arrays_above(&self) -> usize {
        self.arrays_above
    }

    #[must_use]
    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind.is_array()
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        self.kind.is_object()
    }

    #[must_use]
    pub fn is_value(&self) -> bool {
        self.kind.is_value()
    }

    #[must_use]
    pub fn is_geometry(&self) -> bool {
        self.kind == SchemaKind::Geometry
    }

    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.kind.value_type()
    }

    /// Whether this node is a concat alternative.
    #[must_use]
    pub fn is_concat_alternative(&self) -> bool {
        self.alternative
            .is_some_and(|alternative| alternative.kind == AlternativeKind::Concat)
    }
}

/// An immutable, validated schema tree stored in an arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
}

impl Schema {
    /// Validates `definition` and resolves paths for every node.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a property has no name, declares an
    /// invalid source path, nests properties below a non-object, carries
    /// alternatives that do not fit its type, or declares a flatten
    /// transformation below the root.
    pub fn build(definition: &SchemaDefinition) -> Result<Self, SchemaError> {
        let mut schema = Self { nodes: Vec::new() };
        schema.add(definition, None, &[], &[], None)?;
        Ok(schema)
    }

    /// The feature type node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Looks up a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this schema.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// All nodes in depth-first declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SchemaNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Number of nodes, alternatives included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a schema has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn add(
        &mut self,
        definition: &SchemaDefinition,
        parent: Option<NodeId>,
        target_prefix: &[Segment],
        source_prefix: &[Segment],
        alternative: Option<Alternative>,
    ) -> Result<NodeId, SchemaError> {
        let is_root = parent.is_none() && alternative.is_none();
        let kind = definition.kind.kind(definition.value_type);
        let name: Segment = match alternative {
            Some(alternative) => self.node(alternative.owner).name.clone(),
            None => definition.name.as_str().into(),
        };

        if !is_root && name.is_empty() {
            let parent_name = parent.map(|p| String::from(&*self.node(p).name));
            return Err(SchemaError::EmptyName(parent_name.unwrap_or_default()));
        }
        if !kind.is_object() && !(definition.properties.is_empty() && definition.merge.is_empty()) {
            return Err(SchemaError::UnexpectedProperties {
                name: String::from(&*name),
                kind: definition.kind.as_str(),
            });
        }
        let coalesces = matches!(kind, SchemaKind::Value(_) | SchemaKind::Object);
        let misplaced_coalesce = alternative.is_some_and(|a| {
            let owner = self.node(a.owner).kind;
            a.kind == AlternativeKind::Coalesce
                && matches!(owner, SchemaKind::Object) != matches!(kind, SchemaKind::Object)
        }) || (!definition.coalesce.is_empty() && !coalesces);
        if misplaced_coalesce {
            return Err(SchemaError::InvalidAlternatives {
                name: String::from(&*name),
                operation: "coalesce",
            });
        }
        let misplaced_concat = alternative
            .is_some_and(|a| a.kind == AlternativeKind::Concat && !kind.is_array())
            || (!definition.concat.is_empty() && !kind.is_array());
        if misplaced_concat {
            return Err(SchemaError::InvalidAlternatives {
                name: String::from(&*name),
                operation: "concat",
            });
        }
        let flattens = definition
            .transformations
            .iter()
            .any(|t| matches!(t, Transformation::Flatten(_)));
        if flattens && !is_root {
            return Err(SchemaError::FlattenNotAtRoot(String::from(&*name)));
        }

        let source_path = definition
            .source_path
            .as_deref()
            .map(parse_source_path)
            .transpose()?;
        let mut full_source_path = source_prefix.to_vec();
        if let Some(declared) = &source_path {
            full_source_path.extend(declared.iter().cloned());
        }
        let full_path = if is_root {
            vec![]
        } else if alternative.is_some() {
            target_prefix.to_vec()
        } else {
            let mut path = target_prefix.to_vec();
            path.push(name.clone());
            path
        };
        let arrays_above = parent.map_or(0, |p| {
            let parent = self.node(p);
            parent.arrays_above + usize::from(parent.is_array())
        });

        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            name,
            kind,
            role: definition.role,
            geometry_type: definition.geometry_type,
            source_path,
            full_source_path: full_source_path.clone(),
            full_path: full_path.clone(),
            parent,
            children: Vec::new(),
            alternatives: Vec::new(),
            alternative,
            arrays_above,
            transformations: definition.transformations.clone(),
        });
        if let (Some(parent), None) = (parent, alternative) {
            self.nodes[parent.0].children.push(id);
        }

        for property in &definition.properties {
            self.add(property, Some(id), &full_path, &full_source_path, None)?;
        }
        for group in &definition.merge {
            let mut prefix = full_source_path.clone();
            if let Some(raw) = group.source_path.as_deref() {
                prefix.extend(parse_source_path(raw)?);
            }
            for property in &group.properties {
                self.add(property, Some(id), &full_path, &prefix, None)?;
            }
        }
        let alternatives = definition
            .coalesce
            .iter()
            .map(|d| (d, AlternativeKind::Coalesce))
            .chain(definition.concat.iter().map(|d| (d, AlternativeKind::Concat)));
        for (index, (alternative, kind)) in alternatives.enumerate() {
            let marker = Alternative {
                owner: id,
                kind,
                index,
            };
            let alternative_id =
                self.add(alternative, parent, &full_path, &full_source_path, Some(marker))?;
            self.nodes[id.0].alternatives.push(alternative_id);
        }

        Ok(id)
    }
}
