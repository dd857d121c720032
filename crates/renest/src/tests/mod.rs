mod alternatives;
mod values;

use alloc::{string::String, sync::Arc, vec::Vec};

use crate::{
    event::{Context, FeatureEventHandler, TokenRecorder},
    mapping::SchemaMapping,
    options::TransformerOptions,
    path::{Path, Segment},
    schema::{PropertyType, SchemaDefinition, ValueType},
    transformer::SchemaMappingTransformer,
    validator::Validator,
};

pub(crate) type Checked = SchemaMappingTransformer<Validator<TokenRecorder>>;

/// A string property read from `source`.
pub(crate) fn string(name: &str, source: &str) -> SchemaDefinition {
    SchemaDefinition::new(name, PropertyType::String).with_source_path(source)
}

pub(crate) fn feature_type() -> SchemaDefinition {
    SchemaDefinition::new("f", PropertyType::Object)
}

pub(crate) fn transformer(definition: &SchemaDefinition, options: &TransformerOptions) -> Checked {
    let mapping = SchemaMapping::new(definition).unwrap();
    SchemaMappingTransformer::new(Arc::new(mapping), options, Validator::new(TokenRecorder::default()))
}

/// Pushes hand-written source tokens of a single feature into a handler.
pub(crate) struct Feed<H> {
    handler: H,
    context: Context,
}

impl<H: FeatureEventHandler> Feed<H> {
    pub(crate) fn new(mut handler: H) -> Self {
        let mut context = Context::default();
        handler.on_start(&mut context).unwrap();
        handler.on_feature_start(&mut context).unwrap();
        Self { handler, context }
    }

    fn at(&mut self, path: &[&str], indexes: &[usize]) -> &mut Context {
        let path: Path = path.iter().copied().map(Segment::from).collect();
        self.context.set_path(&path);
        self.context.indexes = indexes.to_vec();
        &mut self.context
    }

    pub(crate) fn value(&mut self, path: &[&str], indexes: &[usize], value: Option<&str>) -> &mut Self {
        self.at(path, indexes);
        self.context.value = value.map(String::from);
        self.context.value_type = ValueType::String;
        self.handler.on_value(&mut self.context).unwrap();
        self
    }

    pub(crate) fn object(&mut self, path: &[&str], indexes: &[usize]) -> &mut Self {
        self.at(path, indexes);
        self.handler.on_object_start(&mut self.context).unwrap();
        self
    }

    pub(crate) fn object_end(&mut self, path: &[&str], indexes: &[usize]) -> &mut Self {
        self.at(path, indexes);
        self.handler.on_object_end(&mut self.context).unwrap();
        self
    }

    pub(crate) fn array(&mut self, path: &[&str], indexes: &[usize]) -> &mut Self {
        self.at(path, indexes);
        self.handler.on_array_start(&mut self.context).unwrap();
        self
    }

    pub(crate) fn array_end(&mut self, path: &[&str], indexes: &[usize]) -> &mut Self {
        self.at(path, indexes);
        self.handler.on_array_end(&mut self.context).unwrap();
        self
    }

    /// Ends the feature and the stream.
    pub(crate) fn finish(mut self) -> H {
        self.context.set_path(&[]);
        self.context.indexes.clear();
        self.handler.on_feature_end(&mut self.context).unwrap();
        self.handler.on_end(&mut self.context).unwrap();
        self.handler
    }
}

impl Feed<Checked> {
    pub(crate) fn trace(self) -> String {
        self.finish().into_inner().into_inner().trace()
    }

    pub(crate) fn lines(self) -> Vec<String> {
        self.trace().lines().map(String::from).collect()
    }
}
