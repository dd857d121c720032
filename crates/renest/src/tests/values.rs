use alloc::{string::String, sync::Arc, vec, vec::Vec};

use rstest::rstest;

use super::{Feed, feature_type, string, transformer};
use crate::{
    error::Error,
    event::{Context, FeatureEventHandler},
    mapping::SchemaMapping,
    options::TransformerOptions,
    path::Segment,
    schema::{PropertyType, SchemaDefinition, Transformation, ValueType},
    transformer::SchemaMappingTransformer,
};

#[rstest]
#[case::rename(Transformation::Rename("label".into()), Some("Value [label] \"x\" STRING"))]
#[case::format(Transformation::StringFormat("<{{value}}>".into()), Some("Value [name] \"<x>\" STRING"))]
#[case::nullify(Transformation::Nullify(vec!["x".into()]), Some("Value [name] null STRING"))]
#[case::remove(Transformation::Remove, None)]
fn transformations_rewrite_values(#[case] transformation: Transformation, #[case] expected: Option<&str>) {
    let definition = feature_type().with_property(string("name", "name").with_transformation(transformation));
    let mut feed = Feed::new(transformer(&definition, &TransformerOptions::default()));
    feed.value(&["name"], &[], Some("x"));
    let lines = feed.lines();
    assert_eq!(lines.get(2).map(String::as_str), expected.or(Some("FeatureEnd")));
}

#[test]
fn rename_keeps_the_enclosing_object() {
    let definition = feature_type().with_property(
        SchemaDefinition::new("address", PropertyType::Object)
            .with_property(string("city", "city").with_transformation(Transformation::Rename("town".into()))),
    );
    let mut feed = Feed::new(transformer(&definition, &TransformerOptions::default()));
    feed.value(&["city"], &[], Some("Bonn"));
    assert_eq!(feed.lines()[3], "Value [address, town] \"Bonn\" STRING");
}

#[test]
fn multiply_converts_units() {
    let definition = feature_type().with_property(
        SchemaDefinition::new("height", PropertyType::Float)
            .with_source_path("h")
            .with_transformation(Transformation::Multiply(0.5)),
    );
    let mut feed = Feed::new(transformer(&definition, &TransformerOptions::default()));
    feed.value(&["h"], &[], Some("10"))
        .value(&["h"], &[], Some("tall"));
    let lines = feed.lines();
    assert_eq!(lines[2..4], ["Value [height] \"5\" FLOAT", "Value [height] \"tall\" FLOAT"]);
}

#[rstest]
#[case::declared(PropertyType::Integer, None, ValueType::Integer)]
#[case::untyped(PropertyType::Value, None, ValueType::Boolean)]
#[case::typed_value(PropertyType::Value, Some(ValueType::Date), ValueType::Date)]
fn schema_type_wins_over_source_type(
    #[case] kind: PropertyType,
    #[case] value_type: Option<ValueType>,
    #[case] expected: ValueType,
) {
    let mut property = SchemaDefinition::new("v", PropertyType::String).with_source_path("v");
    property.kind = kind;
    property.value_type = value_type;
    let mut transformer = transformer(&feature_type().with_property(property), &TransformerOptions::default());

    let mut ctx = Context::default();
    transformer.on_feature_start(&mut ctx).unwrap();
    ctx.set_path(&crate::path!["v"]);
    ctx.value = Some("true".into());
    ctx.value_type = ValueType::Boolean;
    transformer.on_value(&mut ctx).unwrap();

    let recorder = transformer.into_inner().into_inner();
    assert!(matches!(
        &recorder.tokens()[1],
        crate::Token::Value { value_type, .. } if *value_type == expected
    ));
}

#[derive(Default)]
struct FeatureTypes(Vec<Option<Segment>>);

impl FeatureEventHandler for FeatureTypes {
    fn on_feature_start(&mut self, context: &mut Context) -> Result<(), Error> {
        self.0.push(context.feature_type.clone());
        Ok(())
    }
}

#[test]
fn feature_type_comes_from_the_schema_root() {
    let mapping = SchemaMapping::new(&feature_type()).unwrap();
    let mut transformer =
        SchemaMappingTransformer::new(Arc::new(mapping), &TransformerOptions::default(), FeatureTypes::default());
    let mut ctx = Context::default();
    ctx.feature_type = Some("source".into());
    transformer.on_feature_start(&mut ctx).unwrap();
    transformer.on_feature_end(&mut ctx).unwrap();
    assert_eq!(transformer.into_inner().0, [Some(Segment::from("f"))]);
}
