#![expect(missing_docs)]

use std::sync::Arc;

use insta::assert_snapshot;
use renest::{
    DecoderOptions, NullPolicy, PropertyType, Row, RowDecoder, SchemaDefinition, SchemaMapping,
    SchemaMappingTransformer, TokenRecorder, TransformerOptions, Validator, path,
};

fn building() -> SchemaDefinition {
    SchemaDefinition::new("building", PropertyType::Object)
        .with_source_path("/building")
        .with_property(SchemaDefinition::new("id", PropertyType::Integer).with_source_path("oid"))
        .with_property(SchemaDefinition::new("name", PropertyType::String).with_source_path("name"))
        .with_property(
            SchemaDefinition::new("parts", PropertyType::ObjectArray)
                .with_source_path("parts")
                .with_property(SchemaDefinition::new("kind", PropertyType::String).with_source_path("kind")),
        )
}

fn transform(rows: Vec<Row>, options: &DecoderOptions) -> String {
    let mapping = Arc::new(SchemaMapping::new(&building()).unwrap());
    let mut decoder = RowDecoder::for_mapping(&mapping, options);
    let mut transformer = SchemaMappingTransformer::new(
        Arc::clone(&mapping),
        &TransformerOptions::default(),
        Validator::new(TokenRecorder::default()),
    );
    decoder.decode_all(rows, &mut transformer).unwrap();
    transformer.into_inner().into_inner().trace()
}

#[test]
fn joined_rows_become_nested_features() {
    let trace = transform(
        vec![
            Row::new(path!["building"], "1")
                .with_column("oid", Some("1"))
                .with_column("name", Some("A")),
            Row::new(path!["building", "parts"], "p1").with_column("kind", Some("roof")),
            Row::new(path!["building", "parts"], "p2").with_column("kind", Some("wall")),
            Row::new(path!["building"], "2")
                .with_column("oid", Some("2"))
                .with_column("name", Some("B")),
        ],
        &DecoderOptions::default(),
    );
    assert_snapshot!(trace, @r#"
    Start
    FeatureStart
    Value [id] "1" INTEGER
    Value [name] "A" STRING
    ArrayStart [parts]
    ObjectStart [parts]
    Value [parts, kind] "roof" STRING
    ObjectEnd [parts]
    ObjectStart [parts]
    Value [parts, kind] "wall" STRING
    ObjectEnd [parts]
    ArrayEnd [parts]
    FeatureEnd
    FeatureStart
    Value [id] "2" INTEGER
    Value [name] "B" STRING
    FeatureEnd
    End
    "#);
}

#[test]
fn null_columns_follow_the_policy() {
    let rows = || {
        vec![
            Row::new(path!["building"], "1")
                .with_column("oid", Some("1"))
                .with_column("name", None),
        ]
    };
    let emitted = transform(rows(), &DecoderOptions::default());
    let skipped = transform(
        rows(),
        &DecoderOptions {
            null_policy: NullPolicy::Skip,
            ..Default::default()
        },
    );
    let substituted = transform(
        rows(),
        &DecoderOptions {
            null_policy: NullPolicy::Substitute("-".into()),
            ..Default::default()
        },
    );
    assert!(emitted.contains("Value [name] null STRING"));
    assert!(!skipped.contains("[name]"));
    assert!(substituted.contains("Value [name] \"-\" STRING"));
}
