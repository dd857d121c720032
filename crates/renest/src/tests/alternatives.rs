use insta::assert_snapshot;
use rstest::rstest;

use super::{Feed, feature_type, string, transformer};
use crate::{
    options::TransformerOptions,
    schema::{PropertyType, SchemaDefinition},
};

fn label() -> SchemaDefinition {
    SchemaDefinition::new("label", PropertyType::String)
        .with_coalesce(string("", "short"))
        .with_coalesce(string("", "long"))
}

#[rstest]
#[case::first_wins(Some("S"), Some("L"), "Value [label] \"S\" STRING")]
#[case::null_falls_through(None, Some("L"), "Value [label] \"L\" STRING")]
fn coalesce_emits_first_non_null(
    #[case] short: Option<&str>,
    #[case] long: Option<&str>,
    #[case] expected: &str,
) {
    let mut feed = Feed::new(transformer(&feature_type().with_property(label()), &TransformerOptions::default()));
    feed.value(&["short"], &[], short).value(&["long"], &[], long);
    assert_eq!(feed.lines(), ["Start", "FeatureStart", expected, "FeatureEnd", "End"]);
}

#[test]
fn coalesce_is_decided_per_element() {
    let definition = feature_type().with_property(
        SchemaDefinition::new("items", PropertyType::ObjectArray)
            .with_source_path("items")
            .with_property(
                SchemaDefinition::new("label", PropertyType::String)
                    .with_coalesce(string("", "a"))
                    .with_coalesce(string("", "b")),
            ),
    );
    let mut feed = Feed::new(transformer(&definition, &TransformerOptions::default()));
    feed.value(&["items", "a"], &[1], Some("A1"))
        .value(&["items", "b"], &[1], Some("B1"))
        .value(&["items", "b"], &[2], Some("B2"));
    assert_snapshot!(feed.trace(), @r#"
    Start
    FeatureStart
    ArrayStart [items]
    ObjectStart [items]
    Value [items, label] "A1" STRING
    ObjectEnd [items]
    ObjectStart [items]
    Value [items, label] "B2" STRING
    ObjectEnd [items]
    ArrayEnd [items]
    FeatureEnd
    End
    "#);
}

fn address() -> SchemaDefinition {
    SchemaDefinition::new("address", PropertyType::Object)
        .with_coalesce(
            SchemaDefinition::new("", PropertyType::Object)
                .with_source_path("home")
                .with_property(string("city", "city"))
                .with_property(string("street", "street")),
        )
        .with_coalesce(
            SchemaDefinition::new("", PropertyType::Object)
                .with_source_path("work")
                .with_property(string("city", "city")),
        )
}

#[test]
fn first_object_alternative_with_a_property_wins() {
    let mut feed = Feed::new(transformer(&feature_type().with_property(address()), &TransformerOptions::default()));
    feed.object(&["home"], &[])
        .value(&["home", "city"], &[], Some("H"))
        .value(&["work", "city"], &[], Some("W"))
        .value(&["home", "street"], &[], Some("S"))
        .object_end(&["home"], &[]);
    assert_snapshot!(feed.trace(), @r#"
    Start
    FeatureStart
    ObjectStart [address]
    Value [address, city] "H" STRING
    Value [address, street] "S" STRING
    ObjectEnd [address]
    FeatureEnd
    End
    "#);
}

#[test]
fn object_coalesce_is_decided_per_element() {
    let definition = feature_type().with_property(
        SchemaDefinition::new("items", PropertyType::ObjectArray)
            .with_source_path("items")
            .with_property(address()),
    );
    let mut feed = Feed::new(transformer(&definition, &TransformerOptions::default()));
    feed.value(&["items", "work", "city"], &[1], Some("W1"))
        .value(&["items", "home", "city"], &[1], Some("H1"))
        .value(&["items", "home", "city"], &[2], Some("H2"));
    assert_snapshot!(feed.trace(), @r#"
    Start
    FeatureStart
    ArrayStart [items]
    ObjectStart [items]
    ObjectStart [items, address]
    Value [items, address, city] "W1" STRING
    ObjectEnd [items, address]
    ObjectEnd [items]
    ObjectStart [items]
    ObjectStart [items, address]
    Value [items, address, city] "H2" STRING
    ObjectEnd [items, address]
    ObjectEnd [items]
    ArrayEnd [items]
    FeatureEnd
    End
    "#);
}

fn entries() -> SchemaDefinition {
    feature_type().with_property(
        SchemaDefinition::new("entries", PropertyType::ObjectArray)
            .with_concat(
                SchemaDefinition::new("", PropertyType::ObjectArray)
                    .with_source_path("roads")
                    .with_property(string("name", "name")),
            )
            .with_concat(
                SchemaDefinition::new("", PropertyType::ObjectArray)
                    .with_source_path("rails")
                    .with_property(string("name", "name")),
            ),
    )
}

#[test]
fn concat_alternatives_share_one_array() {
    let mut feed = Feed::new(transformer(&entries(), &TransformerOptions::default()));
    feed.value(&["roads", "name"], &[1], Some("A"))
        .value(&["roads", "name"], &[2], Some("B"))
        .value(&["rails", "name"], &[2], Some("C"));
    // the switch to `rails` opens a new element even though the index
    // repeats
    assert_snapshot!(feed.trace(), @r#"
    Start
    FeatureStart
    ArrayStart [entries]
    ObjectStart [entries]
    Value [entries, name] "A" STRING
    ObjectEnd [entries]
    ObjectStart [entries]
    Value [entries, name] "B" STRING
    ObjectEnd [entries]
    ObjectStart [entries]
    Value [entries, name] "C" STRING
    ObjectEnd [entries]
    ArrayEnd [entries]
    FeatureEnd
    End
    "#);
}

#[test]
fn concat_alternative_keeps_its_own_element() {
    let mut feed = Feed::new(transformer(&entries(), &TransformerOptions::default()));
    feed.value(&["rails", "name"], &[1], Some("C"))
        .object(&["rails"], &[1])
        .value(&["rails", "name"], &[1], Some("D"));
    let starts = feed
        .lines()
        .iter()
        .filter(|line| line.starts_with("ObjectStart"))
        .count();
    assert_eq!(starts, 1);
}
