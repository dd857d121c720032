#![no_main]
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use renest::{
    DecoderOptions, Error, Flatten, FlattenMode, JsonFeatureDecoder, JsonLayout, PropertyType, SchemaDefinition,
    SchemaMapping, SchemaMappingTransformer, TokenRecorder, TransformerOptions, Validator,
};
use serde_json::{Map, Value};

const HEADER: usize = 1; // flags

// Member names the mapping below knows about, so generated documents reach
// the nesting logic instead of being skipped.
const NAMES: &[&str] = &["type", "features", "properties", "geometry", "coordinates", "a", "b", "c", "d"];

thread_local! {
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn with_rng<F, R>(f: F) -> R
where
    F: FnOnce(&mut SmallRng) -> R,
{
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

fn mapping() -> &'static Arc<SchemaMapping> {
    static MAPPING: OnceLock<Arc<SchemaMapping>> = OnceLock::new();
    MAPPING.get_or_init(|| {
        let string = |name: &str, source: &str| SchemaDefinition::new(name, PropertyType::String).with_source_path(source);
        let definition = SchemaDefinition::new("f", PropertyType::Object)
            .with_property(
                SchemaDefinition::new("title", PropertyType::String)
                    .with_coalesce(string("", "a"))
                    .with_coalesce(string("", "properties/a")),
            )
            .with_property(SchemaDefinition::new("geom", PropertyType::Geometry).with_source_path("geometry"))
            .with_property(
                SchemaDefinition::new("info", PropertyType::Object)
                    .with_source_path("b")
                    .with_property(string("x", "a"))
                    .with_property(SchemaDefinition::new("list", PropertyType::ValueArray).with_source_path("c")),
            )
            .with_property(
                SchemaDefinition::new("items", PropertyType::ObjectArray)
                    .with_concat(
                        SchemaDefinition::new("", PropertyType::ObjectArray)
                            .with_source_path("c")
                            .with_property(string("x", "a"))
                            .with_property(SchemaDefinition::new("tags", PropertyType::ValueArray).with_source_path("b")),
                    )
                    .with_concat(
                        SchemaDefinition::new("", PropertyType::ObjectArray)
                            .with_source_path("d")
                            .with_property(string("x", "a")),
                    ),
            );
        Arc::new(SchemaMapping::new(&definition).expect("fuzz mapping is valid"))
    })
}

fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    if size < HEADER || seed.is_multiple_of(10) {
        data[0] = with_rng(|rng| rng.next_u32() as u8 & 0x07);
        let limit = max_size - HEADER;
        HEADER + append_value(&mut data[HEADER..], size, limit)
    } else {
        fuzzer_mutate(data, size, max_size)
    }
}

fn append_value(data: &mut [u8], size: usize, limit: usize) -> usize {
    let value = loop {
        let s = with_rng(|rng| rng.random_range(size / 2..size * 2 + 1).min(limit));
        let bytes: Vec<u8> = with_rng(|rng| (0..s).map(|_| rng.random::<u8>()).collect());
        if let Ok(value) = ArbitraryValue::arbitrary(&mut arbitrary::Unstructured::new(&bytes)) {
            break value;
        }
    };

    let serialized = serde_json::to_vec(&value.0).expect("Failed to serialize arbitrary value");

    let len = serialized.len().min(limit);
    data[..len].copy_from_slice(&serialized[..len]);

    len
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

#[derive(Debug)]
struct ArbitraryValue(Value);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(16)? {
            0 => Value::Null,
            1 => Value::Bool(u.arbitrary()?),
            2 => {
                let n: f64 = u.arbitrary()?;
                Value::Number(serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?)
            }
            3..=5 => Value::String((*u.choose(NAMES)?).to_owned()),
            6..=10 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                Value::Array(elems.into_iter().map(|v| v.0).collect())
            }
            _ => {
                let mut map = Map::new();
                for _ in 0..u.choose_index(5)? {
                    let name = *u.choose(NAMES)?;
                    map.insert(name.to_owned(), ArbitraryValue::arbitrary(u)?.0);
                }
                Value::Object(map)
            }
        };
        Ok(ArbitraryValue(value))
    }
}

fn pipeline(data: &[u8]) {
    let Some((&flags, json)) = data.split_first() else {
        return;
    };

    let mapping = mapping();
    let layout = if flags & 1 == 0 { JsonLayout::Features } else { JsonLayout::GeoJson };
    let flatten = match (flags >> 1) & 3 {
        0 => None,
        1 => Some(FlattenMode::All),
        2 => Some(FlattenMode::Objects),
        _ => Some(FlattenMode::Arrays),
    }
    .map(|include| Flatten {
        separator: ".".into(),
        include,
    });

    let mut decoder = JsonFeatureDecoder::for_mapping(
        mapping,
        &DecoderOptions {
            layout,
            ..Default::default()
        },
    );
    let mut transformer = SchemaMappingTransformer::new(
        Arc::clone(mapping),
        &TransformerOptions { flatten },
        Validator::new(TokenRecorder::default()),
    );
    // Malformed input may fail to decode, but must never produce an
    // unbalanced stream.
    if let Err(error @ Error::Structural(_)) = decoder.decode_slice(json, &mut transformer) {
        panic!("structural violation: {error}");
    }
}

fuzz_target!(|data: &[u8]| pipeline(data));
