use alloc::{string::String, vec::Vec};

use tracing::debug;

#[cfg(feature = "json")]
use super::json::JsonTokenizer;
use super::{PropertiesDecoder, RawToken, Scalar, TokenSource, unexpected};
use crate::{
    error::{DecodeError, Error},
    event::{Context, FeatureEventHandler},
    mapping::SchemaMapping,
    options::{DecoderOptions, JsonLayout},
    path::Segment,
    schema::{GeometryType, ValueType},
};

/// Nesting below which a buffered geometry is rejected.
const MAX_GEOMETRY_DEPTH: usize = 16;

/// Decodes JSON documents into canonical feature streams.
///
/// With [`JsonLayout::Features`] a top-level object is a single feature and
/// a top-level array holds one feature per element. With
/// [`JsonLayout::GeoJson`] the input is a `FeatureCollection` or a single
/// `Feature`: `id` becomes the value `[id]`, the members of `properties`
/// are decoded without the `properties` segment, and `geometry` becomes an
/// object at `[geometry]` carrying its geometry type, with the coordinate
/// arrays nested inside.
#[derive(Debug, Clone)]
pub struct JsonFeatureDecoder {
    layout: JsonLayout,
    properties: PropertiesDecoder,
    context: Context,
}

impl JsonFeatureDecoder {
    /// Creates a decoder for the given options.
    #[must_use]
    pub fn new(options: &DecoderOptions) -> Self {
        Self {
            layout: options.layout,
            properties: PropertiesDecoder::new(options),
            context: Context::default(),
        }
    }

    /// Creates a decoder that also knows the array paths of `mapping`.
    #[must_use]
    pub fn for_mapping(mapping: &SchemaMapping, options: &DecoderOptions) -> Self {
        let mut options = options.clone();
        for path in mapping.array_source_paths() {
            if !options.array_paths.contains(path) {
                options.array_paths.push(path.clone());
            }
        }
        Self::new(&options)
    }

    /// The context of the last emitted token.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Decodes one JSON document.
    ///
    /// ```
    /// use renest::{DecoderOptions, JsonFeatureDecoder, JsonLayout, TokenRecorder};
    ///
    /// let mut decoder = JsonFeatureDecoder::new(&DecoderOptions {
    ///     layout: JsonLayout::GeoJson,
    ///     ..Default::default()
    /// });
    /// let mut recorder = TokenRecorder::default();
    /// decoder
    ///     .decode_slice(
    ///         br#"{"type": "Feature", "id": 7, "properties": {"name": "A"}, "geometry": null}"#,
    ///         &mut recorder,
    ///     )
    ///     .unwrap();
    /// assert_eq!(
    ///     recorder.trace(),
    ///     "Start\nFeatureStart\nValue [id] \"7\" INTEGER\nValue [name] \"A\" STRING\nFeatureEnd\nEnd\n"
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed input and propagates
    /// downstream errors.
    #[cfg(feature = "json")]
    pub fn decode_slice<H>(&mut self, json: &[u8], downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.decode(&mut JsonTokenizer::new(json), downstream)
    }

    /// Decodes one document pulled from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for input that does not fit the layout and
    /// propagates source and downstream errors.
    pub fn decode<S, H>(&mut self, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        self.context = Context::default();
        let (first, _) = next(source)?;
        match self.layout {
            JsonLayout::Features => self.features(first, source, downstream)?,
            JsonLayout::GeoJson => self.geojson(first, source, downstream)?,
        }
        match source.next_token()? {
            Some((token, _)) => Err(unexpected("end of input", &token)),
            None => Ok(()),
        }
    }

    fn features<S, H>(&mut self, first: RawToken, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        match first {
            RawToken::StartObject => {
                self.context.metadata.single_feature = true;
                downstream.on_start(&mut self.context)?;
                self.feature(source, downstream)?;
            }
            RawToken::StartArray => {
                downstream.on_start(&mut self.context)?;
                loop {
                    match next(source)? {
                        (RawToken::StartObject, _) => self.feature(source, downstream)?,
                        (RawToken::EndArray, _) => break,
                        (token, _) => return Err(unexpected("feature object", &token)),
                    }
                }
            }
            token => return Err(unexpected("object or array", &token)),
        }
        downstream.on_end(&mut self.context)
    }

    fn feature<S, H>(&mut self, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        self.begin_feature(downstream)?;
        self.properties(source, downstream)?;
        self.end_feature(downstream)
    }

    fn begin_feature<H>(&mut self, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.context.reset_feature();
        self.properties.reset();
        downstream.on_feature_start(&mut self.context)
    }

    fn end_feature<H>(&mut self, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.context.reset_feature();
        downstream.on_feature_end(&mut self.context)
    }

    /// Feeds tokens to the properties decoder until the currently open
    /// object closes.
    fn properties<S, H>(&mut self, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        let mut depth = 0_usize;
        loop {
            let (token, name) = next(source)?;
            match token {
                RawToken::StartObject | RawToken::StartArray => depth += 1,
                RawToken::EndObject | RawToken::EndArray if depth == 0 => return Ok(()),
                RawToken::EndObject | RawToken::EndArray => depth -= 1,
                RawToken::Scalar(_) => {}
            }
            self.properties
                .feed(token, name.as_deref(), &mut self.context, downstream)?;
        }
    }

    fn geojson<S, H>(&mut self, first: RawToken, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        if first != RawToken::StartObject {
            return Err(unexpected("GeoJSON object", &first));
        }
        let mut started = false;
        let mut single = false;
        loop {
            let (token, name) = next(source)?;
            if token == RawToken::EndObject {
                break;
            }
            let Some(name) = name else {
                return Err(unexpected("object member", &token));
            };
            match (&*name, token) {
                ("numberMatched", RawToken::Scalar(Scalar::Int(n))) => {
                    self.context.metadata.number_matched = u64::try_from(n).ok();
                }
                ("numberReturned", RawToken::Scalar(Scalar::Int(n))) => {
                    self.context.metadata.number_returned = u64::try_from(n).ok();
                }
                ("features", RawToken::StartArray) if !single => {
                    if !started {
                        downstream.on_start(&mut self.context)?;
                        started = true;
                    }
                    loop {
                        match next(source)? {
                            (RawToken::StartObject, _) => self.geojson_feature(source, downstream)?,
                            (RawToken::EndArray, _) => break,
                            (token, _) => return Err(unexpected("feature object", &token)),
                        }
                    }
                }
                (member @ ("id" | "properties" | "geometry"), token) if !started || single => {
                    if !single {
                        self.context.metadata.single_feature = true;
                        downstream.on_start(&mut self.context)?;
                        self.begin_feature(downstream)?;
                        started = true;
                        single = true;
                    }
                    self.feature_member(member, token, source, downstream)?;
                }
                (_, token) => skip(token, source)?,
            }
        }
        if single {
            self.end_feature(downstream)?;
        }
        if !started {
            downstream.on_start(&mut self.context)?;
        }
        downstream.on_end(&mut self.context)
    }

    fn geojson_feature<S, H>(&mut self, source: &mut S, downstream: &mut H) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        self.begin_feature(downstream)?;
        loop {
            let (token, name) = next(source)?;
            if token == RawToken::EndObject {
                break;
            }
            let Some(name) = name else {
                return Err(unexpected("object member", &token));
            };
            self.feature_member(&name, token, source, downstream)?;
        }
        self.end_feature(downstream)
    }

    fn feature_member<S, H>(
        &mut self,
        member: &str,
        token: RawToken,
        source: &mut S,
        downstream: &mut H,
    ) -> Result<(), Error>
    where
        S: TokenSource + ?Sized,
        H: FeatureEventHandler + ?Sized,
    {
        match (member, token) {
            ("id", RawToken::Scalar(Scalar::Null)) => Ok(()),
            ("id", RawToken::Scalar(scalar)) => {
                self.context.set_path(&[Segment::from("id")]);
                self.context.indexes.clear();
                self.context.value_type = scalar.value_type();
                self.context.value = scalar.into_value();
                downstream.on_value(&mut self.context)?;
                self.context.set_path(&[]);
                Ok(())
            }
            ("properties", RawToken::StartObject) => self.properties(source, downstream),
            ("geometry", RawToken::StartObject) => {
                let geometry = Json::read_object(source, 0)?;
                self.geometry(&geometry, downstream)
            }
            (other, token) => {
                debug!(member = other, "skipping feature member");
                skip(token, source)
            }
        }
    }

    fn geometry<H>(&mut self, members: &[(Segment, Json)], downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        let member = |key: &str| {
            members
                .iter()
                .find(|(name, _)| &**name == key)
                .map(|(_, value)| value)
        };
        let Some(Json::Scalar(Scalar::String(kind))) = member("type") else {
            return Err(DecodeError::UnexpectedToken {
                expected: "geometry type",
                found: String::from("geometry without type"),
            }
            .into());
        };
        let geometry_type = GeometryType::from_geojson(kind)
            .filter(|t| *t != GeometryType::GeometryCollection)
            .ok_or_else(|| DecodeError::UnsupportedGeometry(kind.clone()))?;
        let coordinates = member("coordinates");

        self.context.set_path(&[Segment::from("geometry")]);
        self.context.indexes.clear();
        self.context.in_geometry = true;
        self.context.geometry_type = Some(geometry_type);
        self.context.geometry_dimension = coordinates.and_then(Json::dimension);
        downstream.on_object_start(&mut self.context)?;
        if let Some(coordinates) = coordinates {
            self.coordinates(coordinates, downstream)?;
        }
        downstream.on_object_end(&mut self.context)?;
        self.context.clear_geometry();
        self.context.set_path(&[]);
        Ok(())
    }

    fn coordinates<H>(&mut self, json: &Json, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        match json {
            Json::Array(items) => {
                downstream.on_array_start(&mut self.context)?;
                for item in items {
                    self.coordinates(item, downstream)?;
                }
                downstream.on_array_end(&mut self.context)
            }
            Json::Scalar(scalar @ (Scalar::Int(_) | Scalar::Float(_))) => {
                self.context.value = scalar.clone().into_value();
                self.context.value_type = ValueType::Float;
                downstream.on_value(&mut self.context)
            }
            Json::Scalar(scalar) => Err(unexpected("coordinate", &RawToken::Scalar(scalar.clone()))),
            Json::Object(_) => Err(unexpected("coordinate", &RawToken::StartObject)),
        }
    }
}

/// A buffered geometry member.
#[derive(Debug, Clone, PartialEq)]
enum Json {
    Scalar(Scalar),
    Array(Vec<Json>),
    Object(Vec<(Segment, Json)>),
}

impl Json {
    fn read<S: TokenSource + ?Sized>(token: RawToken, source: &mut S, depth: usize) -> Result<Self, Error> {
        if depth > MAX_GEOMETRY_DEPTH {
            return Err(unexpected("shallower geometry", &token));
        }
        match token {
            RawToken::Scalar(scalar) => Ok(Self::Scalar(scalar)),
            RawToken::StartObject => Ok(Self::Object(Self::read_object(source, depth + 1)?)),
            RawToken::StartArray => {
                let mut items = Vec::new();
                loop {
                    match next(source)? {
                        (RawToken::EndArray, _) => return Ok(Self::Array(items)),
                        (token, _) => items.push(Self::read(token, source, depth + 1)?),
                    }
                }
            }
            token => Err(unexpected("geometry member", &token)),
        }
    }

    fn read_object<S: TokenSource + ?Sized>(
        source: &mut S,
        depth: usize,
    ) -> Result<Vec<(Segment, Self)>, Error> {
        let mut members = Vec::new();
        loop {
            match next(source)? {
                (RawToken::EndObject, _) => return Ok(members),
                (token, Some(name)) => members.push((name, Self::read(token, source, depth)?)),
                (token, None) => return Err(unexpected("object member", &token)),
            }
        }
    }

    /// Length of the first position.
    fn dimension(&self) -> Option<u8> {
        match self {
            Self::Array(items) if items.iter().all(|item| matches!(item, Self::Scalar(_))) => {
                u8::try_from(items.len()).ok()
            }
            Self::Array(items) => items.first().and_then(Self::dimension),
            _ => None,
        }
    }
}

fn next<S: TokenSource + ?Sized>(source: &mut S) -> Result<(RawToken, Option<Segment>), Error> {
    source
        .next_token()?
        .ok_or_else(|| DecodeError::UnexpectedEnd.into())
}

/// Consumes the rest of a value that started with `token`.
fn skip<S: TokenSource + ?Sized>(token: RawToken, source: &mut S) -> Result<(), Error> {
    if !matches!(token, RawToken::StartObject | RawToken::StartArray) {
        return Ok(());
    }
    let mut depth = 1_usize;
    while depth > 0 {
        match next(source)?.0 {
            RawToken::StartObject | RawToken::StartArray => depth += 1,
            RawToken::EndObject | RawToken::EndArray => depth -= 1,
            RawToken::Scalar(_) => {}
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::{event::TokenRecorder, path};

    fn decode(layout: JsonLayout, json: &str) -> Result<TokenRecorder, Error> {
        let mut decoder = JsonFeatureDecoder::new(&DecoderOptions {
            layout,
            ..Default::default()
        });
        let mut recorder = TokenRecorder::default();
        decoder.decode_slice(json.as_bytes(), &mut recorder)?;
        Ok(recorder)
    }

    #[test]
    fn feature_array() {
        let recorder = decode(
            JsonLayout::Features,
            r#"[{"id": 1, "tags": ["a"]}, {"id": 2, "address": {"city": "x"}}]"#,
        )
        .unwrap();
        assert_snapshot!(recorder.trace(), @r#"
        Start
        FeatureStart
        Value [id] "1" INTEGER
        ArrayStart [tags]
        Value [tags] "a" STRING
        ArrayEnd [tags]
        FeatureEnd
        FeatureStart
        Value [id] "2" INTEGER
        ObjectStart [address]
        Value [address, city] "x" STRING
        ObjectEnd [address]
        FeatureEnd
        End
        "#);
    }

    #[test]
    fn feature_collection() {
        let recorder = decode(
            JsonLayout::GeoJson,
            r#"{
                "type": "FeatureCollection",
                "numberMatched": 10,
                "numberReturned": 1,
                "links": [{"href": "x"}],
                "features": [{
                    "type": "Feature",
                    "geometry": {"coordinates": [[1, 2.5], [3, 4]], "type": "LineString"},
                    "properties": {"name": "A"},
                    "id": "f1"
                }]
            }"#,
        )
        .unwrap();
        assert_snapshot!(recorder.trace(), @r#"
        Start matched=10 returned=1
        FeatureStart
        ObjectStart [geometry] LINE_STRING
        ArrayStart [geometry]
        ArrayStart [geometry]
        Value [geometry] "1" FLOAT
        Value [geometry] "2.5" FLOAT
        ArrayEnd [geometry]
        ArrayStart [geometry]
        Value [geometry] "3" FLOAT
        Value [geometry] "4" FLOAT
        ArrayEnd [geometry]
        ArrayEnd [geometry]
        ObjectEnd [geometry]
        Value [name] "A" STRING
        Value [id] "f1" STRING
        FeatureEnd
        End
        "#);
    }

    #[test]
    fn single_feature_sets_metadata() {
        let mut decoder = JsonFeatureDecoder::new(&DecoderOptions {
            layout: JsonLayout::GeoJson,
            ..Default::default()
        });
        let mut recorder = TokenRecorder::default();
        decoder
            .decode_slice(br#"{"type": "Feature", "properties": {"a": 1}}"#, &mut recorder)
            .unwrap();
        assert!(decoder.context().metadata.single_feature);
        assert_eq!(
            recorder.tokens()[2],
            crate::Token::Value {
                path: path!["a"],
                value: Some("1".into()),
                value_type: ValueType::Integer
            }
        );
    }

    #[test]
    fn empty_collection() {
        let recorder = decode(JsonLayout::GeoJson, r#"{"type": "FeatureCollection"}"#).unwrap();
        assert_eq!(recorder.trace(), "Start\nEnd\n");
    }

    #[rstest]
    #[case::unknown_geometry(
        JsonLayout::GeoJson,
        r#"{"type": "Feature", "geometry": {"type": "Circle", "coordinates": []}}"#,
        "unsupported geometry type 'Circle'"
    )]
    #[case::truncated(JsonLayout::Features, "[{}, ", "")]
    #[case::scalar_feature(JsonLayout::Features, "[1]", "expected feature object, found number 1")]
    #[case::geojson_array(JsonLayout::GeoJson, "[]", "expected GeoJSON object, found start of array")]
    fn rejects(#[case] layout: JsonLayout, #[case] json: &str, #[case] message: &str) {
        let error = decode(layout, json).unwrap_err();
        assert!(matches!(error, Error::Decode(_)));
        if !message.is_empty() {
            assert_eq!(alloc::string::ToString::to_string(&error), message);
        }
    }

    #[test]
    fn array_paths_from_mapping() {
        use crate::schema::{PropertyType, SchemaDefinition};

        let mapping = SchemaMapping::new(
            &SchemaDefinition::new("t", PropertyType::Object).with_property(
                SchemaDefinition::new("parts", PropertyType::ObjectArray).with_source_path("parts"),
            ),
        )
        .unwrap();
        let decoder = JsonFeatureDecoder::for_mapping(&mapping, &DecoderOptions::default());
        assert!(decoder.properties.multiplicity().is_array_path(&path!["parts"]));
    }
}
