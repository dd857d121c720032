use alloc::{collections::BTreeMap, string::String, vec::Vec};

use tracing::trace;

use crate::{
    error::{DecodeError, Error},
    event::{Context, FeatureEventHandler},
    mapping::SchemaMapping,
    multiplicity::MultiplicityTracker,
    nesting::{FrameKind, NestingTracker},
    options::{DecoderOptions, NullPolicy},
    path::{DisplayPath, Path, Segment},
    schema::ValueType,
};

/// One row of an already executed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Source path of the table the row belongs to.
    pub table: Path,
    /// Key of the row within its table.
    pub id: String,
    /// Column names with their values, `None` for null.
    pub columns: Vec<(Segment, Option<String>)>,
}

impl Row {
    /// Creates a row without columns.
    #[must_use]
    pub fn new(table: Path, id: impl Into<String>) -> Self {
        Self {
            table,
            id: id.into(),
            columns: Vec::new(),
        }
    }

    /// Adds one column.
    #[must_use]
    pub fn with_column(mut self, name: &str, value: Option<&str>) -> Self {
        self.columns.push((name.into(), value.map(String::from)));
        self
    }
}

/// Decodes relational rows into canonical feature streams.
///
/// Rows arrive ordered by feature: the row of the main table first, then
/// the rows of joined tables. A new main-table id ends the current feature.
/// Joined tables declared as array paths open one array per parent instance
/// and one element object per distinct row id; other joined tables open one
/// object. Columns become `STRING` values at the table path plus the column
/// name.
///
/// ```
/// use renest::{path, DecoderOptions, Row, RowDecoder, TokenRecorder};
///
/// let mut decoder = RowDecoder::new(&DecoderOptions {
///     array_paths: vec![path!["parts"]],
///     ..Default::default()
/// });
/// let mut recorder = TokenRecorder::default();
/// decoder
///     .decode_all(
///         [
///             Row::new(path![], "1").with_column("name", Some("A")),
///             Row::new(path!["parts"], "p1").with_column("kind", Some("roof")),
///             Row::new(path!["parts"], "p2").with_column("kind", None),
///         ],
///         &mut recorder,
///     )
///     .unwrap();
/// assert_eq!(recorder.tokens().len(), 13);
/// ```
#[derive(Debug, Clone)]
pub struct RowDecoder {
    main_table: Option<Path>,
    null_policy: NullPolicy,
    multiplicity: MultiplicityTracker,
    last_ids: BTreeMap<Path, String>,
    tracker: NestingTracker<()>,
    context: Context,
    started: bool,
    in_feature: bool,
}

impl RowDecoder {
    /// Creates a decoder. `array_paths` name the joined tables with more
    /// than one row per parent row. The first row fixes the main table.
    #[must_use]
    pub fn new(options: &DecoderOptions) -> Self {
        Self {
            main_table: None,
            null_policy: options.null_policy.clone(),
            multiplicity: MultiplicityTracker::new(options.array_paths.iter().cloned()),
            last_ids: BTreeMap::new(),
            tracker: NestingTracker::new(),
            context: Context::default(),
            started: false,
            in_feature: false,
        }
    }

    /// Creates a decoder whose main table is the source path of the
    /// mapping root and whose array tables are the mapping's array paths.
    #[must_use]
    pub fn for_mapping(mapping: &SchemaMapping, options: &DecoderOptions) -> Self {
        let mut decoder = Self::new(options);
        for path in mapping.array_source_paths() {
            decoder.multiplicity.register(path.clone());
        }
        decoder.main_table = Some(mapping.node(mapping.root()).full_source_path().to_vec());
        decoder
    }

    /// Sets the main table explicitly.
    #[must_use]
    pub fn with_main_table(mut self, table: Path) -> Self {
        self.main_table = Some(table);
        self
    }

    /// Emits `Start`. Called implicitly by the first row.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn start<H>(&mut self, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        if self.started {
            return Ok(());
        }
        self.started = true;
        downstream.on_start(&mut self.context)
    }

    /// Decodes one row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for a joined row that arrives before any
    /// main-table row and propagates downstream errors.
    pub fn decode_row<H>(&mut self, row: &Row, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.start(downstream)?;
        let main = self.main_table.get_or_insert_with(|| row.table.clone());

        if row.table == *main {
            if self.last_ids.get(&row.table) != Some(&row.id) {
                self.end_feature(downstream)?;
                self.multiplicity.reset();
                self.last_ids.clear();
                self.last_ids.insert(row.table.clone(), row.id.clone());
                self.context.reset_feature();
                self.in_feature = true;
                trace!(id = %row.id, "feature");
                downstream.on_feature_start(&mut self.context)?;
            }
            self.tracker.close_all(&mut self.context, downstream)?;
            return self.columns(row, &[], downstream);
        }

        if !self.in_feature {
            return Err(DecodeError::UnexpectedToken {
                expected: "main table row",
                found: alloc::format!("row of table {}", DisplayPath(&row.table)),
            }
            .into());
        }

        if self.last_ids.get(&row.table) != Some(&row.id) {
            self.multiplicity.track(&row.table);
            let table = &row.table;
            self.last_ids
                .retain(|other, _| other.len() <= table.len() || !other.starts_with(table));
            self.last_ids.insert(row.table.clone(), row.id.clone());
        }
        let indexes = self.multiplicity.get_multiplicities_for_path(&row.table);

        self.tracker.close_while(
            |frame| !row.table.starts_with(&frame.path) || !indexes.starts_with(&frame.scope),
            &mut self.context,
            downstream,
        )?;
        if self.multiplicity.is_array_path(&row.table) {
            if !self.tracker.has_frame(FrameKind::Array, &row.table) {
                let scope = indexes[..indexes.len().saturating_sub(1)].to_vec();
                self.tracker
                    .open_array(row.table.clone(), (), scope, &mut self.context, downstream)?;
            }
            let at_array = self
                .tracker
                .top()
                .is_some_and(|top| top.kind == FrameKind::Array && top.path == row.table);
            if at_array {
                self.tracker
                    .open_object(row.table.clone(), (), indexes.clone(), &mut self.context, downstream)?;
            }
        } else if !self.tracker.is_same_path(&row.table) {
            self.tracker
                .open_object(row.table.clone(), (), indexes.clone(), &mut self.context, downstream)?;
        }
        self.columns(row, &indexes, downstream)
    }

    fn columns<H>(&mut self, row: &Row, indexes: &[usize], downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        for (column, value) in &row.columns {
            let value = match (value, &self.null_policy) {
                (None, NullPolicy::Skip) => continue,
                (None, NullPolicy::Substitute(sentinel)) => Some(sentinel.clone()),
                (value, _) => value.clone(),
            };
            let mut path = row.table.clone();
            path.push(column.clone());
            self.context.set_path(&path);
            self.context.indexes = indexes.to_vec();
            self.context.value = value;
            self.context.value_type = ValueType::String;
            downstream.on_value(&mut self.context)?;
        }
        Ok(())
    }

    fn end_feature<H>(&mut self, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        if !self.in_feature {
            return Ok(());
        }
        self.tracker.close_all(&mut self.context, downstream)?;
        self.context.reset_feature();
        self.in_feature = false;
        downstream.on_feature_end(&mut self.context)
    }

    /// Ends the current feature and emits `End`.
    ///
    /// # Errors
    ///
    /// Propagates downstream errors.
    pub fn finish<H>(&mut self, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
    {
        self.start(downstream)?;
        self.end_feature(downstream)?;
        self.started = false;
        downstream.on_end(&mut self.context)
    }

    /// Decodes a complete result set.
    ///
    /// # Errors
    ///
    /// See [`RowDecoder::decode_row`].
    pub fn decode_all<H, I>(&mut self, rows: I, downstream: &mut H) -> Result<(), Error>
    where
        H: FeatureEventHandler + ?Sized,
        I: IntoIterator<Item = Row>,
    {
        self.start(downstream)?;
        for row in rows {
            self.decode_row(&row, downstream)?;
        }
        self.finish(downstream)
    }
}
