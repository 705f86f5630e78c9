//! Per-group row accumulation.
//!
//! Input batches are retained whole in an arena and rows are addressed by
//! `RowRef`. Each group owns a `SeriesBuffer` of `(time key, RowRef)` entries
//! in insertion order, plus a map from time key to its first occurrence.

use std::collections::HashMap;

use arrow::array::{Array, RecordBatch};
use arrow::datatypes::SchemaRef;
use datafusion::scalar::ScalarValue;

use crate::error::{GapFillError, Result};
use crate::time::TimeDomain;

/// Typed value of the group column for one row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(ScalarValue);

impl GroupKey {
    pub fn from_array(array: &dyn Array, row: usize) -> Result<Self> {
        let value = ScalarValue::try_from_array(array, row)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(&self) -> &ScalarValue {
        &self.0
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl From<ScalarValue> for GroupKey {
    fn from(value: ScalarValue) -> Self {
        Self(value)
    }
}

/// Handle to a group, in first-seen order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

/// Location of one buffered row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRef {
    pub batch: usize,
    pub row: usize,
}

/// Buffered rows of one group
#[derive(Debug)]
pub struct SeriesBuffer {
    key: GroupKey,
    times: Vec<i64>,
    rows: Vec<RowRef>,
    first_index: HashMap<i64, usize>,
    range: Option<(i64, i64)>,
}

impl SeriesBuffer {
    fn new(key: GroupKey) -> Self {
        Self {
            key,
            times: Vec::new(),
            rows: Vec::new(),
            first_index: HashMap::new(),
            range: None,
        }
    }

    fn push(&mut self, time: i64, row: RowRef) {
        let position = self.times.len();
        self.times.push(time);
        self.rows.push(row);
        // Duplicates are kept; lookups resolve to the first one
        let _ = self.first_index.entry(time).or_insert(position);
        self.range = Some(match self.range {
            None => (time, time),
            Some((lo, hi)) => (lo.min(time), hi.max(time)),
        });
    }

    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time keys in insertion order, duplicates included
    #[must_use]
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    #[must_use]
    pub fn contains(&self, time: i64) -> bool {
        self.first_index.contains_key(&time)
    }

    /// The first buffered row with this time key
    #[must_use]
    pub fn first_row(&self, time: i64) -> Option<RowRef> {
        self.first_index.get(&time).map(|&idx| self.rows[idx])
    }

    /// Any row of the group, used to carry the group value onto gap rows
    #[must_use]
    pub fn representative_row(&self) -> Option<RowRef> {
        self.rows.first().copied()
    }

    /// `(min, max)` time keys, `None` when empty
    #[must_use]
    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.range
    }
}

/// Accumulates rows for all groups of one operator instance
#[derive(Debug)]
pub struct GroupBuffer {
    schema: SchemaRef,
    domain: TimeDomain,
    group_index: usize,
    time_index: usize,
    batches: Vec<RecordBatch>,
    groups: Vec<SeriesBuffer>,
    index: HashMap<GroupKey, GroupId>,
    buffered_rows: usize,
    dropped_null_times: usize,
}

impl GroupBuffer {
    #[must_use]
    pub fn new(schema: SchemaRef, domain: TimeDomain, group_index: usize, time_index: usize) -> Self {
        Self {
            schema,
            domain,
            group_index,
            time_index,
            batches: Vec::new(),
            groups: Vec::new(),
            index: HashMap::new(),
            buffered_rows: 0,
            dropped_null_times: 0,
        }
    }

    /// Buffer every row of `batch` with a non-null time. Returns the number
    /// of rows kept.
    pub fn append_batch(&mut self, batch: &RecordBatch) -> Result<usize> {
        self.check_schema(batch)?;
        if batch.num_rows() == 0 {
            return Ok(0);
        }

        let times = self.domain.keys(batch.column(self.time_index).as_ref())?;
        let group_column = batch.column(self.group_index);
        let batch_index = self.batches.len();
        let mut kept = 0;
        let mut last: Option<(GroupKey, GroupId)> = None;

        for (row, time) in times.into_iter().enumerate() {
            let Some(time) = time else {
                self.dropped_null_times += 1;
                continue;
            };
            let key = GroupKey::from_array(group_column.as_ref(), row)?;
            let id = match &last {
                Some((prev, id)) if *prev == key => *id,
                _ => self.group_id(key.clone()),
            };
            self.groups[id.0].push(
                time,
                RowRef {
                    batch: batch_index,
                    row,
                },
            );
            last = Some((key, id));
            kept += 1;
        }

        if kept > 0 {
            self.batches.push(batch.clone());
            self.buffered_rows += kept;
        }
        Ok(kept)
    }

    fn group_id(&mut self, key: GroupKey) -> GroupId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = GroupId(self.groups.len());
        self.groups.push(SeriesBuffer::new(key.clone()));
        let _ = self.index.insert(key, id);
        id
    }

    fn check_schema(&self, batch: &RecordBatch) -> Result<()> {
        let expected = self.schema.fields();
        let actual = batch.schema();
        if actual.fields().len() != expected.len() {
            return Err(GapFillError::SchemaMismatch(format!(
                "expected {} columns, batch has {}",
                expected.len(),
                actual.fields().len()
            )));
        }
        for (want, got) in expected.iter().zip(actual.fields().iter()) {
            if want.data_type() != got.data_type() {
                return Err(GapFillError::SchemaMismatch(format!(
                    "column '{}' expected {}, batch has {}",
                    want.name(),
                    want.data_type(),
                    got.data_type()
                )));
            }
        }
        Ok(())
    }

    /// Groups in first-seen order
    #[must_use]
    pub fn groups(&self) -> &[SeriesBuffer] {
        &self.groups
    }

    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&SeriesBuffer> {
        self.groups.get(id.0)
    }

    #[must_use]
    pub fn lookup(&self, key: &GroupKey) -> Option<GroupId> {
        self.index.get(key).copied()
    }

    /// Retained input batches, addressed by `RowRef::batch`
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[must_use]
    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows
    }

    #[must_use]
    pub fn dropped_null_times(&self) -> usize {
        self.dropped_null_times
    }
}
