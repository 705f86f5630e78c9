//! Left join of a grid against buffered rows, one bounded page at a time.
//!
//! A page is first planned as a list of row sources (an original buffered
//! row, or a gap carrying only the group value) and then materialized with
//! Arrow's `interleave` kernel over the retained batches plus a one-row null
//! array per column.

use arrow::array::{Array, ArrayRef, RecordBatch, new_null_array};
use arrow::datatypes::SchemaRef;
use arrow_select::interleave::interleave;

use crate::buffer::{RowRef, SeriesBuffer};
use crate::error::{GapFillError, Result};
use crate::grid::Grid;
use crate::time::TimeDomain;

/// Drain position: the group being emitted and the next grid point in it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCursor {
    pub group: usize,
    pub point: usize,
}

impl OutputCursor {
    pub(crate) fn next_group(&mut self) {
        self.group += 1;
        self.point = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowSource {
    Original(RowRef),
    /// Gap row; the group value is copied from `group_row`
    Gap { group_row: RowRef },
}

/// Rows planned for one output page
#[derive(Debug, Default)]
pub struct PagePlan {
    times: Vec<i64>,
    sources: Vec<RowSource>,
}

impl PagePlan {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            sources: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Number of planned gap rows
    #[must_use]
    pub fn gap_rows(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s, RowSource::Gap { .. }))
            .count()
    }
}

/// Result of emitting part of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupProgress {
    pub emitted: usize,
    pub exhausted: bool,
}

/// Plan up to `capacity` rows of `series` starting at `cursor.point`, and
/// advance the cursor past them. The caller moves to the next group when
/// the result reports exhaustion.
pub fn emit_page(
    series: &SeriesBuffer,
    grid: &Grid,
    cursor: &mut OutputCursor,
    capacity: usize,
    plan: &mut PagePlan,
) -> GroupProgress {
    let points = grid.points();
    let start = cursor.point.min(points.len());
    let end = start.saturating_add(capacity).min(points.len());

    if let Some(group_row) = series.representative_row() {
        for &time in &points[start..end] {
            let source = match series.first_row(time) {
                Some(row) => RowSource::Original(row),
                None => RowSource::Gap { group_row },
            };
            plan.times.push(time);
            plan.sources.push(source);
        }
        cursor.point = end;
    } else {
        // A group with no rows has nothing to join against
        cursor.point = points.len();
    }

    GroupProgress {
        emitted: cursor.point - start,
        exhausted: cursor.point >= points.len(),
    }
}

/// Materialize a planned page against the retained input batches
pub fn materialize(
    plan: &PagePlan,
    batches: &[RecordBatch],
    output_schema: &SchemaRef,
    domain: &TimeDomain,
    group_index: usize,
    time_index: usize,
) -> Result<RecordBatch> {
    let null_source = batches.len();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(output_schema.fields().len());

    for (col, field) in output_schema.fields().iter().enumerate() {
        if col == time_index {
            columns.push(domain.build_array(&plan.times)?);
            continue;
        }

        let null_row = new_null_array(field.data_type(), 1);
        let mut sources: Vec<&dyn Array> = Vec::with_capacity(batches.len() + 1);
        for batch in batches {
            sources.push(batch.column(col).as_ref());
        }
        sources.push(null_row.as_ref());

        let indices: Vec<(usize, usize)> = plan
            .sources
            .iter()
            .map(|source| match *source {
                RowSource::Original(r) => (r.batch, r.row),
                RowSource::Gap { group_row } if col == group_index => {
                    (group_row.batch, group_row.row)
                }
                RowSource::Gap { .. } => (null_source, 0),
            })
            .collect();

        columns.push(interleave(&sources, &indices)?);
    }

    RecordBatch::try_new(output_schema.clone(), columns).map_err(|e| {
        GapFillError::SchemaMismatch(format!("cannot assemble output page: {e}"))
    })
}
