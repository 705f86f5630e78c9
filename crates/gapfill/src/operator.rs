//! The gap-fill operator: a two-phase push/pull state machine.
//!
//! Batches are pushed while `Accumulating`. `finish_input` computes one grid
//! per group and moves to `Draining`, where each `next_page` call returns at
//! most `page_size` rows. The page that completes the last group reports
//! `DrainStatus::Exhausted` and the operator becomes `Done`.

use std::fmt;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use diagnostics::*;

use crate::buffer::GroupBuffer;
use crate::config::{FillMode, FillOptions, ResolvedOptions};
use crate::emitter::{OutputCursor, PagePlan, emit_page, materialize};
use crate::error::{GapFillError, Result};
use crate::grid::Grid;

/// Whether more pages follow the one just returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    MoreOutputPending,
    Exhausted,
}

/// One bounded batch of output
#[derive(Debug, Clone)]
pub struct Page {
    /// Position of this page in the operator's output, starting at 0
    pub sequence: u64,
    pub batch: RecordBatch,
    pub status: DrainStatus,
}

impl Page {
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.status == DrainStatus::Exhausted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorPhase {
    Accumulating,
    Draining,
    Done,
}

impl fmt::Display for OperatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorPhase::Accumulating => write!(f, "accumulating"),
            OperatorPhase::Draining => write!(f, "draining"),
            OperatorPhase::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug)]
enum OperatorState {
    Accumulating,
    Draining { grids: Vec<Grid>, cursor: OutputCursor },
    Done,
}

/// Stateful gap-fill operator for one shard of the input
#[derive(Debug)]
pub struct GapFillOperator {
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    options: ResolvedOptions,
    buffer: GroupBuffer,
    state: OperatorState,
    next_sequence: u64,
}

impl GapFillOperator {
    /// Validate `options` against `schema`. All configuration errors are
    /// reported here, before any row is accepted.
    pub fn try_new(schema: SchemaRef, options: FillOptions) -> Result<Self> {
        let resolved = ResolvedOptions::resolve(&schema, &options)?;
        Ok(Self::from_resolved(schema, resolved))
    }

    #[must_use]
    pub fn from_resolved(schema: SchemaRef, options: ResolvedOptions) -> Self {
        let output_schema = options.output_schema(&schema);
        let buffer = GroupBuffer::new(
            schema.clone(),
            options.domain.clone(),
            options.group_index,
            options.time_index,
        );
        debug!(
            "Gap-fill operator created: mode {mode}, frequency {frequency}, page size {page_size}",
            mode: options.mode.to_string(),
            frequency: options.frequency.to_string(),
            page_size: options.page_size
        );
        Self {
            input_schema: schema,
            output_schema,
            options,
            buffer,
            state: OperatorState::Accumulating,
            next_sequence: 0,
        }
    }

    #[must_use]
    pub fn input_schema(&self) -> &SchemaRef {
        &self.input_schema
    }

    #[must_use]
    pub fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    #[must_use]
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    #[must_use]
    pub fn phase(&self) -> OperatorPhase {
        match self.state {
            OperatorState::Accumulating => OperatorPhase::Accumulating,
            OperatorState::Draining { .. } => OperatorPhase::Draining,
            OperatorState::Done => OperatorPhase::Done,
        }
    }

    /// Buffer a batch. Never produces output.
    pub fn push(&mut self, batch: &RecordBatch) -> Result<()> {
        if !matches!(self.state, OperatorState::Accumulating) {
            return Err(GapFillError::InvalidState(format!(
                "cannot push input while {}",
                self.phase()
            )));
        }
        let _ = self.buffer.append_batch(batch)?;
        Ok(())
    }

    /// Signal end of input and build the grids. A target time that cannot
    /// be converted to the time column's type ends the operator.
    pub fn finish_input(&mut self) -> Result<()> {
        if !matches!(self.state, OperatorState::Accumulating) {
            return Err(GapFillError::InvalidState(format!(
                "end of input signalled while {}",
                self.phase()
            )));
        }

        match self.build_grids() {
            Ok(grids) => {
                let groups = grids.len();
                let points: usize = grids.iter().map(Grid::len).sum();
                let dropped = self.buffer.dropped_null_times();
                let buffered = self.buffer.buffered_rows();
                debug!(
                    "Draining {groups} groups, {points} grid points from {buffered} rows ({dropped} rows without time dropped)",
                    groups: groups,
                    points: points,
                    buffered: buffered,
                    dropped: dropped
                );
                self.state = OperatorState::Draining {
                    grids,
                    cursor: OutputCursor::default(),
                };
                Ok(())
            }
            Err(e) => {
                self.state = OperatorState::Done;
                Err(e)
            }
        }
    }

    fn build_grids(&self) -> Result<Vec<Grid>> {
        let opts = &self.options;
        let target = match (opts.mode, &opts.target) {
            (FillMode::Forward, Some(target)) => Some(opts.domain.parse_target(target)?),
            (FillMode::Forward, None) => {
                return Err(GapFillError::config("forward mode requires a target time"));
            }
            (FillMode::Gaps, _) => None,
        };
        let units_per_day = opts.domain.units_per_day();

        let grids = self
            .buffer
            .groups()
            .iter()
            .map(|series| match (series.time_range(), target) {
                (None, _) => Grid::default(),
                (Some((min, max)), None) => Grid::generate(min, max, opts.step),
                (Some((min, _)), Some(target)) => {
                    Grid::forward(min, target, opts.step, units_per_day, series.times())
                }
            })
            .collect();
        Ok(grids)
    }

    /// Return the next page of output
    pub fn next_page(&mut self) -> Result<Page> {
        let page_size = self.options.page_size;
        let (plan, exhausted) = match &mut self.state {
            OperatorState::Accumulating => {
                return Err(GapFillError::InvalidState(
                    "output requested before end of input".to_string(),
                ));
            }
            OperatorState::Done => {
                return Err(GapFillError::InvalidState(
                    "output requested after the operator finished".to_string(),
                ));
            }
            OperatorState::Draining { grids, cursor } => {
                let mut plan = PagePlan::with_capacity(page_size);
                while plan.len() < page_size && cursor.group < grids.len() {
                    let series = &self.buffer.groups()[cursor.group];
                    let progress = emit_page(
                        series,
                        &grids[cursor.group],
                        cursor,
                        page_size - plan.len(),
                        &mut plan,
                    );
                    if progress.exhausted {
                        cursor.next_group();
                    }
                }
                (plan, cursor.group >= grids.len())
            }
        };

        let batch = match materialize(
            &plan,
            self.buffer.batches(),
            &self.output_schema,
            &self.options.domain,
            self.options.group_index,
            self.options.time_index,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                self.state = OperatorState::Done;
                return Err(e);
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let status = if exhausted {
            self.state = OperatorState::Done;
            debug!("Gap-fill drained after {pages} pages", pages: self.next_sequence);
            DrainStatus::Exhausted
        } else {
            DrainStatus::MoreOutputPending
        };

        Ok(Page {
            sequence,
            batch,
            status,
        })
    }

    /// Pull every remaining page
    pub fn drain(&mut self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        loop {
            let page = self.next_page()?;
            let last = page.is_last();
            pages.push(page);
            if last {
                return Ok(pages);
            }
        }
    }
}

/// Run one operator over `batches` and collect its output
pub fn fill_batches<'a>(
    schema: SchemaRef,
    options: FillOptions,
    batches: impl IntoIterator<Item = &'a RecordBatch>,
) -> Result<Vec<RecordBatch>> {
    let mut operator = GapFillOperator::try_new(schema, options)?;
    for batch in batches {
        operator.push(batch)?;
    }
    operator.finish_input()?;
    Ok(operator
        .drain()?
        .into_iter()
        .map(|page| page.batch)
        .filter(|batch| batch.num_rows() > 0)
        .collect())
}
