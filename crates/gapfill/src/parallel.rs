// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Sharded execution without a query engine.
//!
//! Rows are routed to shards by a hash of the typed group key, so every row
//! of a group reaches the same operator. Each shard runs on a blocking tokio
//! task and streams its pages back over a channel; pages are reassembled in
//! `(shard, sequence)` order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use arrow::array::{BooleanArray, RecordBatch};
use arrow::compute::filter_record_batch;
use arrow::datatypes::SchemaRef;
use diagnostics::*;
use tokio::sync::mpsc;

use crate::buffer::GroupKey;
use crate::config::{FillOptions, ResolvedOptions};
use crate::error::{GapFillError, Result};
use crate::operator::{GapFillOperator, Page};
use crate::sequence::ReorderBuffer;

/// Runs one `GapFillOperator` per shard
#[derive(Debug, Clone)]
pub struct ShardedGapFill {
    schema: SchemaRef,
    options: ResolvedOptions,
    shards: usize,
}

impl ShardedGapFill {
    pub fn try_new(schema: SchemaRef, options: FillOptions, shards: usize) -> Result<Self> {
        if shards == 0 {
            return Err(GapFillError::config("shard count must be positive"));
        }
        let options = ResolvedOptions::resolve(&schema, &options)?;
        Ok(Self {
            schema,
            options,
            shards,
        })
    }

    #[must_use]
    pub fn shards(&self) -> usize {
        self.shards
    }

    #[must_use]
    pub fn output_schema(&self) -> SchemaRef {
        self.options.output_schema(&self.schema)
    }

    /// Shard that owns `key`
    #[must_use]
    pub fn shard_for(&self, key: &GroupKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    /// Split a batch into one batch per shard
    pub fn partition(&self, batch: &RecordBatch) -> Result<Vec<RecordBatch>> {
        if self.shards == 1 {
            return Ok(vec![batch.clone()]);
        }

        let groups = batch.column(self.options.group_index);
        let assignment = (0..batch.num_rows())
            .map(|row| Ok(self.shard_for(&GroupKey::from_array(groups.as_ref(), row)?)))
            .collect::<Result<Vec<usize>>>()?;

        (0..self.shards)
            .map(|shard| {
                let mask: BooleanArray = assignment.iter().map(|&s| Some(s == shard)).collect();
                Ok(filter_record_batch(batch, &mask)?)
            })
            .collect()
    }

    /// Fill `batches` across all shards and return the pages in
    /// `(shard, sequence)` order
    pub async fn run(&self, batches: Vec<RecordBatch>) -> Result<Vec<Page>> {
        let mut inputs: Vec<Vec<RecordBatch>> = vec![Vec::new(); self.shards];
        let mut rows = 0;
        for batch in &batches {
            rows += batch.num_rows();
            for (shard, part) in self.partition(batch)?.into_iter().enumerate() {
                if part.num_rows() > 0 {
                    inputs[shard].push(part);
                }
            }
        }
        drop(batches);
        info!(
            "Sharded gap fill over {rows} rows in {shards} shards",
            rows: rows,
            shards: self.shards
        );

        let (tx, mut rx) = mpsc::channel::<(usize, Result<Page>)>(self.shards * 2);
        let mut handles = Vec::with_capacity(self.shards);
        for (shard, input) in inputs.into_iter().enumerate() {
            let tx = tx.clone();
            let schema = self.schema.clone();
            let options = self.options.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                run_shard(shard, schema, options, input, &tx);
            }));
        }
        drop(tx);

        let mut reorder = ReorderBuffer::new(self.shards);
        let mut output = Vec::new();
        while let Some((shard, page)) = rx.recv().await {
            reorder.insert(shard, page?)?;
            output.extend(reorder.drain_ready());
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| GapFillError::Execution(format!("shard task failed: {e}")))?;
        }

        if !reorder.is_complete() {
            return Err(GapFillError::Execution(format!(
                "{} pages left unreleased",
                reorder.pending()
            )));
        }
        debug!("Sharded gap fill produced {pages} pages", pages: output.len());
        Ok(output)
    }

    /// Like `run`, keeping only the non-empty record batches
    pub async fn run_batches(&self, batches: Vec<RecordBatch>) -> Result<Vec<RecordBatch>> {
        Ok(self
            .run(batches)
            .await?
            .into_iter()
            .map(|page| page.batch)
            .filter(|batch| batch.num_rows() > 0)
            .collect())
    }
}

fn run_shard(
    shard: usize,
    schema: SchemaRef,
    options: ResolvedOptions,
    input: Vec<RecordBatch>,
    tx: &mpsc::Sender<(usize, Result<Page>)>,
) {
    let mut operator = GapFillOperator::from_resolved(schema, options);
    let started = input
        .iter()
        .try_for_each(|batch| operator.push(batch))
        .and_then(|()| operator.finish_input());
    if let Err(e) = started {
        let _ = tx.blocking_send((shard, Err(e)));
        return;
    }

    loop {
        let page = operator.next_page();
        let stop = !matches!(&page, Ok(p) if !p.is_last());
        if tx.blocking_send((shard, page)).is_err() || stop {
            return;
        }
    }
}
