// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! DataFusion integration.
//!
//! `gap_fill_table` wraps any `TableProvider` so that scanning it yields the
//! gap-filled rows. The physical plan `GapFillExec` asks for its input to be
//! hash partitioned on the group column, so each group lands in exactly one
//! partition, and runs one `GapFillOperator` per partition.

use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::datasource::{TableProvider, TableType};
use datafusion::error::{DataFusionError, Result as DataFusionResult};
use datafusion::execution::TaskContext;
use datafusion::logical_expr::{Expr, TableProviderFilterPushDown};
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_expr::expressions::Column;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, Distribution, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use diagnostics::*;
use futures::stream::StreamExt;

use crate::config::{FillOptions, ResolvedOptions};
use crate::operator::GapFillOperator;

/// Wrap `inner` so that its rows come out gap filled
pub fn gap_fill_table(
    inner: Arc<dyn TableProvider>,
    options: FillOptions,
) -> DataFusionResult<Arc<dyn TableProvider>> {
    Ok(Arc::new(GapFillTableProvider::try_new(inner, options)?))
}

/// TableProvider that gap fills another table
#[derive(Debug)]
pub struct GapFillTableProvider {
    inner: Arc<dyn TableProvider>,
    options: FillOptions,
    resolved: ResolvedOptions,
    output_schema: SchemaRef,
}

impl GapFillTableProvider {
    pub fn try_new(inner: Arc<dyn TableProvider>, options: FillOptions) -> DataFusionResult<Self> {
        let input_schema = inner.schema();
        let resolved = ResolvedOptions::resolve(&input_schema, &options)?;
        let output_schema = resolved.output_schema(&input_schema);
        Ok(Self {
            inner,
            options,
            resolved,
            output_schema,
        })
    }

    #[must_use]
    pub fn options(&self) -> &FillOptions {
        &self.options
    }
}

#[async_trait]
impl TableProvider for GapFillTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.output_schema.clone()
    }

    fn table_type(&self) -> TableType {
        self.inner.table_type()
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DataFusionResult<Vec<TableProviderFilterPushDown>> {
        // Filtering before the fill would change the grids
        Ok(vec![TableProviderFilterPushDown::Unsupported; filters.len()])
    }

    async fn scan(
        &self,
        state: &dyn Session,
        projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        _limit: Option<usize>,
    ) -> DataFusionResult<Arc<dyn ExecutionPlan>> {
        let input = self.inner.scan(state, None, &[], None).await?;
        let exec = GapFillExec::new(input, self.resolved.clone(), self.options.page_size)
            .with_projection(projection.cloned())?;
        Ok(Arc::new(exec))
    }
}

/// Physical plan node running one gap-fill operator per input partition
#[derive(Debug)]
pub struct GapFillExec {
    input: Arc<dyn ExecutionPlan>,
    options: ResolvedOptions,
    /// Page size set by the user; otherwise the session batch size is used
    page_size: Option<usize>,
    fill_schema: SchemaRef,
    projection: Option<Vec<usize>>,
    cache: PlanProperties,
}

impl GapFillExec {
    #[must_use]
    pub fn new(
        input: Arc<dyn ExecutionPlan>,
        options: ResolvedOptions,
        page_size: Option<usize>,
    ) -> Self {
        let fill_schema = options.output_schema(&input.schema());
        let cache = Self::compute_properties(input.properties(), fill_schema.clone());
        Self {
            input,
            options,
            page_size,
            fill_schema,
            projection: None,
            cache,
        }
    }

    /// Emit only the given columns of the filled output
    pub fn with_projection(mut self, projection: Option<Vec<usize>>) -> DataFusionResult<Self> {
        let schema = match &projection {
            Some(indices) => Arc::new(self.fill_schema.project(indices)?),
            None => self.fill_schema.clone(),
        };
        self.cache = Self::compute_properties(self.input.properties(), schema);
        self.projection = projection;
        Ok(self)
    }

    fn compute_properties(input: &PlanProperties, output_schema: SchemaRef) -> PlanProperties {
        // Nothing is emitted until the partition's input is exhausted
        PlanProperties::new(
            EquivalenceProperties::new(output_schema),
            Partitioning::UnknownPartitioning(input.output_partitioning().partition_count()),
            EmissionType::Final,
            Boundedness::Bounded,
        )
    }

    fn group_column(&self) -> Column {
        let index = self.options.group_index;
        Column::new(self.input.schema().field(index).name(), index)
    }
}

impl DisplayAs for GapFillExec {
    fn fmt_as(&self, t: DisplayFormatType, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match t {
            DisplayFormatType::Default | DisplayFormatType::Verbose => {
                write!(
                    f,
                    "GapFillExec: mode={}, group={}, frequency={}",
                    self.options.mode,
                    self.group_column().name(),
                    self.options.frequency
                )
            }
            DisplayFormatType::TreeRender => {
                write!(f, "GapFillExec")
            }
        }
    }
}

impl ExecutionPlan for GapFillExec {
    fn name(&self) -> &str {
        "GapFillExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.cache
    }

    fn required_input_distribution(&self) -> Vec<Distribution> {
        vec![Distribution::HashPartitioned(vec![Arc::new(
            self.group_column(),
        )])]
    }

    fn maintains_input_order(&self) -> Vec<bool> {
        vec![false]
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DataFusionResult<Arc<dyn ExecutionPlan>> {
        if children.len() != 1 {
            return Err(DataFusionError::Internal(
                "GapFillExec expects exactly one child".to_string(),
            ));
        }
        let exec = GapFillExec::new(children[0].clone(), self.options.clone(), self.page_size)
            .with_projection(self.projection.clone())?;
        Ok(Arc::new(exec))
    }

    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> DataFusionResult<SendableRecordBatchStream> {
        let mut input = self.input.execute(partition, context.clone())?;
        let input_schema = self.input.schema();
        let projection = self.projection.clone();
        let mut options = self.options.clone();
        options.page_size = self
            .page_size
            .unwrap_or_else(|| context.session_config().batch_size())
            .max(1);
        debug!("GapFillExec executing partition {partition}", partition: partition);

        let stream = async_stream::stream! {
            let mut operator = GapFillOperator::from_resolved(input_schema, options);

            while let Some(batch_result) = input.next().await {
                let pushed = batch_result
                    .and_then(|batch| operator.push(&batch).map_err(DataFusionError::from));
                if let Err(e) = pushed {
                    yield Err(e);
                    return;
                }
            }

            if let Err(e) = operator.finish_input() {
                yield Err(DataFusionError::from(e));
                return;
            }

            loop {
                let page = match operator.next_page() {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(DataFusionError::from(e));
                        break;
                    }
                };
                let last = page.is_last();
                match project(page.batch, projection.as_deref()) {
                    Ok(batch) if batch.num_rows() == 0 => {}
                    Ok(batch) => yield Ok(batch),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
                if last {
                    break;
                }
            }
        };

        Ok(Box::pin(RecordBatchStreamAdapter::new(self.schema(), stream)))
    }
}

fn project(batch: RecordBatch, projection: Option<&[usize]>) -> DataFusionResult<RecordBatch> {
    match projection {
        Some(indices) => batch
            .project(indices)
            .map_err(|e| DataFusionError::ArrowError(e, None)),
        None => Ok(batch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::record_batch;
    use datafusion::datasource::MemTable;
    use datafusion::prelude::{SessionConfig, SessionContext};

    fn memtable(partitions: Vec<Vec<RecordBatch>>) -> Arc<dyn TableProvider> {
        let schema = partitions[0][0].schema();
        Arc::new(MemTable::try_new(schema, partitions).unwrap())
    }

    #[tokio::test]
    async fn test_plan_requires_group_partitioning() {
        let first = record_batch!(
            ("g", Utf8, ["a", "b"]),
            ("t", Int64, [1, 2]),
            ("v", Float64, [1.0, 2.0])
        )
        .unwrap();
        let second = record_batch!(
            ("g", Utf8, ["a", "b"]),
            ("t", Int64, [4, 3]),
            ("v", Float64, [4.0, 3.0])
        )
        .unwrap();
        // Both input partitions hold rows of both groups
        let table = gap_fill_table(
            memtable(vec![vec![first], vec![second]]),
            FillOptions::gaps("g", "t", "v", 1),
        )
        .unwrap();

        let ctx = SessionContext::new_with_config(SessionConfig::new().with_target_partitions(3));
        ctx.register_table("filled", table).unwrap();
        let df = ctx.sql("SELECT * FROM filled").await.unwrap();
        let plan = df.create_physical_plan().await.unwrap();
        let shown = datafusion::physical_plan::displayable(plan.as_ref())
            .indent(true)
            .to_string();
        assert!(shown.contains("GapFillExec"), "{shown}");
        assert!(shown.contains("RepartitionExec"), "{shown}");

        let single = record_batch!(("g", Utf8, ["a"]), ("t", Int64, [1]), ("v", Float64, [1.0]))
            .unwrap();
        let resolved =
            ResolvedOptions::resolve(&single.schema(), &FillOptions::gaps("g", "t", "v", 1))
                .unwrap();
        let input = memtable(vec![vec![single]])
            .scan(&ctx.state(), None, &[], None)
            .await
            .unwrap();
        let exec = GapFillExec::new(input, resolved, None);
        match &exec.required_input_distribution()[0] {
            Distribution::HashPartitioned(exprs) => {
                let column = exprs[0].as_any().downcast_ref::<Column>().unwrap();
                assert_eq!(column.name(), "g");
                assert_eq!(column.index(), 0);
            }
            other => panic!("unexpected distribution {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_projection_applied_after_fill() {
        let batch = record_batch!(
            ("g", Utf8, ["a", "a"]),
            ("t", Int64, [1, 3]),
            ("v", Float64, [1.0, 3.0])
        )
        .unwrap();
        let table = gap_fill_table(memtable(vec![vec![batch]]), FillOptions::gaps("g", "t", "v", 1))
            .unwrap();
        let ctx = SessionContext::new();
        ctx.register_table("filled", table).unwrap();

        let batches = ctx
            .sql("SELECT v FROM filled")
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 3);
        assert_eq!(batches[0].num_columns(), 1);
        let nulls: usize = batches.iter().map(|b| b.column(0).null_count()).sum();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_invalid_options_fail_at_wrap() {
        let batch = record_batch!(("g", Utf8, ["a"]), ("t", Int64, [1]), ("v", Float64, [1.0]))
            .unwrap();
        let err = gap_fill_table(memtable(vec![vec![batch]]), FillOptions::gaps("g", "t", "v", "1d"))
            .unwrap_err();
        assert!(err.to_string().contains("integer"), "{err}");
    }
}
