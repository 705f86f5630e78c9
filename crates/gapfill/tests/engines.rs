//! The DataFusion plan and the sharded runner agree with a single operator

use std::sync::Arc;

use arrow::array::{Array, AsArray, RecordBatch, record_batch};
use arrow::datatypes::{Float64Type, Int64Type};
use datafusion::datasource::MemTable;
use datafusion::prelude::{SessionConfig, SessionContext};
use gapfill::{FillOptions, ShardedGapFill, fill_batches, gap_fill_table};

fn input() -> Vec<RecordBatch> {
    vec![
        record_batch!(
            ("g", Utf8, ["a", "b", "c", "a"]),
            ("t", Int64, [0, 10, 3, 8]),
            ("v", Float64, [1.0, 2.0, 3.0, 4.0])
        )
        .unwrap(),
        record_batch!(
            ("g", Utf8, ["d", "b", "c", "e"]),
            ("t", Int64, [1, 16, 9, 5]),
            ("v", Float64, [5.0, 6.0, 7.0, 8.0])
        )
        .unwrap(),
        record_batch!(
            ("g", Utf8, ["a", "d", "e"]),
            ("t", Int64, [4, 7, 6]),
            ("v", Float64, [9.0, 10.0, 11.0])
        )
        .unwrap(),
    ]
}

fn sorted_rows(batches: &[RecordBatch]) -> Vec<(String, i64, Option<f64>)> {
    let mut out = Vec::new();
    for batch in batches {
        let g = batch.column(0).as_string::<i32>();
        let t = batch.column(1).as_primitive::<Int64Type>();
        let v = batch.column(2).as_primitive::<Float64Type>();
        for i in 0..batch.num_rows() {
            out.push((
                g.value(i).to_string(),
                t.value(i),
                (!v.is_null(i)).then(|| v.value(i)),
            ));
        }
    }
    out.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    out
}

fn options() -> FillOptions {
    FillOptions::gaps("g", "t", "v", 1).with_page_size(3)
}

fn reference() -> Vec<(String, i64, Option<f64>)> {
    let batches = input();
    let schema = batches[0].schema();
    sorted_rows(&fill_batches(schema, options(), batches.iter()).unwrap())
}

#[tokio::test]
async fn test_plan_matches_single_operator() {
    let batches = input();
    let schema = batches[0].schema();
    // Each input partition holds rows of several groups
    let partitions = batches.into_iter().map(|b| vec![b]).collect();
    let table = Arc::new(MemTable::try_new(schema, partitions).unwrap());

    for target_partitions in [1, 2, 4] {
        let config = SessionConfig::new()
            .with_target_partitions(target_partitions)
            .with_batch_size(2);
        let ctx = SessionContext::new_with_config(config);
        ctx.register_table("filled", gap_fill_table(table.clone(), options()).unwrap())
            .unwrap();

        let out = ctx
            .sql("SELECT g, t, v FROM filled")
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(sorted_rows(&out), reference(), "{target_partitions} partitions");
    }
}

#[tokio::test]
async fn test_sql_over_filled_table() {
    let batches = input();
    let schema = batches[0].schema();
    let table = Arc::new(MemTable::try_new(schema, vec![batches]).unwrap());
    let ctx = SessionContext::new();
    ctx.register_table("filled", gap_fill_table(table, options()).unwrap())
        .unwrap();

    let out = ctx
        .sql("SELECT g, count(*) AS n, count(v) AS observed FROM filled GROUP BY g ORDER BY g")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let batch = arrow::compute::concat_batches(&out[0].schema(), &out).unwrap();
    let n = batch.column(1).as_primitive::<Int64Type>();
    let observed = batch.column(2).as_primitive::<Int64Type>();

    // a: 0..=8, b: 10..=16, c: 3..=9, d: 1..=7, e: 5..=6
    assert_eq!(n.values().to_vec(), vec![9, 7, 7, 7, 2]);
    assert_eq!(observed.values().to_vec(), vec![3, 2, 2, 2, 2]);
}

#[tokio::test]
async fn test_sharded_runner_matches_single_operator() {
    for shards in [1, 2, 3, 8] {
        let batches = input();
        let runner = ShardedGapFill::try_new(batches[0].schema(), options(), shards).unwrap();
        let out = runner.run_batches(batches).await.unwrap();
        assert_eq!(sorted_rows(&out), reference(), "{shards} shards");
    }
}

#[tokio::test]
async fn test_sharded_output_is_deterministic() {
    let runner = ShardedGapFill::try_new(input()[0].schema(), options(), 4).unwrap();
    let first = runner.run_batches(input()).await.unwrap();
    let second = runner.run_batches(input()).await.unwrap();
    assert_eq!(first, second);
}
