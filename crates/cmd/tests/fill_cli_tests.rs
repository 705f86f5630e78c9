//! Fill command tests against CSV and Parquet files in a temporary directory

use std::fs;
use std::path::{Path, PathBuf};

use cmd::commands::{FillArgs, fill_command};
use cmd::common::{Engine, OutputFormat};
use gapfill::FillMode;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::tempdir;

fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn daily_args(input: PathBuf) -> FillArgs {
    let mut args = FillArgs::for_input(input);
    args.group = Some("unique_id".into());
    args.time = Some("ds".into());
    args.value = Some("y".into());
    args.frequency = Some("1d".into());
    args.format = OutputFormat::Csv;
    args
}

#[tokio::test]
async fn test_gaps_csv_to_csv() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "daily.csv",
        "unique_id,ds,y\nA,2024-01-01,1.0\nA,2024-01-03,3.0\n",
    );

    let mut out = String::new();
    fill_command(FillMode::Gaps, &daily_args(input), None, Some(&mut out))
        .await
        .unwrap();

    assert_eq!(
        out,
        "unique_id,ds,y\nA,2024-01-01,1.0\nA,2024-01-02,\nA,2024-01-03,3.0\n"
    );
}

#[tokio::test]
async fn test_integer_step_keeps_first_duplicate() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "ticks.csv",
        "unique_id,ds,y\nB,10,5.0\nB,10,9.0\nB,16,2.0\n",
    );
    let mut args = daily_args(input);
    args.frequency = Some("2".into());

    let mut out = String::new();
    fill_command(FillMode::Gaps, &args, None, Some(&mut out))
        .await
        .unwrap();
    assert_eq!(out, "unique_id,ds,y\nB,10,5.0\nB,12,\nB,14,\nB,16,2.0\n");
}

#[tokio::test]
async fn test_forward_with_target() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "weekly.csv",
        "unique_id,ds,y\nC,2024-01-05,1.0\nC,2024-01-10,2.0\n",
    );
    let mut args = daily_args(input);
    args.frequency = Some("1w".into());

    let mut out = String::new();
    fill_command(FillMode::Forward, &args, Some("2024-01-12"), Some(&mut out))
        .await
        .unwrap();
    assert_eq!(out, "unique_id,ds,y\nC,2024-01-05,1.0\nC,2024-01-12,\n");
}

#[tokio::test]
async fn test_config_file_supplies_columns() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "daily.csv",
        "unique_id,ds,y\nA,2024-01-01,1.0\nA,2024-01-04,4.0\n",
    );
    let config = tmp.path().join("fill.yaml");
    fs::write(
        &config,
        "mode: gaps\ngroup_column: unique_id\ntime_column: ds\nvalue_column: y\nfrequency: 1d\n",
    )
    .unwrap();

    let mut args = FillArgs::for_input(input);
    args.config = Some(config);
    args.query = Some("SELECT count(*) AS n, count(y) AS observed FROM filled".into());
    let mut out = String::new();
    fill_command(FillMode::Gaps, &args, None, Some(&mut out))
        .await
        .unwrap();
    assert!(out.contains("| 4 | 2        |"), "{out}");
}

#[tokio::test]
async fn test_parquet_round_trip_with_sharded_engine() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "multi.csv",
        "unique_id,ds,y\nA,2024-01-01,1.0\nB,2024-02-01,1.0\nA,2024-01-05,5.0\nB,2024-02-03,3.0\n",
    );
    let parquet_path = tmp.path().join("filled.parquet");
    let mut args = daily_args(input);
    args.engine = Engine::Sharded;
    args.shards = 3;
    args.format = OutputFormat::Parquet;
    args.output = Some(parquet_path.clone());
    fill_command(FillMode::Gaps, &args, None, None).await.unwrap();

    // Filled parquet is itself valid input
    let file = fs::File::open(&parquet_path).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
    assert_eq!(rows, 5 + 3);

    let mut again = daily_args(parquet_path);
    again.query = Some("SELECT count(*) AS n FROM filled".into());
    again.format = OutputFormat::Csv;
    let mut out = String::new();
    fill_command(FillMode::Gaps, &again, None, Some(&mut out))
        .await
        .unwrap();
    assert_eq!(out, "n\n8\n");
}

#[tokio::test]
async fn test_usage_errors() {
    let tmp = tempdir().unwrap();
    let input = write_csv(tmp.path(), "d.csv", "unique_id,ds,y\nA,2024-01-01,1.0\n");

    let mut args = daily_args(input.clone());
    args.engine = Engine::Sharded;
    args.query = Some("SELECT * FROM filled".into());
    assert!(fill_command(FillMode::Gaps, &args, None, None).await.is_err());

    let mut args = daily_args(input.clone());
    args.frequency = Some("1h".into());
    let err = fill_command(FillMode::Gaps, &args, None, None)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("sub-day"), "{err:#}");

    let args = daily_args(tmp.path().join("missing.csv"));
    assert!(fill_command(FillMode::Gaps, &args, None, None).await.is_err());

    let args = daily_args(write_csv(tmp.path(), "d.txt", "x\n"));
    assert!(fill_command(FillMode::Gaps, &args, None, None).await.is_err());
}

#[tokio::test]
async fn test_empty_query_result_writes_valid_files() {
    let tmp = tempdir().unwrap();
    let input = write_csv(
        tmp.path(),
        "daily.csv",
        "unique_id,ds,y\nA,2024-01-01,1.0\nA,2024-01-03,3.0\n",
    );

    let parquet_path = tmp.path().join("none.parquet");
    let mut args = daily_args(input.clone());
    args.query = Some("SELECT * FROM filled WHERE 1 = 0".into());
    args.format = OutputFormat::Parquet;
    args.output = Some(parquet_path.clone());
    fill_command(FillMode::Gaps, &args, None, None).await.unwrap();

    let builder = ParquetRecordBatchReaderBuilder::try_new(fs::File::open(&parquet_path).unwrap())
        .unwrap();
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["unique_id", "ds", "y"]);
    let rows: usize = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
    assert_eq!(rows, 0);

    let csv_path = tmp.path().join("none.csv");
    let mut args = daily_args(input);
    args.query = Some("SELECT * FROM filled WHERE 1 = 0".into());
    args.output = Some(csv_path.clone());
    fill_command(FillMode::Gaps, &args, None, None).await.unwrap();
    assert_eq!(fs::read_to_string(&csv_path).unwrap(), "unique_id,ds,y\n");
}
