use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_csv::WriterBuilder;
use clap::ValueEnum;
use datafusion::datasource::TableProvider;
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions, SessionContext};
use parquet::arrow::ArrowWriter;

/// How filled rows are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table
    #[default]
    Table,
    /// CSV with a header row
    Csv,
    /// Parquet file
    Parquet,
}

/// Which runner executes the fill
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// DataFusion plan, one operator per hash partition
    #[default]
    Plan,
    /// Hash-sharded operators on blocking tasks
    Sharded,
}

/// Input file formats, chosen by extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Parquet,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(InputFormat::Csv),
            Some("parquet") | Some("pq") => Ok(InputFormat::Parquet),
            _ => Err(anyhow!(
                "Cannot determine input format of {}; expected a .csv or .parquet file",
                path.display()
            )),
        }
    }
}

/// Register `path` as table `name` and return its provider
pub async fn register_input(
    ctx: &SessionContext,
    name: &str,
    path: &Path,
) -> Result<Arc<dyn TableProvider>> {
    let location = path
        .to_str()
        .ok_or_else(|| anyhow!("Input path is not valid UTF-8: {}", path.display()))?;
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }

    match InputFormat::from_path(path)? {
        InputFormat::Csv => ctx
            .register_csv(name, location, CsvReadOptions::new().has_header(true))
            .await
            .with_context(|| format!("Failed to read CSV {}", path.display()))?,
        InputFormat::Parquet => ctx
            .register_parquet(name, location, ParquetReadOptions::default())
            .await
            .with_context(|| format!("Failed to read Parquet {}", path.display()))?,
    }

    ctx.table_provider(name)
        .await
        .map_err(|e| anyhow!("Failed to open registered input {name}: {e}"))
}

/// Write `batches` in `format`, to `path` when given, to `output` when
/// capturing, and to stdout otherwise. CSV and Parquet output is opened from
/// `schema`, so an empty result still yields a header or a valid file.
pub fn write_batches(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    format: OutputFormat,
    path: Option<&Path>,
    output: Option<&mut String>,
) -> Result<()> {
    let schema = batches
        .first()
        .map_or_else(|| schema.clone(), RecordBatch::schema);
    match format {
        OutputFormat::Table => {
            let text = if batches.iter().all(|b| b.num_rows() == 0) {
                "No results found.\n".to_string()
            } else {
                let table = arrow_cast::pretty::pretty_format_batches(batches)
                    .map_err(|e| anyhow!("Failed to format results as table: {e}"))?;
                format!("{table}\n")
            };
            emit_text(&text, path, output)
        }
        OutputFormat::Csv => {
            let mut buffer = Vec::new();
            {
                let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
                if batches.is_empty() {
                    writer
                        .write(&RecordBatch::new_empty(schema))
                        .map_err(|e| anyhow!("Failed to write CSV header: {e}"))?;
                }
                for batch in batches {
                    writer
                        .write(batch)
                        .map_err(|e| anyhow!("Failed to write CSV: {e}"))?;
                }
            }
            let text = String::from_utf8(buffer).context("CSV output is not UTF-8")?;
            emit_text(&text, path, output)
        }
        OutputFormat::Parquet => match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_parquet(file, schema, batches)
            }
            None => write_parquet(io::stdout(), schema, batches),
        },
    }
}

fn write_parquet<W: Write + Send>(
    sink: W,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<()> {
    let mut writer = ArrowWriter::try_new(sink, schema, None)
        .map_err(|e| anyhow!("Failed to create parquet writer: {e}"))?;
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| anyhow!("Failed to write batch to parquet: {e}"))?;
    }
    let _metadata = writer
        .close()
        .map_err(|e| anyhow!("Failed to close parquet writer: {e}"))?;
    Ok(())
}

fn emit_text(text: &str, path: Option<&Path>, output: Option<&mut String>) -> Result<()> {
    if let Some(path) = path {
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    } else if let Some(output) = output {
        output.push_str(text);
    } else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::record_batch;
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("g", DataType::Utf8, false),
            Field::new("t", DataType::Int64, false),
        ]))
    }

    #[test]
    fn test_input_format_by_extension() {
        assert_eq!(
            InputFormat::from_path(Path::new("a/b.CSV")).unwrap(),
            InputFormat::Csv
        );
        assert_eq!(
            InputFormat::from_path(Path::new("x.parquet")).unwrap(),
            InputFormat::Parquet
        );
        assert!(InputFormat::from_path(Path::new("x.json")).is_err());
    }

    #[test]
    fn test_csv_output_captured() {
        let batch = record_batch!(("g", Utf8, ["a", "a"]), ("t", Int64, [1, 2])).unwrap();
        let mut out = String::new();
        write_batches(&batch.schema(), &[batch], OutputFormat::Csv, None, Some(&mut out)).unwrap();
        assert_eq!(out, "g,t\na,1\na,2\n");
    }

    #[test]
    fn test_empty_table_output() {
        let mut out = String::new();
        write_batches(&schema(), &[], OutputFormat::Table, None, Some(&mut out)).unwrap();
        assert_eq!(out, "No results found.\n");
    }

    #[test]
    fn test_empty_csv_keeps_header() {
        let mut out = String::new();
        write_batches(&schema(), &[], OutputFormat::Csv, None, Some(&mut out)).unwrap();
        assert_eq!(out, "g,t\n");
    }

    #[test]
    fn test_empty_parquet_is_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.parquet");
        write_batches(&schema(), &[], OutputFormat::Parquet, Some(&path), None).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.schema().fields().len(), 2);
        assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    }
}
