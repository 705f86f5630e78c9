use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use clap::Args;
use datafusion::prelude::{SessionConfig, SessionContext};
use diagnostics::*;
use gapfill::{FillMode, FillOptions, FrequencyValue, ShardedGapFill, TargetTime, gap_fill_table};

use crate::common::{Engine, OutputFormat, register_input, write_batches};

/// Options shared by the `gaps` and `forward` subcommands
#[derive(Args, Debug, Clone)]
pub struct FillArgs {
    /// Input file (.csv or .parquet)
    pub input: PathBuf,

    /// Column identifying each series
    #[arg(long)]
    pub group: Option<String>,

    /// Time column (integer, date or timestamp)
    #[arg(long)]
    pub time: Option<String>,

    /// Numeric value column
    #[arg(long)]
    pub value: Option<String>,

    /// Integer step, or one of 30m, 1h, 1d, 1w, 1mo, 1q, 1y
    #[arg(long)]
    pub frequency: Option<String>,

    /// YAML file with fill options; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Rows per output page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Reject unknown frequency tokens instead of using 1d
    #[arg(long)]
    pub strict_frequency: bool,

    #[arg(long, value_enum, default_value_t = Engine::Plan)]
    pub engine: Engine,

    /// Target partitions for the plan engine
    #[arg(long, default_value_t = 1)]
    pub partitions: usize,

    /// Shard count for the sharded engine
    #[arg(long, default_value_t = 4)]
    pub shards: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Write output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// SQL to run against the filled rows, registered as table `filled`
    #[arg(long)]
    pub query: Option<String>,
}

impl FillArgs {
    /// Arguments for `input` with every option at its default
    #[must_use]
    pub fn for_input(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            group: None,
            time: None,
            value: None,
            frequency: None,
            config: None,
            page_size: None,
            strict_frequency: false,
            engine: Engine::Plan,
            partitions: 1,
            shards: 4,
            format: OutputFormat::Table,
            output: None,
            query: None,
        }
    }
}

/// Merge the config file and command-line flags into fill options
pub fn build_options(mode: FillMode, args: &FillArgs, target: Option<&str>) -> Result<FillOptions> {
    let mut options = match &args.config {
        Some(path) => FillOptions::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FillOptions {
            mode,
            group_column: String::new(),
            time_column: String::new(),
            value_column: String::new(),
            frequency: None,
            target: None,
            page_size: None,
            default_to_daily_on_unknown_token: true,
        },
    };

    options.mode = mode;
    if let Some(group) = &args.group {
        options.group_column = group.clone();
    }
    if let Some(time) = &args.time {
        options.time_column = time.clone();
    }
    if let Some(value) = &args.value {
        options.value_column = value.clone();
    }
    if let Some(frequency) = &args.frequency {
        options.frequency = Some(FrequencyValue::from_cli(frequency));
    }
    if args.page_size.is_some() {
        options.page_size = args.page_size;
    }
    if args.strict_frequency {
        options.default_to_daily_on_unknown_token = false;
    }
    match mode {
        FillMode::Gaps => options.target = None,
        FillMode::Forward => {
            if let Some(target) = target {
                options.target = Some(TargetTime::from(target));
            }
        }
    }

    for (flag, column) in [
        ("--group", &options.group_column),
        ("--time", &options.time_column),
        ("--value", &options.value_column),
    ] {
        if column.is_empty() {
            return Err(anyhow!("{flag} is required when the config file does not name it"));
        }
    }
    if options.frequency.is_none() {
        return Err(anyhow!("--frequency is required when the config file does not set it"));
    }
    if mode == FillMode::Forward && options.target.is_none() {
        return Err(anyhow!("forward requires --target or a target in the config file"));
    }
    Ok(options)
}

/// Fill the input file and write the result
pub async fn fill_command(
    mode: FillMode,
    args: &FillArgs,
    target: Option<&str>,
    output: Option<&mut String>,
) -> Result<()> {
    let options = build_options(mode, args, target)?;
    let input_name = args.input.display().to_string();
    debug!(
        "fill_command mode {mode} on {input_name}",
        mode: mode.to_string(),
        input_name: input_name.clone()
    );

    let (schema, batches) = match args.engine {
        Engine::Plan => run_plan(args, options).await?,
        Engine::Sharded => run_sharded(args, options).await?,
    };

    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    info!("Filled {input_name}: {rows} rows", input_name: input_name, rows: rows);

    write_batches(&schema, &batches, args.format, args.output.as_deref(), output)
}

async fn run_plan(args: &FillArgs, options: FillOptions) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let config = SessionConfig::new().with_target_partitions(args.partitions.max(1));
    let ctx = SessionContext::new_with_config(config);
    let input = register_input(&ctx, "input", &args.input).await?;

    let table = gap_fill_table(input, options)?;
    let _ = ctx
        .register_table("filled", table)
        .map_err(|e| anyhow!("Failed to register filled table: {e}"))?;

    let sql = args.query.as_deref().unwrap_or("SELECT * FROM filled");
    debug!("Executing SQL query: {sql}", sql: sql);
    let df = ctx
        .sql(sql)
        .await
        .map_err(|e| anyhow!("Failed to plan query: {e}"))?;
    let schema = df.schema().inner().clone();
    let batches = df
        .collect()
        .await
        .map_err(|e| anyhow!("Failed to execute query: {e}"))?;
    Ok((schema, batches))
}

async fn run_sharded(args: &FillArgs, options: FillOptions) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    if args.query.is_some() {
        return Err(anyhow!("--query requires the plan engine"));
    }
    let ctx = SessionContext::new();
    let input = register_input(&ctx, "input", &args.input).await?;
    let schema = input.schema();
    let rows = ctx
        .read_table(input)
        .map_err(|e| anyhow!("Failed to read input: {e}"))?
        .collect()
        .await
        .map_err(|e| anyhow!("Failed to read input: {e}"))?;

    let runner = ShardedGapFill::try_new(schema, options, args.shards)?;
    let batches = runner.run_batches(rows).await?;
    Ok((runner.output_schema(), batches))
}
