//! Grouped time-grid gap filling over Arrow record batches.
//!
//! Rows of many independent series (groups) are pushed into a
//! [`GapFillOperator`]. When input ends, each group is resampled onto a
//! regular grid between its first and last time (or forward to a target
//! time) and the result is pulled back as bounded pages, with null rows for
//! grid points that had no input.
//!
//! The operator is engine agnostic. [`gap_fill_table`] plugs it into
//! DataFusion and [`ShardedGapFill`] runs several operators over hashed
//! shards of the input.

pub mod buffer;
pub mod config;
pub mod emitter;
pub mod error;
pub mod exec;
pub mod frequency;
pub mod grid;
pub mod operator;
pub mod parallel;
pub mod sequence;
pub mod time;

pub use buffer::{GroupBuffer, GroupId, GroupKey, RowRef, SeriesBuffer};
pub use config::{
    DEFAULT_PAGE_SIZE, FillMode, FillOptions, FrequencyValue, ResolvedOptions, TargetTime,
};
pub use emitter::OutputCursor;
pub use error::{GapFillError, Result};
pub use exec::{GapFillExec, GapFillTableProvider, gap_fill_table};
pub use frequency::{CalendarInterval, Frequency, FrequencyResolver};
pub use grid::Grid;
pub use operator::{DrainStatus, GapFillOperator, OperatorPhase, Page, fill_batches};
pub use parallel::ShardedGapFill;
pub use sequence::ReorderBuffer;
pub use time::{TimeDomain, TimeDomainKind};
