pub mod fill;

pub use fill::{FillArgs, build_options, fill_command};
