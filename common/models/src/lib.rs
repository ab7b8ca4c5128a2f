pub use errors::{Error, Result};
pub use labels::{Label, Labels, METRIC_NAME_LABEL};
pub use matcher::{extract_metric_name, MatchType, Matcher};
pub use time_range::TimeRange;

mod errors;
mod labels;
mod matcher;
pub mod time_range;
pub mod utils;

/// Millisecond-precision timestamp.
pub type Timestamp = i64;

/// Stable 64-bit hash of a label set, identifying one series.
pub type Fingerprint = u64;
