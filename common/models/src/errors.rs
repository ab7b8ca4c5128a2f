use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid label matcher regex '{}': {}", pattern, source))]
    InvalidMatcherRegex {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Invalid time range: min_ts {} > max_ts {}", min_ts, max_ts))]
    InvalidTimeRange { min_ts: i64, max_ts: i64 },
}
