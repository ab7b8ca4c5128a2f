use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("metric name label missing"))]
    MetricNameLabelMissing,

    #[snafu(display("invalid query, through < from ({} < {})", through, from))]
    InvalidQueryRange { from: i64, through: i64 },

    #[snafu(display("query length {}ms exceeds limit {}ms", length, limit))]
    QueryTooLong { length: i64, limit: i64 },

    #[snafu(display("query fetched too many chunks ({} > {})", fetched, limit))]
    TooManyChunks { fetched: usize, limit: usize },

    #[snafu(display("query must contain metric name"))]
    QueryMustContainMetricName,

    #[snafu(display("interval for partial deletion has no overlap with chunk interval"))]
    PartialDeleteNoOverlap,

    #[snafu(display("no data points in slice range"))]
    NoDataInSliceRange,

    #[snafu(display("storage object not found: {}", key))]
    ObjectNotFound { key: String },

    #[snafu(display("invalid external chunk key '{}'", key))]
    InvalidExternalKey { key: String },

    #[snafu(display("invalid index range value"))]
    InvalidRangeValue,

    #[snafu(display("chunk checksum mismatch, expected {:x} got {:x}", expected, actual))]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[snafu(display("failed to decode chunk: {}", reason))]
    DecodeChunk { reason: String },

    #[snafu(display("chunk has no encoded payload"))]
    ChunkNotEncoded,

    #[snafu(display("operation cancelled"))]
    Cancelled,

    #[snafu(display("{}", msg))]
    Unimplemented { msg: String },

    #[snafu(display("{}", reason))]
    CommonError { reason: String },
}

impl Error {
    /// HTTP-equivalent status. Validation failures map to 400, the rest to
    /// 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MetricNameLabelMissing
            | Error::InvalidQueryRange { .. }
            | Error::QueryTooLong { .. }
            | Error::TooManyChunks { .. }
            | Error::QueryMustContainMetricName => 400,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ObjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::MetricNameLabelMissing.status_code(), 400);
        assert_eq!(
            Error::InvalidQueryRange {
                from: 2000,
                through: 1000
            }
            .status_code(),
            400
        );
        assert_eq!(
            Error::ObjectNotFound {
                key: "x".to_string()
            }
            .status_code(),
            500
        );
    }
}
