use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Longest allowed query interval in milliseconds. 0 disables the check.
    #[serde(default = "LimitsConfig::default_max_query_length")]
    pub max_query_length: i64,

    /// Most chunks a single query may touch. 0 disables the check.
    #[serde(default = "LimitsConfig::default_max_chunks_per_query")]
    pub max_chunks_per_query: usize,
}

impl LimitsConfig {
    fn default_max_query_length() -> i64 {
        0
    }

    fn default_max_chunks_per_query() -> usize {
        0
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_length: Self::default_max_query_length(),
            max_chunks_per_query: Self::default_max_chunks_per_query(),
        }
    }
}
