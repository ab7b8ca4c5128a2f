use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "CacheConfig::default_capacity")]
    pub capacity: usize,
    /// Entry lifetime in seconds. 0 means no expiry.
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_capacity() -> usize {
        1024
    }

    fn default_ttl_secs() -> u64 {
        0
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            capacity: Self::default_capacity(),
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}
