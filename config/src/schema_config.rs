use models::Timestamp;
use serde::{Deserialize, Serialize};

pub const SECONDS_IN_WEEK: i64 = 7 * 24 * 3600;

/// Naming of one family of time-bucketed tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodicTableConfig {
    #[serde(default = "PeriodicTableConfig::default_prefix")]
    pub prefix: String,
    #[serde(default = "PeriodicTableConfig::default_period_secs")]
    pub period_secs: i64,
}

impl PeriodicTableConfig {
    fn default_prefix() -> String {
        "index_".to_string()
    }

    fn default_period_secs() -> i64 {
        SECONDS_IN_WEEK
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            period_secs: Self::default_period_secs(),
        }
    }

    /// Bucket number for a millisecond timestamp.
    pub fn bucket_for(&self, ts: Timestamp) -> i64 {
        (ts / 1000) / self.period_secs
    }

    pub fn table_for(&self, ts: Timestamp) -> String {
        format!("{}{}", self.prefix, self.bucket_for(ts))
    }

    pub fn table_for_bucket(&self, bucket: i64) -> String {
        format!("{}{}", self.prefix, bucket)
    }
}

impl Default for PeriodicTableConfig {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
            period_secs: Self::default_period_secs(),
        }
    }
}

/// One schema entry, active from `from` until superseded by a later entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodicSchemaConfig {
    #[serde(default = "PeriodicSchemaConfig::default_schema")]
    pub schema: String,
    /// Effective-from, millisecond timestamp.
    #[serde(default)]
    pub from: Timestamp,
    #[serde(default = "Default::default")]
    pub index_tables: PeriodicTableConfig,
    #[serde(default = "PeriodicSchemaConfig::default_chunk_tables")]
    pub chunk_tables: PeriodicTableConfig,
}

impl PeriodicSchemaConfig {
    fn default_schema() -> String {
        "v10".to_string()
    }

    fn default_chunk_tables() -> PeriodicTableConfig {
        PeriodicTableConfig::with_prefix("chunks_")
    }
}

impl Default for PeriodicSchemaConfig {
    fn default() -> Self {
        Self {
            schema: Self::default_schema(),
            from: 0,
            index_tables: Default::default(),
            chunk_tables: Self::default_chunk_tables(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaConfig {
    #[serde(default = "SchemaConfig::default_configs")]
    pub configs: Vec<PeriodicSchemaConfig>,
}

impl SchemaConfig {
    fn default_configs() -> Vec<PeriodicSchemaConfig> {
        vec![PeriodicSchemaConfig::default()]
    }

    /// The entry active at `ts`: greatest `from <= ts`. Entries must be
    /// sorted ascending by `from`.
    pub fn active_at(&self, ts: Timestamp) -> Option<&PeriodicSchemaConfig> {
        self.configs.iter().rev().find(|c| c.from <= ts)
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            configs: Self::default_configs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_bucketing() {
        let tables = PeriodicTableConfig::with_prefix("index_");
        // 2497 weeks of seconds, as milliseconds.
        let ts = 2497 * SECONDS_IN_WEEK * 1000;
        assert_eq!(tables.table_for(ts), "index_2497");
        assert_eq!(tables.table_for(ts + 1), "index_2497");
        assert_eq!(tables.table_for(ts - 1), "index_2496");
    }

    #[test]
    fn test_active_at() {
        let config = SchemaConfig {
            configs: vec![
                PeriodicSchemaConfig {
                    schema: "v9".to_string(),
                    from: 0,
                    ..Default::default()
                },
                PeriodicSchemaConfig {
                    schema: "v10".to_string(),
                    from: 1000,
                    ..Default::default()
                },
            ],
        };
        assert_eq!(config.active_at(500).unwrap().schema, "v9");
        assert_eq!(config.active_at(1000).unwrap().schema, "v10");
        assert_eq!(config.active_at(2000).unwrap().schema, "v10");
    }
}
