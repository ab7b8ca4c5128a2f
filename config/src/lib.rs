use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub use crate::blockstore_config::*;
pub use crate::cache_config::*;
pub use crate::limits_config::*;
pub use crate::schema_config::*;
pub use crate::store_config::*;

mod blockstore_config;
mod cache_config;
mod limits_config;
mod schema_config;
mod store_config;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to read config file '{}': {}", path, source))]
    ReadConfigFile {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file '{}': {}", path, source))]
    ParseConfigFile {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default = "Default::default")]
    pub schema: SchemaConfig,

    #[serde(default = "Default::default")]
    pub store: StoreConfig,

    #[serde(default = "Default::default")]
    pub limits: LimitsConfig,

    #[serde(default = "Default::default")]
    pub block_store: BlockStoreConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path_display = path.as_ref().display().to_string();
        let mut content = String::new();
        File::open(path.as_ref())
            .and_then(|mut f| f.read_to_string(&mut content))
            .context(ReadConfigFileSnafu {
                path: path_display.clone(),
            })?;
        toml::from_str(&content).context(ParseConfigFileSnafu { path: path_display })
    }
}
