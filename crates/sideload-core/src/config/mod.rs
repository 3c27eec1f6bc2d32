//! Configuration for the deployment core.
//!
//! A single `sideload.toml` holds the output root for bundle extraction, the
//! default retain flag and how to invoke the device bridge. A missing file
//! means defaults.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_sideload_toml, parse_sideload_toml_str, to_toml};
pub use paths::{CONFIG_FILE_NAME, default_config_path};
pub use schema::{BridgeConfig, SideloadConfig};
pub use store::ConfigStore;
