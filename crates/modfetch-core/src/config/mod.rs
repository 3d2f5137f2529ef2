//! Engine configuration
//!
//! Settings are layered, last one wins:
//! - Built-in defaults
//! - `modfetch.toml` (explicit path, else `<config dir>/modfetch/modfetch.toml`)
//! - `MODFETCH_STORE_PATH` / `MODFETCH_GIT` environment variables

pub mod parser;
pub mod schema;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use parser::{parse_fetch_toml, parse_fetch_toml_str, to_toml};
pub use schema::{ENV_GIT_BINARY, ENV_STORE_PATH, FetchConfig};

/// File name looked up in the user config directory
pub const CONFIG_FILE_NAME: &str = "modfetch.toml";

/// `<config dir>/modfetch/modfetch.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("modfetch").join(CONFIG_FILE_NAME))
}

/// Load the effective configuration.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&Path>) -> Result<FetchConfig> {
    let mut config = match path {
        Some(path) => parse_fetch_toml(path)?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                parse_fetch_toml(&path)?
            }
            None => FetchConfig::default(),
        },
    };
    config.apply_env();
    Ok(config)
}
