use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SCREENFLOW_CONFIG";

/// Read `path` as TOML, then layer `SCREENFLOW_*` variables on top.
///
/// `__` separates nested keys (`SCREENFLOW_SERVER__PORT`). `SCREENFLOW_CONFIG`
/// names the file itself and is never treated as a key.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("SCREENFLOW_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a TOML document without consulting the environment.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
