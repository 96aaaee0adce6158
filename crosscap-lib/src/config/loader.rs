use std::fs;
use std::path::Path;

use crate::config::types::MatchConfig;
use crate::config::validator::validate;
use crate::error::{CrosscapError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<MatchConfig> {
    let txt = fs::read_to_string(p)
        .map_err(|e| CrosscapError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: MatchConfig = toml::from_str(&txt)
        .map_err(|e| CrosscapError::Config(format!("Failed to parse config: {e}")))?;

    validate(&cfg)?;

    Ok(cfg)
}
