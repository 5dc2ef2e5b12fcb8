//! Default locations.
//!
//! Everything lives under `~/.nodewiz/`:
//! - `~/.nodewiz/config.toml` - main configuration
//! - `~/.nodewiz/clusters.json`, `nodes/`, `subnets/` - cluster state
//! - `~/.nodewiz/keys/` - per-host staking keys
//! - `~/.nodewiz/ssh/` - per-region SSH key pairs

use std::path::PathBuf;

/// The nodewiz home directory (`~/.nodewiz/`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nodewiz")
}

/// The default config file path (`~/.nodewiz/config.toml`).
pub fn default_config() -> PathBuf {
    home_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lives_under_nodewiz_home() {
        let config = default_config();
        assert!(config.starts_with(home_dir()));
        assert!(home_dir().ends_with(".nodewiz"));
    }
}
