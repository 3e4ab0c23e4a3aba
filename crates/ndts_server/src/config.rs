//! Server configuration: a TOML file overridable by `NDTS_*` environment
//! variables and CLI flags, in the style of the pack's config/toml-using
//! binaries.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config { data_dir: default_data_dir(), bind_addr: default_bind_addr(), log_level: default_log_level() }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)?
            }
            _ => Config::default(),
        };

        if let Ok(v) = std::env::var("NDTS_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("NDTS_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("NDTS_LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }

    /// Applies CLI overrides, which take precedence over file and environment.
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, bind_addr: Option<String>, log_level: Option<String>) -> Self {
        if let Some(d) = data_dir {
            self.data_dir = d;
        }
        if let Some(b) = bind_addr {
            self.bind_addr = b;
        }
        if let Some(l) = log_level {
            self.log_level = l;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7878");
    }

    #[test]
    fn file_values_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndts.toml");
        std::fs::write(&path, "data_dir = \"/tmp/ndts\"\nbind_addr = \"0.0.0.0:9000\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ndts"));
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let config = Config::default().with_overrides(Some(PathBuf::from("/override")), None, None);
        assert_eq!(config.data_dir, PathBuf::from("/override"));
    }
}
