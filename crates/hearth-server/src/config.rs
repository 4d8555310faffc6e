use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_http::{RequestLimits, ServeOptions};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Path segments under `/api/` that are not collections.
const RESERVED: &[&str] = &["system", "settings"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Collection names; each is stored as `<data_dir>/<name>.jsonl`.
    pub collections: Vec<String>,
    pub debug_mode: bool,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub write_block_size: usize,
    pub settings_ttl_secs: u64,
    pub limits: RequestLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)),
            data_dir: PathBuf::from("data"),
            static_dir: PathBuf::from("static"),
            collections: [
                "members",
                "poems",
                "activities",
                "tasks",
                "finance",
                "login_logs",
                "points_logs",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            debug_mode: false,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            write_block_size: 1024,
            settings_ttl_secs: 3600,
            limits: RequestLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document. Missing fields take defaults.
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ServerResult<()> {
        for (i, name) in self.collections.iter().enumerate() {
            let valid = !name.is_empty()
                && name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
            if !valid {
                return Err(ServerError::Config(format!("invalid collection name {name:?}")));
            }
            if RESERVED.contains(&name.as_str()) {
                return Err(ServerError::Config(format!("collection name {name:?} is reserved")));
            }
            if self.collections[..i].contains(name) {
                return Err(ServerError::Config(format!("duplicate collection {name:?}")));
            }
        }
        if self.write_block_size == 0 {
            return Err(ServerError::Config("write_block_size must be positive".into()));
        }
        Ok(())
    }

    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.jsonl"))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            limits: self.limits.clone(),
            write_block_size: self.write_block_size,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}
