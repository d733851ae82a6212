//! Node configuration file support
//!
//! A node is described by a `siteweave.yml` file: where the remote app
//! database lives, which local services are exposed to remote sites and
//! which remote apps get a local socket on this node.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use siteweave_apps::config::{validate_local_apps, validate_remote_apps};
use siteweave_apps::{AppConfig, LocalExposedAppConfig};
use std::path::{Path, PathBuf};

/// File names searched by [`NodeConfig::discover_from`], in order
pub const CONFIG_FILE_NAMES: [&str; 3] = ["siteweave.yml", "siteweave.yaml", ".siteweave.yml"];

/// Node configuration file format
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Local services reachable from remote sites
    #[serde(default)]
    pub local_exposed_apps: Vec<LocalExposedAppConfig>,

    /// Remote site services offered on a local socket
    #[serde(default)]
    pub remote_apps: Vec<AppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Database URL (supports ${ENV_VAR} expansion)
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://siteweave.db?mode=rwc".to_string()
}

impl NodeConfig {
    /// Discover the node config by walking up from the current directory
    pub fn discover() -> Result<Option<(PathBuf, Self)>> {
        let current_dir = std::env::current_dir()?;
        Self::discover_from(&current_dir)
    }

    /// Discover config starting from a specific directory
    pub fn discover_from(start_dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let config = Self::load(&path)?;
                    return Ok(Some((path, config)));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Load config from a specific file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse config from YAML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: NodeConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML config")?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        validate_local_apps(&self.local_exposed_apps)?;
        validate_remote_apps(&self.remote_apps)?;
        Ok(())
    }

    /// Database URL with environment variables expanded
    pub fn database_url(&self) -> String {
        expand_env_vars(&self.database.url)
    }

    /// Generate a template config file content
    pub fn template() -> String {
        r#"# siteweave node configuration

database:
  url: "sqlite://siteweave.db?mode=rwc"
  # url: "sqlite://${SITEWEAVE_DATA}/siteweave.db?mode=rwc"

# Local services remote sites may reach
local_exposed_apps:
  - app_name: ssh
    mode: single
    app_socket: "127.0.0.1:22"

  # - app_name: vnc
  #   mode: range
  #   port_range: ["5900-5910"]
  #   address_range: ["127.0.0.1"]

# Services of remote sites offered on a local socket
remote_apps:
  - site_name: office
    app_name: web
    local_socket: "127.0.0.1:18080"
    app_socket: "10.0.0.5:80"

  # - site_name: lab
  #   app_name: docs
  #   local_socket: "/run/siteweave/docs.sock"
  #   app_socket: "10.1.0.7:8000"
"#
        .to_string()
    }
}

/// Expand `${VAR}` references; unset variables expand to nothing
pub fn expand_env_vars(input: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };

    let mut result = input.to_string();
    for cap in re.captures_iter(input) {
        let var_value = std::env::var(&cap[1]).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
