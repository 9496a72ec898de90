//! Platform configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! dev_mode = true
//!
//! [instance]
//! name = "home-server"
//! role = "hosting"
//! network = "10.100.0.0/24"
//!
//! [tasks]
//! history_limit = 36
//!
//! [refresh]
//! interval_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::HarborError;
use crate::registry::ip::Network;

/// What this instance does. Only hosting instances run sandboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Hosting,
    Client,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default = "default_instance_name")]
    pub name: String,

    #[serde(default = "default_role")]
    pub role: InstanceRole,

    /// App network in CIDR form.
    #[serde(default = "default_network")]
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Cap of the global "most recent tasks" view.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Must be at least 1.
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HarborConfig {
    #[serde(default)]
    pub instance: InstanceConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Allows inline installer metadata instead of app store lookups.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_instance_name() -> String {
    "local".to_string()
}

fn default_role() -> InstanceRole {
    InstanceRole::Hosting
}

fn default_network() -> String {
    "10.100.0.0/24".to_string()
}

fn default_history_limit() -> usize {
    36
}

fn default_refresh_interval() -> u64 {
    10
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            role: default_role(),
            network: default_network(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

impl HarborConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, HarborError> {
        toml::from_str(s).map_err(|e| HarborError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarborError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarborError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks values serde can't: the network must be a usable CIDR and the
    /// refresh interval non-zero.
    pub fn validate(&self) -> Result<(), HarborError> {
        self.instance.network.parse::<Network>()?;
        if self.refresh.interval_secs == 0 {
            return Err(HarborError::Config(
                "refresh.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
