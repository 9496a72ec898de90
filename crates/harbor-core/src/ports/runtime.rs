//! RuntimePlatform port - sandbox ランタイム（コンテナ実装は外部）
//!
//! sandbox id は App ID の表示形式（`app-01H...`）。

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{HarborError, PublicPort};

/// Observed sandbox state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
    pub status: SandboxStatus,
    pub ip: Option<Ipv4Addr>,
    pub volume_id: Option<String>,
}

/// Everything the runtime needs to materialize one sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSpec {
    pub id: String,
    pub app_name: String,
    pub image: String,
    pub ip: Option<Ipv4Addr>,
    pub volume_id: Option<String>,
    pub env: BTreeMap<String, String>,
    pub public_ports: Vec<PublicPort>,
}

#[async_trait]
pub trait RuntimePlatform: Send + Sync {
    async fn get_sandbox(&self, id: &str) -> Result<Option<SandboxInfo>, HarborError>;

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>, HarborError>;

    async fn create_sandbox(&self, spec: SandboxSpec) -> Result<SandboxInfo, HarborError>;

    async fn start_sandbox(&self, id: &str) -> Result<(), HarborError>;

    async fn stop_sandbox(&self, id: &str) -> Result<(), HarborError>;

    async fn remove_sandbox(&self, id: &str) -> Result<(), HarborError>;

    async fn has_image(&self, image: &str) -> Result<bool, HarborError>;

    async fn pull_image(&self, image: &str) -> Result<(), HarborError>;

    /// Returns the volume id.
    async fn get_or_create_volume(&self, name: &str) -> Result<String, HarborError>;
}
