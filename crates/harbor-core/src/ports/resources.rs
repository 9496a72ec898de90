//! ResourceManager port - DNS / 証明書などのリソース（アプリ単位）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AppId, HarborError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub app: AppId,
    pub resource_type: String,
    pub value: serde_json::Value,
}

#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn select(&self, app: AppId) -> Result<Vec<Resource>, HarborError>;

    async fn create(
        &self,
        app: AppId,
        resource_type: &str,
        value: serde_json::Value,
    ) -> Result<Resource, HarborError>;
}
