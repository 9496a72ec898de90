//! MemoryResources - 開発・テスト用のリソースマネージャ

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AppId, HarborError};
use crate::ports::{Resource, ResourceManager};

#[derive(Default)]
pub struct MemoryResources {
    resources: Mutex<Vec<Resource>>,
    next_id: AtomicU64,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceManager for MemoryResources {
    async fn select(&self, app: AppId) -> Result<Vec<Resource>, HarborError> {
        let resources = self.resources.lock().await;
        Ok(resources.iter().filter(|r| r.app == app).cloned().collect())
    }

    async fn create(
        &self,
        app: AppId,
        resource_type: &str,
        value: serde_json::Value,
    ) -> Result<Resource, HarborError> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let resource = Resource {
            id: format!("res-{n}"),
            app,
            resource_type: resource_type.to_string(),
            value,
        };
        self.resources.lock().await.push(resource.clone());
        Ok(resource)
    }
}
