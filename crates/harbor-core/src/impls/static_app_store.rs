//! StaticAppStore - 開発用の app store
//!
//! installer メタデータは `(installer_id, version)` で引く。
//! `download_image` は設定した遅延の後にイメージをローカル扱いにする。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{HarborError, InstallerMetadata};
use crate::impls::MemoryRuntime;
use crate::ports::AppStore;

#[derive(Default)]
struct AppStoreState {
    installers: HashMap<(String, String), InstallerMetadata>,
    local_images: HashSet<String>,
    failing_images: HashSet<String>,
    downloads: Vec<String>,
}

#[derive(Default)]
pub struct StaticAppStore {
    state: Mutex<AppStoreState>,
    download_delay: Duration,
    /// Downloaded images also become available to this runtime.
    runtime: Option<Arc<MemoryRuntime>>,
}

impl StaticAppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<MemoryRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Seed an image as already local. Does not touch the runtime.
    pub fn with_local_image(mut self, image: &str) -> Self {
        self.state.get_mut().local_images.insert(image.to_string());
        self
    }

    pub async fn add_installer(&self, installer_id: &str, version: &str, meta: InstallerMetadata) {
        self.state
            .lock()
            .await
            .installers
            .insert((installer_id.to_string(), version.to_string()), meta);
    }

    pub async fn add_local_image(&self, image: &str) {
        self.state.lock().await.local_images.insert(image.to_string());
        if let Some(rt) = &self.runtime {
            rt.add_image(image).await;
        }
    }

    pub async fn fail_download_for(&self, image: &str) {
        self.state
            .lock()
            .await
            .failing_images
            .insert(image.to_string());
    }

    /// Images `download_image` was called for, in order.
    pub async fn downloads(&self) -> Vec<String> {
        self.state.lock().await.downloads.clone()
    }
}

#[async_trait]
impl AppStore for StaticAppStore {
    async fn get_metadata(
        &self,
        installer_id: &str,
        version: &str,
    ) -> Result<InstallerMetadata, HarborError> {
        let state = self.state.lock().await;
        state
            .installers
            .get(&(installer_id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| HarborError::InstallerNotFound(format!("{installer_id}@{version}")))
    }

    async fn has_image(&self, image: &str) -> Result<bool, HarborError> {
        Ok(self.state.lock().await.local_images.contains(image))
    }

    async fn download_image(&self, image: &str) -> Result<(), HarborError> {
        self.state.lock().await.downloads.push(image.to_string());
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        if self.state.lock().await.failing_images.contains(image) {
            return Err(HarborError::Installer(format!("download {image} failed")));
        }
        self.add_local_image(image).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_installer_is_not_found() {
        let store = StaticAppStore::new();
        let err = store.get_metadata("nope", "1.0").await.unwrap_err();
        assert!(matches!(err, HarborError::InstallerNotFound(_)));
    }

    #[tokio::test]
    async fn download_makes_image_local_everywhere() {
        let runtime = Arc::new(MemoryRuntime::new());
        let store = StaticAppStore::new().with_runtime(runtime.clone());

        assert!(!store.has_image("notes:1.0").await.unwrap());
        store.download_image("notes:1.0").await.unwrap();

        use crate::ports::RuntimePlatform;
        assert!(store.has_image("notes:1.0").await.unwrap());
        assert!(runtime.has_image("notes:1.0").await.unwrap());
    }

    #[tokio::test]
    async fn injected_download_failure() {
        let store = StaticAppStore::new();
        store.fail_download_for("bad:1").await;
        assert!(store.download_image("bad:1").await.is_err());
        assert!(!store.has_image("bad:1").await.unwrap());
    }
}
