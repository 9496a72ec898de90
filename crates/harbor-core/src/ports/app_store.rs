//! AppStore port - インストーラ（メタデータ解決とイメージ取得）

use async_trait::async_trait;

use crate::domain::{HarborError, InstallerMetadata};

#[async_trait]
pub trait AppStore: Send + Sync {
    /// Fails with `InstallerNotFound` for unknown installer/version pairs.
    async fn get_metadata(
        &self,
        installer_id: &str,
        version: &str,
    ) -> Result<InstallerMetadata, HarborError>;

    /// Is the sandbox image already available locally?
    async fn has_image(&self, image: &str) -> Result<bool, HarborError>;

    /// Fetch the image. May take a long time; callers run it inside a Task.
    async fn download_image(&self, image: &str) -> Result<(), HarborError>;
}
