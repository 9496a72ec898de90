//! App - アプリケーション層
//!
//! registry と engine を組み立て、定期処理を動かす。
//!
//! # 主要コンポーネント
//! - **PlatformBuilder**: コラボレータのワイヤリングと起動時検証
//! - **Platform**: 組み上がった registry + engine
//! - **RefreshLoop**: 定期的な収束ループ
//! - **PlatformStatus**: アプリ・タスクのサマリ

pub mod builder;
pub mod refresh_loop;
pub mod status;

pub use self::builder::{BuildError, PlatformBuilder};
pub use self::refresh_loop::RefreshLoop;
pub use self::status::{AppCounts, PlatformStatus};

use crate::config::HarborConfig;
use crate::domain::HarborError;
use crate::engine::TaskEngine;
use crate::registry::AppRegistry;

/// A wired platform. Cheap to share: registry and engine are handles.
pub struct Platform {
    config: HarborConfig,
    registry: AppRegistry,
    engine: TaskEngine,
}

impl Platform {
    pub fn config(&self) -> &HarborConfig {
        &self.config
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    /// Reload task history persisted by a previous run.
    pub async fn restore(&self) -> Result<usize, HarborError> {
        self.engine.restore().await
    }

    pub fn spawn_refresh_loop(&self) -> RefreshLoop {
        RefreshLoop::spawn(self.registry.clone(), self.config.refresh.interval())
    }

    pub async fn status(&self) -> Result<PlatformStatus, HarborError> {
        let apps = self.registry.get_all().await?;
        Ok(PlatformStatus {
            instance: self.config.instance.name.clone(),
            apps: AppCounts::from_records(&apps),
            tasks: self.engine.counts().await,
        })
    }
}
