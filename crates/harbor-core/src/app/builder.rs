//! PlatformBuilder - コラボレータのワイヤリング
//!
//! # Fail-fast 設計
//! - 必須コラボレータ（store, publisher, runtime, capabilities, app store, resources）が
//!   欠けていれば、足りないものを全部並べて BuildError を返す
//! - 設定（ネットワーク CIDR、refresh 間隔）も build() 時に検証する
//! - clock と id generator は省略時に SystemClock / UlidGenerator を使う

use std::sync::Arc;

use crate::config::HarborConfig;
use crate::domain::HarborError;
use crate::engine::TaskEngine;
use crate::ports::{
    AppStore, CapabilityManager, Clock, IdGenerator, Ports, ResourceManager, RuntimePlatform,
    Store, SystemClock, UlidGenerator, UpdatePublisher,
};
use crate::registry::AppRegistry;

use super::Platform;

/// Wires a `Platform`.
///
/// # 使用例
/// ```ignore
/// let platform = PlatformBuilder::new(config)
///     .store(store)
///     .publisher(publisher)
///     .runtime(runtime)
///     .capabilities(capabilities)
///     .app_store(app_store)
///     .resources(resources)
///     .build()?;
/// ```
pub struct PlatformBuilder {
    config: HarborConfig,
    store: Option<Arc<dyn Store>>,
    publisher: Option<Arc<dyn UpdatePublisher>>,
    runtime: Option<Arc<dyn RuntimePlatform>>,
    capabilities: Option<Arc<dyn CapabilityManager>>,
    app_store: Option<Arc<dyn AppStore>>,
    resources: Option<Arc<dyn ResourceManager>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be provided before build().")]
    MissingCollaborators(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] HarborError),
}

impl PlatformBuilder {
    pub fn new(config: HarborConfig) -> Self {
        Self {
            config,
            store: None,
            publisher: None,
            runtime: None,
            capabilities: None,
            app_store: None,
            resources: None,
            clock: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn UpdatePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn RuntimePlatform>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn capabilities(mut self, capabilities: Arc<dyn CapabilityManager>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn app_store(mut self, app_store: Arc<dyn AppStore>) -> Self {
        self.app_store = Some(app_store);
        self
    }

    pub fn resources(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Platform, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.publisher.is_none() {
            missing.push("publisher");
        }
        if self.runtime.is_none() {
            missing.push("runtime");
        }
        if self.capabilities.is_none() {
            missing.push("capabilities");
        }
        if self.app_store.is_none() {
            missing.push("app_store");
        }
        if self.resources.is_none() {
            missing.push("resources");
        }

        let (
            Some(store),
            Some(publisher),
            Some(runtime),
            Some(capabilities),
            Some(app_store),
            Some(resources),
        ) = (
            self.store,
            self.publisher,
            self.runtime,
            self.capabilities,
            self.app_store,
            self.resources,
        )
        else {
            return Err(BuildError::MissingCollaborators(missing));
        };

        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        let ports = Ports {
            store,
            publisher,
            runtime,
            capabilities,
            app_store,
            resources,
            clock,
            ids,
        };
        let engine = TaskEngine::new(
            ports.store.clone(),
            ports.publisher.clone(),
            ports.clock.clone(),
            ports.ids.clone(),
            self.config.tasks.history_limit,
        );
        let registry = AppRegistry::new(&self.config, &ports, engine.clone());

        Ok(Platform {
            config: self.config,
            registry,
            engine,
        })
    }
}
