//! Test wiring over the in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app::{Platform, PlatformBuilder};
use crate::config::HarborConfig;
use crate::domain::InstallerMetadata;
use crate::engine::TaskEngine;
use crate::impls::{
    BroadcastPublisher, MemoryResources, MemoryRuntime, MemoryStore, StaticAppStore,
    StaticCapabilities,
};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::registry::{App, AppRegistry};
use crate::workflows::CreateAppRequest;

pub(crate) const NOTES_IMAGE: &str = "notes:1.0";

pub(crate) struct TestPlatform {
    pub platform: Platform,
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<BroadcastPublisher>,
    pub runtime: Arc<MemoryRuntime>,
    pub app_store: Arc<StaticAppStore>,
    pub ids: Arc<dyn IdGenerator>,
}

impl TestPlatform {
    pub fn registry(&self) -> &AppRegistry {
        self.platform.registry()
    }

    pub fn engine(&self) -> &TaskEngine {
        self.platform.engine()
    }

    /// Create an app row directly, bypassing the CreateApp workflow.
    pub async fn create_app(&self, name: &str, metadata: InstallerMetadata) -> Arc<App> {
        self.registry()
            .create(
                &format!("inst-{name}"),
                "1.0",
                name,
                BTreeMap::new(),
                &metadata,
            )
            .await
            .unwrap()
    }
}

/// Dev mode on, so requests may carry inline metadata.
pub(crate) fn config() -> HarborConfig {
    HarborConfig {
        dev_mode: true,
        ..HarborConfig::default()
    }
}

pub(crate) fn platform() -> TestPlatform {
    platform_with(config())
}

/// `NOTES_IMAGE` starts out local; every other image needs a download or pull.
pub(crate) fn platform_with(config: HarborConfig) -> TestPlatform {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(BroadcastPublisher::default());
    let runtime = Arc::new(MemoryRuntime::new().with_image(NOTES_IMAGE));
    let app_store = Arc::new(
        StaticAppStore::new()
            .with_runtime(runtime.clone())
            .with_local_image(NOTES_IMAGE),
    );
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));

    let platform = PlatformBuilder::new(config)
        .store(store.clone())
        .publisher(publisher.clone())
        .runtime(runtime.clone())
        .capabilities(Arc::new(StaticCapabilities::builtin()))
        .app_store(app_store.clone())
        .resources(Arc::new(MemoryResources::new()))
        .ids(ids.clone())
        .build()
        .unwrap();

    TestPlatform {
        platform,
        store,
        publisher,
        runtime,
        app_store,
        ids,
    }
}

pub(crate) fn notes_metadata() -> InstallerMetadata {
    InstallerMetadata::new(NOTES_IMAGE)
}

/// A CreateApp request for the notes installer with inline metadata.
pub(crate) fn notes_request(name: &str) -> CreateAppRequest {
    CreateAppRequest::new("inst-notes", "1.0", name).with_metadata(notes_metadata())
}
