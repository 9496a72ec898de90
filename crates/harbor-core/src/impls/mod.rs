//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **MemoryStore**: Store
//! - **BroadcastPublisher**: UpdatePublisher（tokio broadcast）
//! - **MemoryRuntime**: RuntimePlatform（失敗注入付き）
//! - **StaticCapabilities**: CapabilityManager
//! - **StaticAppStore**: AppStore
//! - **MemoryResources**: ResourceManager
//!
//! 本番用の実装（コンテナランタイム、DB、app store クライアント）はこのクレートの外に置く。

pub mod broadcast;
pub mod memory_resources;
pub mod memory_runtime;
pub mod memory_store;
pub mod static_app_store;
pub mod static_capabilities;

pub use self::broadcast::BroadcastPublisher;
pub use self::memory_resources::MemoryResources;
pub use self::memory_runtime::MemoryRuntime;
pub use self::memory_store::MemoryStore;
pub use self::static_app_store::StaticAppStore;
pub use self::static_capabilities::StaticCapabilities;
