//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! registry / engine / workflows は外部コラボレータ（ストア、sandbox ランタイム、
//! 権限エンジン、app store、リソースマネージャ）をこれらの trait 経由でのみ扱います。
//!
//! 開発・テスト用の実装は `impls` にあります。

pub mod app_store;
pub mod capability;
pub mod clock;
pub mod id_generator;
pub mod publisher;
pub mod resources;
pub mod runtime;
pub mod store;

// 主要な trait を再エクスポート
pub use self::app_store::AppStore;
pub use self::capability::{Capability, CapabilityManager};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::publisher::UpdatePublisher;
pub use self::resources::{Resource, ResourceManager};
pub use self::runtime::{RuntimePlatform, SandboxInfo, SandboxSpec, SandboxStatus};
pub use self::store::Store;

use std::sync::Arc;

/// Every collaborator the platform is wired with.
///
/// Assembled by `PlatformBuilder`; registry and engine take what they need.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn Store>,
    pub publisher: Arc<dyn UpdatePublisher>,
    pub runtime: Arc<dyn RuntimePlatform>,
    pub capabilities: Arc<dyn CapabilityManager>,
    pub app_store: Arc<dyn AppStore>,
    pub resources: Arc<dyn ResourceManager>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}
