//! harbor-core
//!
//! Control plane of a self-hosted app platform.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, app / task レコード, installer メタデータ, events, errors）
//! - **ports**: 抽象化レイヤー（Store, RuntimePlatform, AppStore, CapabilityManager, など）
//! - **impls**: ports の実装（開発・テスト用のインメモリ実装）
//! - **registry**: AppRegistry と App（アプリの正本、refresh による収束）
//! - **engine**: TaskEngine と Task（ワークフローの実行、進捗、kill）
//! - **workflows**: CreateApp / StartApp / StopApp / RemoveApp / DownloadImage
//! - **app**: ワイヤリング（PlatformBuilder, Platform, RefreshLoop, status）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod impls;
pub mod ports;
pub mod registry;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testkit;

pub use app::{Platform, PlatformBuilder};
pub use config::HarborConfig;
pub use domain::HarborError;
