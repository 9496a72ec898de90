//! Registry - App の正本と sandbox の収束
//!
//! # 主要コンポーネント
//! - **AppRegistry**: App 行の作成・参照・削除と refresh（desired → actual の収束）
//! - **App**: 1 アプリのライブハンドル（sandbox 操作、capability、メッセージチャネル）
//! - **ip**: アプリネットワークのアドレス割り当て

pub mod app;
pub mod app_registry;
pub mod ip;
mod ledger;

pub use self::app::App;
pub use self::app_registry::{AppRegistry, RefreshFailure, RefreshReport};
