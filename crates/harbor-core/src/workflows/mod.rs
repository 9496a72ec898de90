//! Workflows - タスクとして実行されるアプリ操作
//!
//! - **CreateApp**: 行の作成 → イメージ取得（子タスク）→ sandbox 作成 → 任意で起動（子タスク）
//! - **StartApp / StopApp**: desired status を宣言してから sandbox を起動・停止
//! - **RemoveApp**: sandbox を片付けて行を削除
//! - **DownloadImage**: イメージ取得（kill 可能）

pub mod app_action;
pub mod create_app;
pub mod download_image;
pub mod remove_app;

pub use self::app_action::{StartAppWorkflow, StopAppWorkflow};
pub use self::create_app::{CreateAppRequest, CreateAppWorkflow};
pub use self::download_image::DownloadImageWorkflow;
pub use self::remove_app::RemoveAppWorkflow;
