//! Engine - ワークフローをタスクとして実行する
//!
//! # 主要コンポーネント
//! - **TaskEngine**: submit / 照会 / kill / 再起動時の restore
//! - **Task**: 1 タスクのハンドル（進捗、kill、終端結果の待機）
//! - **Workflow / TaskContext**: タスク本体とそこから見えるもの

pub mod task;
pub mod task_engine;
pub mod workflow;

pub use self::task::Task;
pub use self::task_engine::{TaskCounts, TaskEngine};
pub use self::workflow::{TaskContext, Workflow};
