//! Events - ドメインイベント
//!
//! UpdatePublisher に流れる状態変化。ペイロードはすべてスナップショット（View）で、
//! ライブな参照は含まない。

use serde::{Deserialize, Serialize};

use super::app::AppView;
use super::ids::AppId;
use super::task::TaskView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    AppCreated(AppView),
    AppUpdated(AppView),
    AppRemoved(AppId),
    TaskCreated(TaskView),
    TaskUpdated(TaskView),
}

impl DomainEvent {
    /// Short event name, used as the log field.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AppCreated(_) => "app_created",
            DomainEvent::AppUpdated(_) => "app_updated",
            DomainEvent::AppRemoved(_) => "app_removed",
            DomainEvent::TaskCreated(_) => "task_created",
            DomainEvent::TaskUpdated(_) => "task_updated",
        }
    }
}
