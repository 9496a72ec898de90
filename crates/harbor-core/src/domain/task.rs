//! Task state machine and persisted task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AppId, TaskId};

/// Task status.
///
/// State transitions:
/// - Requested -> InProgress -> Finished
/// - Requested -> InProgress -> Failed
/// - Requested -> InProgress -> Killed (cooperative cancellation)
///
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Created and persisted, not picked up by its worker yet.
    Requested,

    /// Workflow body is running.
    InProgress,

    /// Workflow returned successfully.
    Finished,

    /// Workflow returned an error (or panicked).
    Failed,

    /// Workflow stopped after a honored kill request.
    Killed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Killed
        )
    }
}

/// Progress reported by a running workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Always within 0..=100.
    pub percentage: u8,
    pub state: String,
}

impl Progress {
    pub const MAX: u8 = 100;

    pub fn set_percentage(&mut self, percentage: u8) {
        self.percentage = percentage.min(Self::MAX);
    }
}

/// Persisted task row.
///
/// Design:
/// - All status transitions go through methods here.
/// - The engine persists and publishes after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub progress: Progress,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Apps this task acted on.
    #[serde(default)]
    pub apps: Vec<AppId>,
    #[serde(default)]
    pub killable: bool,
    /// Terminal error message (Failed / Killed).
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(id: TaskId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            status: TaskStatus::Requested,
            progress: Progress::default(),
            started_at: now,
            finished_at: None,
            apps: Vec::new(),
            killable: false,
            error: None,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Move to a terminal status. No-op if already terminal.
    pub fn finish(&mut self, status: TaskStatus, error: Option<String>, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(now);
        if status == TaskStatus::Finished {
            self.progress.set_percentage(Progress::MAX);
        }
    }

    pub fn add_app(&mut self, app: AppId) {
        if !self.apps.contains(&app) {
            self.apps.push(app);
        }
    }
}

/// Immutable task snapshot safe to hand across a serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub progress: Progress,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub apps: Vec<AppId>,
    pub killable: bool,
    pub error: Option<String>,
}

impl From<&TaskRecord> for TaskView {
    fn from(r: &TaskRecord) -> Self {
        TaskView {
            id: r.id,
            name: r.name.clone(),
            status: r.status,
            progress: r.progress.clone(),
            started_at: r.started_at,
            finished_at: r.finished_at,
            apps: r.apps.clone(),
            killable: r.killable,
            error: r.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskId::from_ulid(Ulid::new()), "create app", Utc::now())
    }

    #[test]
    fn status_serializes_as_wire_names() {
        let s = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(s, "\"INPROGRESS\"");
        let s = serde_json::to_string(&TaskStatus::Requested).unwrap();
        assert_eq!(s, "\"REQUESTED\"");
    }

    #[rstest]
    #[case(TaskStatus::Requested, false)]
    #[case(TaskStatus::InProgress, false)]
    #[case(TaskStatus::Finished, true)]
    #[case(TaskStatus::Failed, true)]
    #[case(TaskStatus::Killed, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn percentage_is_clamped() {
        let mut p = Progress::default();
        p.set_percentage(250);
        assert_eq!(p.percentage, 100);
    }

    #[test]
    fn terminal_status_is_final() {
        let mut r = record();
        r.mark_in_progress();
        r.finish(TaskStatus::Failed, Some("boom".into()), Utc::now());
        r.finish(TaskStatus::Finished, None, Utc::now());

        assert_eq!(r.status, TaskStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn finished_task_reports_full_progress() {
        let mut r = record();
        r.progress.set_percentage(70);
        r.finish(TaskStatus::Finished, None, Utc::now());
        assert_eq!(r.progress.percentage, 100);
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn apps_are_recorded_once() {
        let mut r = record();
        let app = AppId::from_ulid(Ulid::new());
        r.add_app(app);
        r.add_app(app);
        assert_eq!(r.apps, vec![app]);
    }
}
