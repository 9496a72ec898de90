//! Errors - エラー型と分類
//!
//! `HarborError` は `Clone` です。Task は終端結果をキャッシュし、
//! `wait()` のたびに同じエラーを返すためです。

use thiserror::Error;

/// ErrorKind は API 境界でのエラー分類
///
/// - NotFound / Conflict / Precondition: クライアントエラー
/// - Downstream: 外部コラボレータ（runtime, app store など）の失敗
/// - Persistence: ストアの失敗
/// - Cancelled: 協調キャンセルによる終了
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Precondition,
    Downstream,
    Persistence,
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum HarborError {
    #[error("app {0} not found")]
    AppNotFound(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("installer {0} not found")]
    InstallerNotFound(String),

    #[error("duplicate name: an app named '{0}' already exists")]
    DuplicateName(String),

    #[error("app {id} can't be removed: desired status is {desired}, not stopped")]
    AppNotStopped { id: String, desired: String },

    #[error("no IP available in network {0}")]
    NoIpAvailable(String),

    #[error("invalid network '{0}'")]
    InvalidNetwork(String),

    #[error("capability not satisfied: app {app} lacks '{capability}'")]
    CapabilityNotSatisfied { app: String, capability: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task {0} is not killable")]
    TaskNotKillable(String),

    #[error("task {0} already finished")]
    TaskAlreadyTerminal(String),

    #[error("task {0} was killed")]
    TaskKilled(String),

    #[error("no message channel open for app {0}")]
    MsgQueueClosed(String),

    #[error("runtime: {0}")]
    Runtime(String),

    #[error("store: {0}")]
    Store(String),

    #[error("app store: {0}")]
    Installer(String),

    #[error("resource manager: {0}")]
    Resource(String),

    #[error("workflow panicked: {0}")]
    WorkflowPanicked(String),

    /// Failure recorded by a task that ran before the last restart.
    #[error("{0}")]
    PriorFailure(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<HarborError>,
    },
}

impl HarborError {
    /// 識別子（app 名や ID）を前置してラップする
    pub fn context(self, context: impl Into<String>) -> Self {
        HarborError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HarborError::AppNotFound(_)
            | HarborError::TaskNotFound(_)
            | HarborError::InstallerNotFound(_) => ErrorKind::NotFound,
            HarborError::DuplicateName(_)
            | HarborError::AppNotStopped { .. }
            | HarborError::TaskNotKillable(_)
            | HarborError::TaskAlreadyTerminal(_) => ErrorKind::Conflict,
            HarborError::NoIpAvailable(_)
            | HarborError::InvalidNetwork(_)
            | HarborError::CapabilityNotSatisfied { .. }
            | HarborError::InvalidArgument(_)
            | HarborError::MsgQueueClosed(_)
            | HarborError::Config(_) => ErrorKind::Precondition,
            HarborError::Runtime(_)
            | HarborError::Installer(_)
            | HarborError::Resource(_)
            | HarborError::WorkflowPanicked(_)
            | HarborError::PriorFailure(_) => ErrorKind::Downstream,
            HarborError::Store(_) => ErrorKind::Persistence,
            HarborError::TaskKilled(_) => ErrorKind::Cancelled,
            HarborError::Context { source, .. } => source.kind(),
        }
    }

    /// Is this a client-side error (bad id, conflict, precondition)?
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::Precondition
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(HarborError::AppNotFound("x".into()), ErrorKind::NotFound)]
    #[case::duplicate(HarborError::DuplicateName("x".into()), ErrorKind::Conflict)]
    #[case::not_stopped(
        HarborError::AppNotStopped { id: "x".into(), desired: "running".into() },
        ErrorKind::Conflict
    )]
    #[case::runtime(HarborError::Runtime("boom".into()), ErrorKind::Downstream)]
    #[case::store(HarborError::Store("disk".into()), ErrorKind::Persistence)]
    #[case::killed(HarborError::TaskKilled("t".into()), ErrorKind::Cancelled)]
    fn classifies_errors(#[case] err: HarborError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn context_keeps_kind_and_prefixes_message() {
        let err = HarborError::Runtime("image pull failed".into()).context("app myapp");
        assert_eq!(err.kind(), ErrorKind::Downstream);
        assert_eq!(err.to_string(), "app myapp: runtime: image pull failed");
        assert!(!err.is_client_error());
    }
}
