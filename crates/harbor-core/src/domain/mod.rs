//! Domain model (IDs, app and task records, events, errors).

pub mod app;
pub mod errors;
pub mod events;
pub mod ids;
pub mod installer;
pub mod task;

pub use app::{AppRecord, AppStatus, AppView, DesiredStatus};
pub use errors::{ErrorKind, HarborError};
pub use events::DomainEvent;
pub use ids::{AppId, TaskId};
pub use installer::{InstallerMetadata, Protocol, PublicPort};
pub use task::{Progress, TaskRecord, TaskStatus, TaskView};
