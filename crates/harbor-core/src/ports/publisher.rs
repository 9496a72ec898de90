//! UpdatePublisher port - 状態変化のファンアウト

use crate::domain::DomainEvent;

/// Publishing is fire-and-forget: a publisher with no subscribers drops the event.
pub trait UpdatePublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}
