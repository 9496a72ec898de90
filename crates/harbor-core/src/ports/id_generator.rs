//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use tracing::warn;
use ulid::{Generator, Ulid};

use crate::domain::ids::{AppId, TaskId};
use crate::ports::Clock;

/// IdGenerator は App / Task の ID を生成
///
/// # 順序
/// - 生成順に厳密に増加すること（Task 履歴の「新しい順」ビューは ID 順で並べる）
///
/// # Thread Safety
/// - `Send + Sync` を要求（registry と engine の両方から使う）
pub trait IdGenerator: Send + Sync {
    fn generate_app_id(&self) -> AppId;

    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は単調増加する ULID の生成器
///
/// Clock の時刻を timestamp 部分に使うので、FixedClock で timestamp を固定できる。
/// 同じミリ秒（または時計が戻った場合）は直前の ULID のランダム部分をインクリメントする。
pub struct UlidGenerator<C> {
    clock: C,
    state: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(Generator::new()),
        }
    }

    fn next_ulid(&self) -> Ulid {
        let now = SystemTime::from(self.clock.now());
        let mut generator = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match generator.generate_from_datetime(now) {
            Ok(ulid) => ulid,
            Err(e) => {
                // 2^80 ids in one millisecond: ordering within it is lost
                warn!(error = %e, "ulid random part overflowed");
                Ulid::from_parts(now_ms(now), rand::random())
            }
        }
    }
}

fn now_ms(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_app_id(&self) -> AppId {
        AppId::from(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }
}
