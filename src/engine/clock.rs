// ==========================================
// 农产品配送系统 - 时钟抽象
// ==========================================
// 说明: 过期/TTL 逻辑全部经由注入时钟读取当前时间,
//       测试可用固定时钟复现任意时间点
// ==========================================

use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// 时钟 Trait
///
/// 引擎与定时任务只通过本接口取当前时间
pub trait Clock: Send + Sync {
    /// 当前时间 (UTC)
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟 (生产默认)
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时钟 (测试用,可手动拨动)
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// 以给定时间创建固定时钟
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// 拨动时钟到新的时间点
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().expect("FixedClock 写锁") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("FixedClock 读锁")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock_set() {
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);

        let t1 = t0 + Duration::hours(2);
        clock.set(t1);
        assert_eq!(clock.now(), t1);
    }
}
