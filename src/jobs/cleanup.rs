// ==========================================
// 农产品配送系统 - 过期预留清理任务
// ==========================================
// 调度: 每小时一次 (JobScheduler 驱动,间隔可配置)
// 职责: 过期超时预留,并通知受影响订单的归属方
// 红线: 单条失败只记日志并继续,任务本身不对外抛单条错误
// ==========================================

use crate::domain::types::ReferenceType;
use crate::engine::clock::Clock;
use crate::engine::error::EngineResult;
use crate::engine::notify::{Notification, OptionalNotificationSink};
use crate::engine::reservation_manager::ReservationManager;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// CleanupReport - 清理任务结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// 本轮过期释放的预留条数
    pub expired: usize,
    /// 已通知的订单预留条数
    pub notified: usize,
}

// ==========================================
// CleanupJob - 过期预留清理任务
// ==========================================
pub struct CleanupJob {
    reservation_manager: Arc<ReservationManager>,
    clock: Arc<dyn Clock>,
    notifications: OptionalNotificationSink,
}

impl CleanupJob {
    /// 创建新的 CleanupJob 实例
    pub fn new(
        reservation_manager: Arc<ReservationManager>,
        clock: Arc<dyn Clock>,
        notifications: OptionalNotificationSink,
    ) -> Self {
        Self {
            reservation_manager,
            clock,
            notifications,
        }
    }

    /// 执行一轮清理
    ///
    /// 1) expire_stale 释放全部超时预留 (单条失败内部跳过)
    /// 2) 订单引用的预留逐条通知订单归属方,
    ///    订单侧可据此重新确认或取消
    #[instrument(skip(self))]
    pub fn run(&self) -> EngineResult<CleanupReport> {
        let now = self.clock.now();
        let expired = self.reservation_manager.expire_stale(now)?;

        let mut notified = 0;
        for reservation in &expired {
            if reservation.reference_type == ReferenceType::Order {
                // 通知失败不影响清理结果 (fire-and-forget)
                self.notifications.send(Notification::new(
                    "reservation_expired",
                    json!({
                        "order_id": reservation.reference_no,
                        "product_id": reservation.product_id,
                        "location_id": reservation.location_id,
                        "quantity": reservation.quantity,
                    }),
                ));
                notified += 1;
            }
        }

        tracing::info!("清理完成: 过期预留 {} 条,通知 {} 条", expired.len(), notified);

        Ok(CleanupReport {
            expired: expired.len(),
            notified,
        })
    }
}
