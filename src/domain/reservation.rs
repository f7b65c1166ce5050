// ==========================================
// 农产品配送系统 - 库存预留领域模型
// ==========================================
// 红线: 任意 (product_id, location_id) 上,
//       活跃预留数量合计不得超过实物在库数量
// ==========================================

use crate::domain::types::{ReferenceType, ReservationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// Reservation - 库存预留
// ==========================================
// 预留是对库存的软性、限时声明,区别于实物扣减;
// 数量/键/引用在创建后不可变,生命周期只走状态迁移
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    // ===== 主键 =====
    pub reservation_id: String,

    // ===== 库存键 =====
    pub product_id: String,
    pub location_id: String,

    // ===== 数量 =====
    pub quantity: i64, // 正整数

    // ===== 业务引用 =====
    pub reference_type: ReferenceType,
    pub reference_no: String, // 引用单号 (如订单ID)

    // ===== 生命周期 =====
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>, // TTL 截止时间,清理任务按此过期

    // ===== 审计 =====
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>, // 释放/过期时间
}

impl Reservation {
    /// 创建一条新的活跃预留
    ///
    /// # 参数
    /// - `product_id` / `location_id`: 库存键
    /// - `quantity`: 预留数量 (调用方保证为正)
    /// - `reference_type` / `reference_no`: 业务引用
    /// - `expires_at`: TTL 截止时间
    /// - `now`: 注入的当前时间 (可测试性)
    pub fn new_active(
        product_id: &str,
        location_id: &str,
        quantity: i64,
        reference_type: ReferenceType,
        reference_no: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation_id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            quantity,
            reference_type,
            reference_no: reference_no.to_string(),
            status: ReservationStatus::Active,
            expires_at,
            created_at: now,
            released_at: None,
        }
    }

    /// 预留在给定时刻是否已过期 (仅对活跃预留有意义)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at < now
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_active_reservation() {
        let now = Utc::now();
        let reservation = Reservation::new_active(
            "P001",
            "W1",
            50,
            ReferenceType::Order,
            "SO-1001",
            now + Duration::hours(24),
            now,
        );

        assert_eq!(reservation.status, ReservationStatus::Active);
        assert_eq!(reservation.quantity, 50);
        assert!(reservation.released_at.is_none());
        assert!(!reservation.is_expired_at(now));
    }

    #[test]
    fn test_is_expired_at() {
        let now = Utc::now();
        let mut reservation = Reservation::new_active(
            "P001",
            "W1",
            10,
            ReferenceType::Order,
            "SO-1002",
            now - Duration::hours(1), // 已过期
            now - Duration::hours(8),
        );

        assert!(reservation.is_expired_at(now));

        // 已释放的预留不再参与过期判断
        reservation.status = ReservationStatus::Released;
        assert!(!reservation.is_expired_at(now));
    }
}
