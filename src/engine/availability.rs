// ==========================================
// 农产品配送系统 - 可用库存计算引擎
// ==========================================
// 依据: Integration_Design_v1.0.md - 可用库存即时查询
// 职责: 计算考虑预留/在途/待定需求后的真实可用量
// 公式: available = max(0, physical - reserved + in_transit - pending_orders)
// 说明: 只读计算,不做任何改写;任何组件/外部流程均可自由调用
// ==========================================

use crate::domain::inventory::Availability;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::inventory_repo::InventoryRecordRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// 供需软信号 Trait
// ==========================================

/// 在途/待定需求信号源
///
/// 在途补货与未确认订单需求属于软信号: 参与可用量修正,
/// 但不构成硬性预留。信号的业务口径 (哪些单算在途、哪些订单
/// 算待定需求) 由接入方定义;未接入时使用 `ZeroSignals`,
/// 两项修正均为 0,可用量退化为 physical - reserved。
pub trait SupplyDemandSignals: Send + Sync {
    /// 在途补货数量
    fn in_transit_qty(&self, product_id: &str, location_id: &str) -> i64;

    /// 未确认订单的待定需求数量
    fn pending_order_qty(&self, product_id: &str, location_id: &str) -> i64;
}

/// 默认信号源: 两项修正恒为 0
#[derive(Debug, Clone, Default)]
pub struct ZeroSignals;

impl SupplyDemandSignals for ZeroSignals {
    fn in_transit_qty(&self, _product_id: &str, _location_id: &str) -> i64 {
        0
    }

    fn pending_order_qty(&self, _product_id: &str, _location_id: &str) -> i64 {
        0
    }
}

// ==========================================
// AvailabilityCalculator - 可用库存计算引擎
// ==========================================
pub struct AvailabilityCalculator {
    conn: Arc<Mutex<Connection>>,
    signals: Arc<dyn SupplyDemandSignals>,
}

impl AvailabilityCalculator {
    /// 创建新的 AvailabilityCalculator 实例
    pub fn new(conn: Arc<Mutex<Connection>>, signals: Arc<dyn SupplyDemandSignals>) -> Self {
        Self { conn, signals }
    }

    /// 创建使用零信号源的实例
    pub fn with_zero_signals(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(conn, Arc::new(ZeroSignals))
    }

    /// 查询可用库存视图
    ///
    /// 台账行不存在按零库存处理 (新品尚未入库的常态,不是错误)
    ///
    /// # 参数
    /// - `product_id` / `location_id`: 库存键
    ///
    /// # 返回
    /// Availability { physical, available, reserved, in_transit, pending_orders }
    pub fn available(&self, product_id: &str, location_id: &str) -> RepositoryResult<Availability> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        self.available_tx(&conn, product_id, location_id)
    }

    /// 事务内查询可用库存视图 (供预留/分配引擎在同一事务内复用)
    pub fn available_tx(
        &self,
        conn: &Connection,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Availability> {
        let (physical, reserved) =
            match InventoryRecordRepository::find_by_key_tx(conn, product_id, location_id)? {
                Some(record) => (record.physical_qty, record.reserved_qty),
                None => (0, 0),
            };

        let in_transit = self.signals.in_transit_qty(product_id, location_id);
        let pending_orders = self.signals.pending_order_qty(product_id, location_id);

        // 钳位为非负: 软信号修正可能把名义可用量拉成负数
        let available = (physical - reserved + in_transit - pending_orders).max(0);

        Ok(Availability {
            physical,
            available,
            reserved,
            in_transit,
            pending_orders,
        })
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::inventory::InventoryRecord;
    use chrono::Utc;

    /// 固定值信号源 (测试用)
    struct StaticSignals {
        in_transit: i64,
        pending: i64,
    }

    impl SupplyDemandSignals for StaticSignals {
        fn in_transit_qty(&self, _: &str, _: &str) -> i64 {
            self.in_transit
        }

        fn pending_order_qty(&self, _: &str, _: &str) -> i64 {
            self.pending
        }
    }

    fn setup_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn seed_record(conn: &Arc<Mutex<Connection>>, physical: i64, reserved: i64) {
        let repo = InventoryRecordRepository::new(conn.clone());
        repo.upsert(&InventoryRecord {
            product_id: "P001".to_string(),
            location_id: "W1".to_string(),
            physical_qty: physical,
            reserved_qty: reserved,
            safety_stock: 0,
            revision: 0,
            updated_at: Utc::now(),
        })
        .unwrap();
    }

    #[test]
    fn test_available_basic_formula() {
        let conn = setup_conn();
        seed_record(&conn, 100, 30);

        let calc = AvailabilityCalculator::with_zero_signals(conn);
        let availability = calc.available("P001", "W1").unwrap();

        assert_eq!(availability.physical, 100);
        assert_eq!(availability.reserved, 30);
        assert_eq!(availability.available, 70);
        assert_eq!(availability.in_transit, 0);
        assert_eq!(availability.pending_orders, 0);
    }

    #[test]
    fn test_available_with_signals() {
        let conn = setup_conn();
        seed_record(&conn, 100, 30);

        let calc = AvailabilityCalculator::new(
            conn,
            Arc::new(StaticSignals {
                in_transit: 20,
                pending: 50,
            }),
        );
        let availability = calc.available("P001", "W1").unwrap();

        // 100 - 30 + 20 - 50 = 40
        assert_eq!(availability.available, 40);
        assert_eq!(availability.in_transit, 20);
        assert_eq!(availability.pending_orders, 50);
    }

    #[test]
    fn test_available_clamped_at_zero() {
        let conn = setup_conn();
        seed_record(&conn, 10, 5);

        // 待定需求远超库存,可用量钳位到 0 而不是负数
        let calc = AvailabilityCalculator::new(
            conn,
            Arc::new(StaticSignals {
                in_transit: 0,
                pending: 100,
            }),
        );
        let availability = calc.available("P001", "W1").unwrap();
        assert_eq!(availability.available, 0);
    }

    #[test]
    fn test_missing_record_reads_as_zero() {
        let conn = setup_conn();

        let calc = AvailabilityCalculator::with_zero_signals(conn);
        let availability = calc.available("P-NEW", "W1").unwrap();

        assert_eq!(availability.physical, 0);
        assert_eq!(availability.reserved, 0);
        assert_eq!(availability.available, 0);
    }
}
