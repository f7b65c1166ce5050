// ==========================================
// 农产品配送系统 - 库存台账领域模型
// ==========================================
// 依据: Integration_Design_v1.0.md - 库存台账
// 红线: (product_id, location_id) 行是唯一事实来源,
//       reserved_qty / physical_qty 只允许台账仓储改写
// ==========================================

use crate::domain::types::{MovementType, ReferenceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// InventoryRecord - 库存台账行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    // ===== 主键 (联合唯一) =====
    pub product_id: String,
    pub location_id: String,

    // ===== 数量 =====
    pub physical_qty: i64, // 实物在库数量 (非负)
    pub reserved_qty: i64, // 活跃预留合计 (派生字段,由预留操作同步维护)

    // ===== 补货信号 =====
    pub safety_stock: i64, // 安全库存,扣减跌破后发出低库存信号

    // ===== 并发控制 =====
    pub revision: i32, // 乐观锁计数,每次改写 +1

    // ===== 审计 =====
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// 构造零库存行 (查询不到台账时的默认语义)
    pub fn zero(product_id: &str, location_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            physical_qty: 0,
            reserved_qty: 0,
            safety_stock: 0,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// 未被预留占用的实物数量 (不含在途/待定信号修正)
    pub fn unreserved_qty(&self) -> i64 {
        (self.physical_qty - self.reserved_qty).max(0)
    }

    /// 是否已跌破安全库存
    pub fn is_below_safety_stock(&self) -> bool {
        self.physical_qty <= self.safety_stock
    }
}

// ==========================================
// Availability - 可用量视图
// ==========================================
// available = max(0, physical - reserved + in_transit - pending_orders)
// 只读快照,任何组件都可自由查询
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub physical: i64,       // 实物在库
    pub available: i64,      // 真实可承诺量 (钳位为非负)
    pub reserved: i64,       // 活跃预留合计
    pub in_transit: i64,     // 在途补货 (软信号)
    pub pending_orders: i64, // 未确认订单需求 (软信号)
}

// ==========================================
// StockMovement - 库存异动流水
// ==========================================
// 每次影响台账的操作都追加一条流水,只增不改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: String,
    pub product_id: String,
    pub location_id: String,
    pub movement_type: MovementType,
    pub quantity: i64, // 异动数量,出库为负
    pub reference_type: Option<ReferenceType>,
    pub reference_no: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// 构造一条异动流水
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        product_id: &str,
        location_id: &str,
        movement_type: MovementType,
        quantity: i64,
        reference_type: Option<ReferenceType>,
        reference_no: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            movement_id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            movement_type,
            quantity,
            reference_type,
            reference_no: reference_no.map(|s| s.to_string()),
            reason: Some(reason.to_string()),
            created_at: now,
        }
    }
}
