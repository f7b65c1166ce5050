// ==========================================
// 农产品配送系统 - 订单领域模型
// ==========================================
// 说明: 订单主数据由订单子系统维护;本核心只读取订单与行项,
//       仅在状态转换时改写 status / updated_at 两个字段
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 订单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // ===== 主键 =====
    pub order_id: String,

    // ===== 归属 =====
    pub customer_id: Option<String>, // 客户编号 (本核心不使用,仅透传)
    pub location_id: String,         // 目标仓库/门店

    // ===== 状态 =====
    pub status: OrderStatus,

    // ===== 分配参数 =====
    pub priority: i32,                   // PRIORITY 策略排序字段,越大越优先
    pub required_by: Option<NaiveDate>,  // 要求到货日期 (预留 TTL 推导)

    // ===== 审计 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// 订单是否处于可参与批量分配的状态
    ///
    /// 终态订单与已确认(预留已存在)订单不应重复分配
    pub fn is_allocatable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft | OrderStatus::Pending)
    }
}

// ==========================================
// OrderLine - 订单行项
// ==========================================
// 确认后行项不可变更;行内数量必须为正整数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: String,
    pub line_no: i32,       // 行号,从 1 开始;预留按行号顺序创建
    pub product_id: String,
    pub quantity: i64,      // 正整数
}

// ==========================================
// OrderWithLines - 订单 + 行项聚合
// ==========================================
// 批量分配与状态转换都需要整单视图,仓储一次性装配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderWithLines {
    /// 整单请求总量 (跨行求和,用于日志与报表)
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
