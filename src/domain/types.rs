// ==========================================
// 农产品配送系统 - 领域类型定义
// ==========================================
// 依据: Integration_Design_v1.0.md - 订单库存整合
// 红线: 状态转换必须走转换表,不允许绕过
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order Status)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// CANCELLED / RETURNED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,      // 草稿
    Pending,    // 待确认
    Confirmed,  // 已确认 (触发库存预留)
    Processing, // 备货中
    Ready,      // 待发货
    Shipping,   // 配送中
    Delivered,  // 已送达
    Completed,  // 已完成 (触发库存扣减)
    Cancelled,  // 已取消 (触发预留释放)
    Returned,   // 已退货
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderStatus {
    /// 从字符串解析订单状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(OrderStatus::Draft),
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "PROCESSING" => Some(OrderStatus::Processing),
            "READY" => Some(OrderStatus::Ready),
            "SHIPPING" => Some(OrderStatus::Shipping),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "RETURNED" => Some(OrderStatus::Returned),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Ready => "READY",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
        }
    }

    /// 合法的后继状态列表 (状态转换表)
    ///
    /// 不在表内的转换一律视为非法,调用方必须拒绝且不落库
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Draft => &[Pending, Cancelled],
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Ready, Cancelled],
            Ready => &[Shipping, Cancelled],
            Shipping => &[Delivered, Returned],
            Delivered => &[Completed, Returned],
            Completed => &[Returned],
            // 终态
            Cancelled => &[],
            Returned => &[],
        }
    }

    /// 检查到目标状态的转换是否合法
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// 是否为终态 (不再允许任何转换)
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

// ==========================================
// 预留状态 (Reservation Status)
// ==========================================
// 预留记录不原地改写数量,只做状态迁移,保留审计痕迹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,   // 生效中
    Released, // 已释放 (取消/完成转扣减)
    Expired,  // 已过期 (清理任务释放)
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ReservationStatus {
    /// 从字符串解析预留状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(ReservationStatus::Active),
            "RELEASED" => Some(ReservationStatus::Released),
            "EXPIRED" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

// ==========================================
// 预留来源类型 (Reference Type)
// ==========================================
// 预留必须挂在一个业务单据上,对账任务按此回查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Order,      // 销售订单
    Production, // 生产工单
    Manual,     // 人工预留
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ReferenceType {
    /// 从字符串解析来源类型
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ORDER" => Some(ReferenceType::Order),
            "PRODUCTION" => Some(ReferenceType::Production),
            "MANUAL" => Some(ReferenceType::Manual),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReferenceType::Order => "ORDER",
            ReferenceType::Production => "PRODUCTION",
            ReferenceType::Manual => "MANUAL",
        }
    }
}

// ==========================================
// 库存异动类型 (Movement Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Inbound,  // 入库
    Outbound, // 出库 (订单完成扣减)
    Reserve,  // 预留占用
    Release,  // 预留释放
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MovementType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MovementType::Inbound => "INBOUND",
            MovementType::Outbound => "OUTBOUND",
            MovementType::Reserve => "RESERVE",
            MovementType::Release => "RELEASE",
        }
    }
}

// ==========================================
// 批量分配策略 (Allocation Strategy)
// ==========================================
// FIFO: 按订单创建时间先到先得
// PRIORITY: 按优先级字段降序,同级按创建时间
// FAIR: 逐单轮转,每轮每单最多分配一个单位,避免大单饿死小单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    Fifo,
    Priority,
    Fair,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStrategy::Fifo => write!(f, "FIFO"),
            AllocationStrategy::Priority => write!(f, "PRIORITY"),
            AllocationStrategy::Fair => write!(f, "FAIR"),
        }
    }
}

impl AllocationStrategy {
    /// 从字符串解析分配策略
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FIFO" => Some(AllocationStrategy::Fifo),
            "PRIORITY" => Some(AllocationStrategy::Priority),
            "FAIR" => Some(AllocationStrategy::Fair),
            _ => None,
        }
    }
}

// ==========================================
// 履约方式 (Fulfillment Type)
// ==========================================
// 可行性检查的输出: 纯库存满足 / 库存+生产混合满足
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentType {
    Stock, // 现货满足
    Mixed, // 现货 + 生产补足
}

impl fmt::Display for FulfillmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillmentType::Stock => write!(f, "STOCK"),
            FulfillmentType::Mixed => write!(f, "MIXED"),
        }
    }
}

// ==========================================
// 对账差异类型 (Discrepancy Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    OrphanReservation,         // 孤儿预留: 引用的订单不存在
    CancelledOrderReservation, // 漂移预留: 引用的订单已取消
}

impl fmt::Display for DiscrepancyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DiscrepancyType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DiscrepancyType::OrphanReservation => "ORPHAN_RESERVATION",
            DiscrepancyType::CancelledOrderReservation => "CANCELLED_ORDER_RESERVATION",
        }
    }

    /// 从字符串解析差异类型
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ORPHAN_RESERVATION" => Some(DiscrepancyType::OrphanReservation),
            "CANCELLED_ORDER_RESERVATION" => Some(DiscrepancyType::CancelledOrderReservation),
            _ => None,
        }
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_pending_to_confirmed() {
        // 待确认 -> 已确认 是合法转换
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        // 待确认 -> 已完成 是非法跳转
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::Completed.is_terminal()); // COMPLETED 仍可退货
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn test_cancel_reachable_before_shipping_only() {
        // 发货前任意状态可取消
        for status in [
            OrderStatus::Draft,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Ready,
        ] {
            assert!(
                status.can_transition_to(OrderStatus::Cancelled),
                "{} 应可取消",
                status
            );
        }
        // 发货后不可取消,只能走退货
        assert!(!OrderStatus::Shipping.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipping.can_transition_to(OrderStatus::Returned));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_status_db_roundtrip() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Ready,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            assert_eq!(OrderStatus::from_db_str(status.to_db_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_db_str("SHIPPED"), None); // 旧命名不兼容
    }

    #[test]
    fn test_reservation_status_parse() {
        assert_eq!(
            ReservationStatus::from_db_str("active"),
            Some(ReservationStatus::Active)
        );
        assert_eq!(ReservationStatus::from_db_str("UNKNOWN"), None);
    }

    #[test]
    fn test_allocation_strategy_parse() {
        assert_eq!(
            AllocationStrategy::from_str_opt("fair"),
            Some(AllocationStrategy::Fair)
        );
        assert_eq!(AllocationStrategy::from_str_opt("LIFO"), None);
    }
}
