// ==========================================
// 农产品配送系统 - 引擎层错误类型
// ==========================================
// 红线: 所有拒绝必须输出显式原因 (可解释性)
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::OrderStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 库存约束错误 =====
    /// 库存不足。requested/available 同时携带,
    /// 调用方据此区分"完全无货"与"部分有货"并驱动部分履约提示
    #[error("库存不足: product={product_id}, location={location_id}, 请求={requested}, 可用={available}")]
    InsufficientInventory {
        product_id: String,
        location_id: String,
        requested: i64,
        available: i64,
    },

    // ===== 状态机错误 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    // ===== 并发控制错误 =====
    /// 并发写冲突,整个操作可从头安全重试 (引擎内部已做有界重试)
    #[error("事务冲突: {0}")]
    TransactionConflict(String),

    // ===== 实体缺失错误 =====
    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("预留不存在: {0}")]
    ReservationNotFound(String),

    #[error("库存台账不存在: product={product_id}, location={location_id}")]
    InventoryRecordNotFound {
        product_id: String,
        location_id: String,
    },

    // ===== 输入校验错误 =====
    #[error("无效输入: {0}")]
    Validation(String),

    // ===== 下层错误透传 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// 库存不足时是否"完全无货" (available == 0)
    ///
    /// 部分有货时上层提示部分履约,完全无货时提示等待补货
    pub fn is_out_of_stock(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientInventory { available: 0, .. }
        )
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_inventory_message_distinguishes_stock_level() {
        // 完全无货
        let err = EngineError::InsufficientInventory {
            product_id: "P001".to_string(),
            location_id: "W1".to_string(),
            requested: 10,
            available: 0,
        };
        assert!(err.is_out_of_stock());
        assert!(err.to_string().contains("可用=0"));

        // 部分有货
        let err = EngineError::InsufficientInventory {
            product_id: "P001".to_string(),
            location_id: "W1".to_string(),
            requested: 10,
            available: 4,
        };
        assert!(!err.is_out_of_stock());
        assert!(err.to_string().contains("可用=4"));
    }

    #[test]
    fn test_invalid_transition_names_both_statuses() {
        let err = EngineError::InvalidTransition {
            from: OrderStatus::Draft,
            to: OrderStatus::Completed,
        };
        let msg = err.to_string();
        assert!(msg.contains("DRAFT"));
        assert!(msg.contains("COMPLETED"));
    }
}
