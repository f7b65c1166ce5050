// ==========================================
// 农产品配送系统 - API层错误类型
// ==========================================
// 职责: 将仓储/引擎错误转换为用户可读、可行动的错误消息
// 红线: 库存不足必须区分"完全无货"与"部分有货",
//       驱动前端的部分履约提示;非法转换必须点名前后状态
// ==========================================

use crate::domain::types::OrderStatus;
use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 库存约束错误
    // ==========================================
    /// 完全无货: 提示等待补货/换仓
    #[error("商品 {product_id} 在库位 {location_id} 暂无现货 (请求 {requested});请等待补货或更换发货仓")]
    OutOfStock {
        product_id: String,
        location_id: String,
        requested: i64,
    },

    /// 部分有货: 提示部分履约
    #[error("商品 {product_id} 在库位 {location_id} 现货不足 (请求 {requested},可用 {available});可选择部分履约")]
    PartialStock {
        product_id: String,
        location_id: String,
        requested: i64,
        available: i64,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("操作冲突,请重试: {0}")]
    Conflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 EngineError 转换
// 目的: 把引擎层的技术语义转换为面向用户的可行动消息
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InsufficientInventory {
                product_id,
                location_id,
                requested,
                available,
            } => {
                if available == 0 {
                    ApiError::OutOfStock {
                        product_id,
                        location_id,
                        requested,
                    }
                } else {
                    ApiError::PartialStock {
                        product_id,
                        location_id,
                        requested,
                        available,
                    }
                }
            }
            EngineError::InvalidTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            EngineError::TransactionConflict(msg) => ApiError::Conflict(msg),
            EngineError::OrderNotFound(id) => ApiError::NotFound(format!("订单 {} 不存在", id)),
            EngineError::ReservationNotFound(id) => {
                ApiError::NotFound(format!("预留 {} 不存在", id))
            }
            EngineError::InventoryRecordNotFound {
                product_id,
                location_id,
            } => ApiError::NotFound(format!(
                "库存台账不存在: product={}, location={}",
                product_id, location_id
            )),
            EngineError::Validation(msg) => ApiError::InvalidInput(msg),
            EngineError::Repository(repo_err) => repo_err.into(),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::Conflict(format!(
                "{}({}) 已被其他操作修改 (期望revision={},实际revision={})",
                entity, id, expected, actual
            )),
            RepositoryError::DatabaseBusy(msg) => ApiError::Conflict(msg),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::DatabaseConnectionError(msg)
            | RepositoryError::LockError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
