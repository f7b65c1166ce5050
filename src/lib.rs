// ==========================================
// 农产品配送系统 - 订单库存整合核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 订单与库存之间的分配/对账核心
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 定时任务层 - 周期性收敛
pub mod jobs;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施 (连接初始化/PRAGMA/建表统一)
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AllocationStrategy, DiscrepancyType, FulfillmentType, MovementType, OrderStatus,
    ReferenceType, ReservationStatus,
};

// 领域实体
pub use domain::{
    Availability, InventoryRecord, Order, OrderLine, OrderWithLines, Reservation, StockMovement,
};

// 引擎
pub use engine::{
    AvailabilityCalculator, BatchAllocationEngine, FeasibilityChecker, OrderStateMachine,
    ReservationManager,
};

// 定时任务
pub use jobs::{CleanupJob, JobScheduler, ReconciliationJob};

// API
pub use api::OrderInventoryApi;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "农产品配送系统 - 订单库存整合核心";

// ==========================================
// 预编译检查
// ==========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
