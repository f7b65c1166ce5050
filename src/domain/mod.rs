// ==========================================
// 农产品配送系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态转换规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod inventory;
pub mod order;
pub mod reservation;
pub mod types;

// 重导出核心类型
pub use inventory::{Availability, InventoryRecord, StockMovement};
pub use order::{Order, OrderLine, OrderWithLines};
pub use reservation::Reservation;
pub use types::{
    AllocationStrategy, DiscrepancyType, FulfillmentType, MovementType, OrderStatus,
    ReferenceType, ReservationStatus,
};
