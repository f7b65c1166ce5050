// ==========================================
// 农产品配送系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数接受外部连接/事务,供引擎层
//       把多个仓储写入组合进同一事务
// ==========================================

pub mod error;
pub mod inventory_repo;
pub mod order_repo;
pub mod reconciliation_repo;
pub mod reservation_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use inventory_repo::InventoryRecordRepository;
pub use order_repo::OrderRepository;
pub use reconciliation_repo::{DiscrepancyEntry, ReconciliationLogRepository};
pub use reservation_repo::ReservationRepository;
