// ==========================================
// 农产品配送系统 - 订单库存整合 API
// ==========================================
// 职责: 其他模块调用本核心的统一边界
// 暴露操作: 状态转换 / 可行性检查 / 可用量查询 /
//           批量分配 / 对账 / 过期清理
// 约束: 全部同步返回值或类型化错误,不暴露裸持久化查询
// ==========================================

use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::domain::inventory::Availability;
use crate::domain::types::{AllocationStrategy, OrderStatus};
use crate::engine::allocation::{BatchAllocationEngine, BatchAllocationResult};
use crate::engine::availability::AvailabilityCalculator;
use crate::engine::feasibility::{
    FeasibilityChecker, FeasibilityLine, FeasibilityOptions, FeasibilityReport,
};
use crate::engine::state_machine::{OrderStateMachine, TransitionOutcome};
use crate::jobs::cleanup::{CleanupJob, CleanupReport};
use crate::jobs::reconciliation::{ReconciliationJob, ReconciliationReport};

// ==========================================
// OrderInventoryApi - 订单库存整合 API
// ==========================================

/// 订单库存整合 API
///
/// 职责:
/// 1. 订单状态转换 (驱动预留/释放/扣减副作用)
/// 2. 下单前可行性检查 (dry run)
/// 3. 可用库存即时查询 (只读)
/// 4. 批量库存分配 (末日结算等多单竞争场景)
/// 5. 两个定时收敛入口 (对账 / 过期清理) 的手动触发
pub struct OrderInventoryApi {
    availability: Arc<AvailabilityCalculator>,
    feasibility_checker: Arc<FeasibilityChecker>,
    state_machine: Arc<OrderStateMachine>,
    allocation_engine: Arc<BatchAllocationEngine>,
    cleanup_job: Arc<CleanupJob>,
    reconciliation_job: Arc<ReconciliationJob>,
}

impl OrderInventoryApi {
    /// 创建新的 OrderInventoryApi 实例
    pub fn new(
        availability: Arc<AvailabilityCalculator>,
        feasibility_checker: Arc<FeasibilityChecker>,
        state_machine: Arc<OrderStateMachine>,
        allocation_engine: Arc<BatchAllocationEngine>,
        cleanup_job: Arc<CleanupJob>,
        reconciliation_job: Arc<ReconciliationJob>,
    ) -> Self {
        Self {
            availability,
            feasibility_checker,
            state_machine,
            allocation_engine,
            cleanup_job,
            reconciliation_job,
        }
    }

    // ==========================================
    // 暴露操作
    // ==========================================

    /// 执行订单状态转换
    ///
    /// 非法转换报 `InvalidStateTransition` (点名前后状态);
    /// 确认时库存不足报 `OutOfStock` / `PartialStock`,
    /// 前端据此区分"等待补货"与"部分履约"提示
    pub fn transition_order_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
    ) -> ApiResult<TransitionOutcome> {
        Ok(self.state_machine.transition(order_id, new_status)?)
    }

    /// 下单前可行性检查 (纯演练,不预留)
    pub fn check_feasibility(
        &self,
        lines: &[FeasibilityLine],
        options: &FeasibilityOptions,
    ) -> ApiResult<FeasibilityReport> {
        Ok(self.feasibility_checker.check_feasibility(lines, options)?)
    }

    /// 可用库存即时查询 (只读边界,外部下单流可自由调用)
    pub fn get_available_inventory(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> ApiResult<Availability> {
        Ok(self.availability.available(product_id, location_id)?)
    }

    /// 批量库存分配
    ///
    /// 单个订单的不足进 failed 列表,不拖垮整批;
    /// 意外错误整批回滚后上抛
    pub fn batch_allocate_inventory(
        &self,
        order_ids: &[String],
        strategy: AllocationStrategy,
        allow_partial: bool,
    ) -> ApiResult<BatchAllocationResult> {
        Ok(self
            .allocation_engine
            .allocate(order_ids, strategy, allow_partial)?)
    }

    /// 手动触发一轮对账 (定时入口同款逻辑)
    pub fn reconcile(&self) -> ApiResult<ReconciliationReport> {
        Ok(self.reconciliation_job.run()?)
    }

    /// 手动触发一轮过期预留清理 (定时入口同款逻辑)
    pub fn cleanup_expired_reservations(&self) -> ApiResult<CleanupReport> {
        Ok(self.cleanup_job.run()?)
    }
}
