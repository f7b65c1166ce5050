// ==========================================
// 农产品配送系统 - 订单库存对账任务
// ==========================================
// 调度: 每天一次 (JobScheduler 驱动,间隔可配置)
// 职责: 找出引用已失效订单的活跃预留并释放,收敛台账
// 红线: 对账的职责是收敛状态,不是大声失败;
//       单条差异处理失败只记日志并继续
// ==========================================

use crate::domain::types::{DiscrepancyType, OrderStatus, ReferenceType};
use crate::engine::clock::Clock;
use crate::engine::error::EngineResult;
use crate::engine::events::{IntegrationEvent, OptionalEventPublisher};
use crate::engine::notify::{Notification, OptionalNotificationSink};
use crate::engine::reservation_manager::ReservationManager;
use crate::repository::order_repo::OrderRepository;
use crate::repository::reconciliation_repo::{DiscrepancyEntry, ReconciliationLogRepository};
use crate::repository::reservation_repo::ReservationRepository;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// ReconciliationReport - 对账任务结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub run_id: String,
    /// 本轮核对的活跃订单预留条数
    pub checked: usize,
    /// 发现并修正的差异
    pub discrepancies: Vec<DiscrepancyEntry>,
    pub duration_ms: i64,
}

// ==========================================
// ReconciliationJob - 订单库存对账任务
// ==========================================
pub struct ReconciliationJob {
    reservation_repo: Arc<ReservationRepository>,
    order_repo: Arc<OrderRepository>,
    reconciliation_log_repo: Arc<ReconciliationLogRepository>,
    reservation_manager: Arc<ReservationManager>,
    clock: Arc<dyn Clock>,
    event_publisher: OptionalEventPublisher,
    notifications: OptionalNotificationSink,
}

impl ReconciliationJob {
    /// 创建新的 ReconciliationJob 实例
    pub fn new(
        reservation_repo: Arc<ReservationRepository>,
        order_repo: Arc<OrderRepository>,
        reconciliation_log_repo: Arc<ReconciliationLogRepository>,
        reservation_manager: Arc<ReservationManager>,
        clock: Arc<dyn Clock>,
        event_publisher: OptionalEventPublisher,
        notifications: OptionalNotificationSink,
    ) -> Self {
        Self {
            reservation_repo,
            order_repo,
            reconciliation_log_repo,
            reservation_manager,
            clock,
            event_publisher,
            notifications,
        }
    }

    /// 执行一轮对账
    ///
    /// 逐条核对引用订单的活跃预留:
    /// - 订单不存在 => 孤儿预留,释放
    /// - 订单已取消 => 漂移预留 (取消副作用漏执行),释放
    /// 每条修正落一行 reconciliation_log;
    /// 结束时发布一条汇总事件,差异非空时另发对账报告通知。
    #[instrument(skip(self))]
    pub fn run(&self) -> EngineResult<ReconciliationReport> {
        let started_at = self.clock.now();
        let run_id = Uuid::new_v4().to_string();

        // 1. 全部订单引用的活跃预留
        let reservations = self.reservation_repo.find_active_by_type(ReferenceType::Order)?;
        let checked = reservations.len();

        // 2. 批量装载被引用订单,建 订单号 -> 状态 映射
        let mut order_ids: Vec<String> =
            reservations.iter().map(|r| r.reference_no.clone()).collect();
        order_ids.sort();
        order_ids.dedup();

        let status_by_id: HashMap<String, OrderStatus> = self
            .order_repo
            .find_by_ids(&order_ids)?
            .into_iter()
            .map(|o| (o.order.order_id.clone(), o.order.status))
            .collect();

        // 3. 逐条核对并修正
        let mut discrepancies = Vec::new();
        for reservation in &reservations {
            let discrepancy_type = match status_by_id.get(&reservation.reference_no) {
                None => DiscrepancyType::OrphanReservation,
                Some(OrderStatus::Cancelled) => DiscrepancyType::CancelledOrderReservation,
                Some(_) => continue, // 订单仍然有效,预留合法
            };

            // 释放 + 落差异记录;单条失败不拖垮整轮
            if let Err(e) = self.reservation_manager.release(&reservation.reservation_id) {
                tracing::error!(
                    "对账释放预留失败 - reservation_id={}, err={}",
                    reservation.reservation_id,
                    e
                );
                continue;
            }

            let entry = DiscrepancyEntry::build(
                &run_id,
                discrepancy_type,
                &reservation.reservation_id,
                &reservation.reference_no,
                reservation.quantity,
                self.clock.now(),
            );
            if let Err(e) = self.reconciliation_log_repo.insert(&entry) {
                tracing::error!(
                    "差异记录落库失败 - reservation_id={}, err={}",
                    reservation.reservation_id,
                    e
                );
            }
            discrepancies.push(entry);
        }

        let finished_at = self.clock.now();
        let duration_ms = (finished_at - started_at).num_milliseconds();

        // 4. 汇总事件 + 报告通知
        self.event_publisher
            .publish(IntegrationEvent::ReconciliationCompleted {
                run_id: run_id.clone(),
                discrepancy_count: discrepancies.len(),
                occurred_at: finished_at,
            });

        if !discrepancies.is_empty() {
            self.notifications.send(Notification::new(
                "inventory_reconciliation",
                json!({
                    "run_id": run_id,
                    "discrepancy_count": discrepancies.len(),
                    "duration_ms": duration_ms,
                }),
            ));
        }

        tracing::info!(
            "对账完成: 核对 {} 条,发现差异 {} 条,耗时 {}ms",
            checked,
            discrepancies.len(),
            duration_ms
        );

        Ok(ReconciliationReport {
            run_id,
            checked,
            discrepancies,
            duration_ms,
        })
    }
}
