// ==========================================
// 农产品配送系统 - 订单状态机引擎
// ==========================================
// 依据: Integration_Design_v1.0.md - 订单状态生命周期
// 红线: 状态写入与库存副作用必须同事务提交;
//       确认失败不允许留下任何一行预留 (all-or-nothing)
// ==========================================
// 职责: 校验并执行订单状态转换,驱动预留/释放/扣减副作用
// 输入: order_id + 目标状态
// 输出: 转换结果 + 提交后发布的整合事件
// ==========================================

use crate::domain::inventory::StockMovement;
use crate::domain::order::OrderWithLines;
use crate::domain::types::{MovementType, OrderStatus, ReferenceType};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{IntegrationEvent, OptionalEventPublisher};
use crate::engine::reservation_manager::{
    order_reservation_expiry, ReservationManager, ReserveRequest,
};
use crate::repository::error::RepositoryError;
use crate::repository::inventory_repo::InventoryRecordRepository;
use crate::repository::order_repo::OrderRepository;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::instrument;

// ==========================================
// TransitionOutcome - 转换结果
// ==========================================
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order_id: String,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    /// 确认时新建的预留条数
    pub reservations_created: usize,
    /// 取消/完成时释放的预留条数
    pub reservations_released: usize,
    /// 完成时扣减的行项条数
    pub lines_deducted: usize,
}

// ==========================================
// OrderStateMachine - 订单状态机引擎
// ==========================================
pub struct OrderStateMachine {
    conn: Arc<Mutex<Connection>>,
    reservation_manager: Arc<ReservationManager>,
    clock: Arc<dyn Clock>,
    event_publisher: OptionalEventPublisher,
    /// 确认预留的默认 TTL (小时);订单带要求到货日时按到货日+1天
    default_ttl_hours: i64,
    max_conflict_retries: u32,
}

impl OrderStateMachine {
    /// 创建新的 OrderStateMachine 实例
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        reservation_manager: Arc<ReservationManager>,
        clock: Arc<dyn Clock>,
        event_publisher: OptionalEventPublisher,
        default_ttl_hours: i64,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            conn,
            reservation_manager,
            clock,
            event_publisher,
            default_ttl_hours,
            max_conflict_retries,
        }
    }

    fn lock_conn(&self) -> EngineResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EngineError::TransactionConflict(format!("数据库锁获取失败: {}", e)))
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 执行订单状态转换
    ///
    /// 转换表之外的跳转报 `InvalidTransition` 且不落库。
    /// 副作用与状态写入在同一 IMMEDIATE 事务内:
    /// - PENDING -> CONFIRMED: 逐行创建预留,任一行失败整体回滚
    /// - 任意 -> CANCELLED: 释放该订单全部活跃预留
    /// - DELIVERED -> COMPLETED: 逐行扣减实物并释放背书预留
    ///   (预留转实扣,不重复计数)
    ///
    /// 提交后发布 `OrderStatusChanged` 与各副作用事件。
    #[instrument(skip(self), fields(order_id = %order_id, target = %new_status))]
    pub fn transition(
        &self,
        order_id: &str,
        new_status: OrderStatus,
    ) -> EngineResult<TransitionOutcome> {
        let (outcome, events) = self.with_retry("transition", || {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(RepositoryError::from)?;

            let result = self.transition_in_tx(&tx, order_id, new_status)?;

            tx.commit().map_err(RepositoryError::from)?;
            Ok(result)
        })?;

        // 事务已提交,向观察方发布事件
        self.event_publisher
            .publish(IntegrationEvent::OrderStatusChanged {
                order_id: outcome.order_id.clone(),
                old_status: outcome.old_status,
                new_status: outcome.new_status,
            });
        for event in events {
            self.event_publisher.publish(event);
        }

        Ok(outcome)
    }

    /// 事务内执行转换 (状态校验 + 副作用 + 状态写入)
    fn transition_in_tx(
        &self,
        conn: &Connection,
        order_id: &str,
        new_status: OrderStatus,
    ) -> EngineResult<(TransitionOutcome, Vec<IntegrationEvent>)> {
        let now = self.clock.now();

        // 1. 装载订单与行项
        let order_with_lines = OrderRepository::find_by_id_tx(conn, order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        let old_status = order_with_lines.order.status;

        // 2. 转换表校验
        if !old_status.can_transition_to(new_status) {
            return Err(EngineError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        // 3. 副作用 (与状态写入同事务)
        let mut events = Vec::new();
        let mut outcome = TransitionOutcome {
            order_id: order_id.to_string(),
            old_status,
            new_status,
            reservations_created: 0,
            reservations_released: 0,
            lines_deducted: 0,
        };

        match (old_status, new_status) {
            (OrderStatus::Pending, OrderStatus::Confirmed) => {
                outcome.reservations_created =
                    self.allocate_for_order(conn, &order_with_lines, now, &mut events)?;
            }
            (_, OrderStatus::Cancelled) => {
                outcome.reservations_released =
                    self.release_for_order(conn, order_id, &mut events)?;
            }
            (_, OrderStatus::Completed) => {
                let (deducted, released) =
                    self.deduct_for_order(conn, &order_with_lines, now, &mut events)?;
                outcome.lines_deducted = deducted;
                outcome.reservations_released = released;
            }
            _ => {
                // 纯状态流转,无库存副作用
            }
        }

        // 4. 状态写入
        OrderRepository::update_status_tx(conn, order_id, new_status, now)?;

        Ok((outcome, events))
    }

    // ==========================================
    // 副作用实现
    // ==========================================

    /// 确认分配: 逐行创建预留 (行序即 line_no 序)
    fn allocate_for_order(
        &self,
        conn: &Connection,
        order_with_lines: &OrderWithLines,
        now: DateTime<Utc>,
        events: &mut Vec<IntegrationEvent>,
    ) -> EngineResult<usize> {
        let order = &order_with_lines.order;
        // 要求到货日 + 1 天后预留失效;无到货日按默认 TTL
        let expires_at =
            order_reservation_expiry(order.required_by, now, self.default_ttl_hours);

        let mut created = 0;
        for line in &order_with_lines.lines {
            // 任一行不足 => 错误上抛 => 整个事务回滚,前面的行也不留预留
            let reservation = self.reservation_manager.reserve_in_tx(
                conn,
                &ReserveRequest {
                    product_id: line.product_id.clone(),
                    location_id: order.location_id.clone(),
                    quantity: line.quantity,
                    reference_type: ReferenceType::Order,
                    reference_no: order.order_id.clone(),
                    expires_at,
                },
            )?;
            events.push(IntegrationEvent::ReservationCreated {
                reservation_id: reservation.reservation_id,
                product_id: reservation.product_id,
                location_id: reservation.location_id,
                quantity: reservation.quantity,
            });
            created += 1;
        }
        Ok(created)
    }

    /// 取消释放: 释放订单全部活跃预留
    fn release_for_order(
        &self,
        conn: &Connection,
        order_id: &str,
        events: &mut Vec<IntegrationEvent>,
    ) -> EngineResult<usize> {
        let released = self.reservation_manager.release_by_reference_in_tx(
            conn,
            ReferenceType::Order,
            order_id,
        )?;
        for reservation in &released {
            events.push(IntegrationEvent::ReservationReleased {
                reservation_id: reservation.reservation_id.clone(),
                product_id: reservation.product_id.clone(),
                location_id: reservation.location_id.clone(),
                quantity: reservation.quantity,
            });
        }
        Ok(released.len())
    }

    /// 完成扣减: 逐行实扣 + 释放背书预留 (预留转实扣)
    fn deduct_for_order(
        &self,
        conn: &Connection,
        order_with_lines: &OrderWithLines,
        now: DateTime<Utc>,
        events: &mut Vec<IntegrationEvent>,
    ) -> EngineResult<(usize, usize)> {
        let order = &order_with_lines.order;

        let mut deducted = 0;
        for line in &order_with_lines.lines {
            let rows = InventoryRecordRepository::adjust_physical_tx(
                conn,
                &line.product_id,
                &order.location_id,
                -line.quantity,
                now,
            )?;
            if rows == 0 {
                let physical =
                    InventoryRecordRepository::find_by_key_tx(conn, &line.product_id, &order.location_id)?
                        .map(|r| r.physical_qty)
                        .unwrap_or(0);
                return Err(EngineError::InsufficientInventory {
                    product_id: line.product_id.clone(),
                    location_id: order.location_id.clone(),
                    requested: line.quantity,
                    available: physical,
                });
            }

            InventoryRecordRepository::record_movement_tx(
                conn,
                &StockMovement::build(
                    &line.product_id,
                    &order.location_id,
                    MovementType::Outbound,
                    -line.quantity,
                    Some(ReferenceType::Order),
                    Some(&order.order_id),
                    "订单完成出库",
                    now,
                ),
            )?;
            deducted += 1;

            // 扣减后跌破安全库存 => 低库存信号 (提交后发布)
            if let Some(record) =
                InventoryRecordRepository::find_by_key_tx(conn, &line.product_id, &order.location_id)?
            {
                if record.is_below_safety_stock() {
                    events.push(IntegrationEvent::LowStock {
                        product_id: record.product_id.clone(),
                        location_id: record.location_id.clone(),
                        current_qty: record.physical_qty,
                        safety_stock: record.safety_stock,
                    });
                }
            }
        }

        // 释放背书预留: reserved_qty 回落,实物已经扣过,不再二次扣减
        let released = self.release_for_order(conn, &order.order_id, events)?;

        Ok((deducted, released))
    }

    /// 瞬态冲突的有界整体重试
    fn with_retry<T>(&self, op_name: &str, f: impl Fn() -> EngineResult<T>) -> EngineResult<T> {
        let mut attempt: u32 = 0;
        loop {
            match f() {
                Err(EngineError::Repository(repo_err)) if repo_err.is_retryable() => {
                    if attempt >= self.max_conflict_retries {
                        return Err(EngineError::TransactionConflict(format!(
                            "{} 重试 {} 次后仍然冲突: {}",
                            op_name, attempt, repo_err
                        )));
                    }
                    attempt += 1;
                    tracing::warn!(
                        "{} 遇到瞬态冲突,第 {} 次重试 - {}",
                        op_name,
                        attempt,
                        repo_err
                    );
                }
                other => return other,
            }
        }
    }
}
