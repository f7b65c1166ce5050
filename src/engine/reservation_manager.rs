// ==========================================
// 农产品配送系统 - 库存预留管理引擎
// ==========================================
// 依据: Integration_Design_v1.0.md - 库存预留生命周期
// 红线: 可用量检查与预留落库必须在同一事务内完成,
//       杜绝"检查后写入"竞态导致的超卖
// ==========================================
// 职责: 预留创建/释放/过期的全生命周期
// 输入: 库存键 + 数量 + 业务引用 + TTL
// 输出: 预留记录 + 台账 reserved_qty 同步变动 + 异动流水
// ==========================================

use crate::domain::inventory::StockMovement;
use crate::domain::reservation::Reservation;
use crate::domain::types::{MovementType, ReferenceType, ReservationStatus};
use crate::engine::availability::AvailabilityCalculator;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{IntegrationEvent, OptionalEventPublisher};
use crate::repository::inventory_repo::InventoryRecordRepository;
use crate::repository::reservation_repo::ReservationRepository;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// 订单预留的 TTL 截止时间
///
/// 订单带要求到货日时为到货日 + 1 天,否则为 now + 默认 TTL
pub fn order_reservation_expiry(
    required_by: Option<chrono::NaiveDate>,
    now: DateTime<Utc>,
    default_ttl_hours: i64,
) -> DateTime<Utc> {
    match required_by.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(dt) => dt.and_utc() + chrono::Duration::days(1),
        None => now + chrono::Duration::hours(default_ttl_hours),
    }
}

// ==========================================
// ReserveRequest - 预留请求
// ==========================================
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub product_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_no: String,
    /// TTL 截止时间;由调用方按业务口径推导
    /// (订单确认: 要求到货日+1天;其余: 配置默认 TTL)
    pub expires_at: DateTime<Utc>,
}

// ==========================================
// ReservationManager - 库存预留管理引擎
// ==========================================
pub struct ReservationManager {
    conn: Arc<Mutex<Connection>>,
    availability: Arc<AvailabilityCalculator>,
    clock: Arc<dyn Clock>,
    event_publisher: OptionalEventPublisher,
    /// busy/冲突时的整体重试上限
    max_conflict_retries: u32,
}

impl ReservationManager {
    /// 创建新的 ReservationManager 实例
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        availability: Arc<AvailabilityCalculator>,
        clock: Arc<dyn Clock>,
        event_publisher: OptionalEventPublisher,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            conn,
            availability,
            clock,
            event_publisher,
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

    /// 创建库存预留
    ///
    /// 单个 IMMEDIATE 事务内完成: 可用量检查 -> 守卫式
    /// reserved_qty 递增 -> 预留落库 -> 异动流水。
    /// 任一步失败整体回滚,不留下半截预留。
    ///
    /// # 错误
    /// - `InsufficientInventory`: 评估时可用量 < 请求量
    ///   (错误体携带可用量,0 表示完全无货)
    /// - `TransactionConflict`: 并发冲突且重试耗尽
    #[instrument(skip(self), fields(
        product_id = %request.product_id,
        location_id = %request.location_id,
        quantity = request.quantity
    ))]
    pub fn reserve(&self, request: &ReserveRequest) -> EngineResult<Reservation> {
        let reservation = self.with_retry("reserve", || {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(crate::repository::error::RepositoryError::from)?;

            let reservation = self.reserve_in_tx(&tx, request)?;

            tx.commit()
                .map_err(crate::repository::error::RepositoryError::from)?;
            Ok(reservation)
        })?;

        self.event_publisher
            .publish(IntegrationEvent::ReservationCreated {
                reservation_id: reservation.reservation_id.clone(),
                product_id: reservation.product_id.clone(),
                location_id: reservation.location_id.clone(),
                quantity: reservation.quantity,
            });

        Ok(reservation)
    }

    /// 事务内创建库存预留 (供状态机/批量分配在自身事务内复用)
    ///
    /// 不提交事务、不发事件;调用方提交后自行发布事件
    pub fn reserve_in_tx(
        &self,
        conn: &Connection,
        request: &ReserveRequest,
    ) -> EngineResult<Reservation> {
        if request.quantity <= 0 {
            return Err(EngineError::Validation(format!(
                "预留数量必须为正: {}",
                request.quantity
            )));
        }

        let now = self.clock.now();

        // 1. 可用量检查 (含在途/待定软信号修正)
        let availability =
            self.availability
                .available_tx(conn, &request.product_id, &request.location_id)?;
        if availability.available < request.quantity {
            return Err(EngineError::InsufficientInventory {
                product_id: request.product_id.clone(),
                location_id: request.location_id.clone(),
                requested: request.quantity,
                available: availability.available,
            });
        }

        // 2. 守卫式递增 reserved_qty。守卫条件是硬不变量
        //    "活跃预留合计 <= 实物在库":软信号把名义可用量抬高时,
        //    这里仍会拒绝超出实物的预留
        let rows = InventoryRecordRepository::adjust_reserved_tx(
            conn,
            &request.product_id,
            &request.location_id,
            request.quantity,
            now,
        )?;
        if rows == 0 {
            let unreserved =
                InventoryRecordRepository::find_by_key_tx(conn, &request.product_id, &request.location_id)?
                    .map(|r| r.unreserved_qty())
                    .unwrap_or(0);
            return Err(EngineError::InsufficientInventory {
                product_id: request.product_id.clone(),
                location_id: request.location_id.clone(),
                requested: request.quantity,
                available: unreserved,
            });
        }

        // 3. 预留落库
        let reservation = Reservation::new_active(
            &request.product_id,
            &request.location_id,
            request.quantity,
            request.reference_type,
            &request.reference_no,
            request.expires_at,
            now,
        );
        ReservationRepository::insert_tx(conn, &reservation)?;

        // 4. 异动流水
        InventoryRecordRepository::record_movement_tx(
            conn,
            &StockMovement::build(
                &request.product_id,
                &request.location_id,
                MovementType::Reserve,
                request.quantity,
                Some(request.reference_type),
                Some(&request.reference_no),
                "库存预留",
                now,
            ),
        )?;

        Ok(reservation)
    }

    /// 释放库存预留 (幂等)
    ///
    /// 重复释放同一预留是 no-op,不是错误;
    /// 预留不存在才报 `ReservationNotFound`
    #[instrument(skip(self))]
    pub fn release(&self, reservation_id: &str) -> EngineResult<()> {
        let released = self.with_retry("release", || {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(crate::repository::error::RepositoryError::from)?;

            let reservation = ReservationRepository::find_by_id_tx(&tx, reservation_id)?
                .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.to_string()))?;

            let released =
                self.release_one_in_tx(&tx, &reservation, ReservationStatus::Released)?;

            tx.commit()
                .map_err(crate::repository::error::RepositoryError::from)?;
            Ok(released.then_some(reservation))
        })?;

        if let Some(reservation) = released {
            self.event_publisher
                .publish(IntegrationEvent::ReservationReleased {
                    reservation_id: reservation.reservation_id.clone(),
                    product_id: reservation.product_id.clone(),
                    location_id: reservation.location_id.clone(),
                    quantity: reservation.quantity,
                });
        }

        Ok(())
    }

    /// 事务内释放单条预留
    ///
    /// # 返回
    /// - Ok(true): 本次完成了 ACTIVE -> target 迁移,reserved_qty 已回落
    /// - Ok(false): 预留已不处于 ACTIVE,幂等短路
    pub fn release_one_in_tx(
        &self,
        conn: &Connection,
        reservation: &Reservation,
        target_status: ReservationStatus,
    ) -> EngineResult<bool> {
        let now = self.clock.now();

        let rows = ReservationRepository::mark_inactive_tx(
            conn,
            &reservation.reservation_id,
            target_status,
            now,
        )?;
        if rows == 0 {
            // 已释放/已过期: 幂等路径
            return Ok(false);
        }

        // 回落 reserved_qty (负向调整钳位到 0)
        let adjusted = InventoryRecordRepository::adjust_reserved_tx(
            conn,
            &reservation.product_id,
            &reservation.location_id,
            -reservation.quantity,
            now,
        )?;
        if adjusted == 0 {
            // 台账行缺失属于数据漂移: 预留状态已迁移,记告警继续
            tracing::warn!(
                "释放预留时台账行缺失 - product={}, location={}",
                reservation.product_id,
                reservation.location_id
            );
        }

        InventoryRecordRepository::record_movement_tx(
            conn,
            &StockMovement::build(
                &reservation.product_id,
                &reservation.location_id,
                MovementType::Release,
                reservation.quantity,
                Some(reservation.reference_type),
                Some(&reservation.reference_no),
                match target_status {
                    ReservationStatus::Expired => "预留过期释放",
                    _ => "预留释放",
                },
                now,
            ),
        )?;

        Ok(true)
    }

    /// 事务内释放某业务引用下的全部活跃预留
    ///
    /// # 返回
    /// 本次实际释放的预留列表 (调用方提交后据此发事件)
    pub fn release_by_reference_in_tx(
        &self,
        conn: &Connection,
        reference_type: ReferenceType,
        reference_no: &str,
    ) -> EngineResult<Vec<Reservation>> {
        let reservations =
            ReservationRepository::find_active_by_reference_tx(conn, reference_type, reference_no)?;

        let mut released = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            if self.release_one_in_tx(conn, &reservation, ReservationStatus::Released)? {
                released.push(reservation);
            }
        }
        Ok(released)
    }

    /// 释放某业务引用下的全部活跃预留 (独立事务)
    pub fn release_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_no: &str,
    ) -> EngineResult<Vec<Reservation>> {
        let released = self.with_retry("release_by_reference", || {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(crate::repository::error::RepositoryError::from)?;

            let released = self.release_by_reference_in_tx(&tx, reference_type, reference_no)?;

            tx.commit()
                .map_err(crate::repository::error::RepositoryError::from)?;
            Ok(released)
        })?;

        for reservation in &released {
            self.event_publisher
                .publish(IntegrationEvent::ReservationReleased {
                    reservation_id: reservation.reservation_id.clone(),
                    product_id: reservation.product_id.clone(),
                    location_id: reservation.location_id.clone(),
                    quantity: reservation.quantity,
                });
        }

        Ok(released)
    }

    /// 批量过期超时预留 (清理任务入口)
    ///
    /// 逐条独立事务处理: 单条失败只记日志并继续,
    /// 卡死整个清理批次比漏掉一条更糟。
    /// 每成功过期一条即发一条 `ReservationExpired` 事件。
    #[instrument(skip(self))]
    pub fn expire_stale(&self, now: DateTime<Utc>) -> EngineResult<Vec<Reservation>> {
        let reservation_repo = ReservationRepository::new(self.conn.clone());
        let candidates = reservation_repo.find_expired(now)?;

        let mut expired = Vec::with_capacity(candidates.len());
        for reservation in candidates {
            let result = self.with_retry("expire_stale", || {
                let mut conn = self.lock_conn()?;
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(crate::repository::error::RepositoryError::from)?;
                let released =
                    self.release_one_in_tx(&tx, &reservation, ReservationStatus::Expired)?;
                tx.commit()
                    .map_err(crate::repository::error::RepositoryError::from)?;
                Ok(released)
            });

            match result {
                Ok(true) => {
                    self.event_publisher
                        .publish(IntegrationEvent::ReservationExpired {
                            reservation_id: reservation.reservation_id.clone(),
                            reference_no: reservation.reference_no.clone(),
                            product_id: reservation.product_id.clone(),
                            quantity: reservation.quantity,
                        });
                    expired.push(reservation);
                }
                Ok(false) => {
                    // 并发窗口里已被释放,跳过
                }
                Err(e) => {
                    tracing::error!(
                        "过期预留处理失败 - reservation_id={}, err={}",
                        reservation.reservation_id,
                        e
                    );
                }
            }
        }

        Ok(expired)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 瞬态冲突 (busy/乐观锁) 的有界整体重试
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
