// ==========================================
// 农产品配送系统 - 批量库存分配引擎
// ==========================================
// 依据: Integration_Design_v1.0.md - 批量库存分配
// 红线: 决策与落库两阶段必须在同一排它事务内;
//       同快照 + 同策略 => 分类与数量完全可复现
// ==========================================
// 职责: 多订单竞争同一库存池时的确定性分配
// 输入: 订单ID列表 + 分配策略 + 是否允许部分分配
// 输出: allocated / partial / failed 三类结果 + 真实预留
// ==========================================

use crate::domain::order::OrderWithLines;
use crate::domain::types::{AllocationStrategy, ReferenceType};
use crate::engine::availability::AvailabilityCalculator;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{IntegrationEvent, OptionalEventPublisher};
use crate::engine::reservation_manager::{
    order_reservation_expiry, ReservationManager, ReserveRequest,
};
use crate::repository::error::RepositoryError;
use crate::repository::order_repo::OrderRepository;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::instrument;

// ==========================================
// 分配结果结构
// ==========================================

/// 行级授予结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedLine {
    pub line_no: i32,
    pub product_id: String,
    pub quantity_requested: i64,
    pub quantity_granted: i64,
}

/// 单订单分配结果 (整单/部分)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAllocation {
    pub order_id: String,
    pub lines: Vec<GrantedLine>,
}

impl OrderAllocation {
    /// 授予总量
    pub fn total_granted(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity_granted).sum()
    }
}

/// 单订单分配失败
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAllocation {
    pub order_id: String,
    pub reason: String,
}

/// 批量分配总结果
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchAllocationResult {
    pub allocated: Vec<OrderAllocation>,
    pub partial: Vec<OrderAllocation>,
    pub failed: Vec<FailedAllocation>,
}

// ==========================================
// 内部决策结构
// ==========================================

/// 库存键: (product_id, location_id)
/// BTreeMap 保证遍历顺序确定,分配结果可复现
type PoolKey = (String, String);

/// 候选订单 + 行级授予进度
struct Candidate {
    order: OrderWithLines,
    /// 与 order.lines 下标对齐的授予数量
    grants: Vec<i64>,
}

impl Candidate {
    fn new(order: OrderWithLines) -> Self {
        let line_count = order.lines.len();
        Self {
            order,
            grants: vec![0; line_count],
        }
    }

    fn reset_grants(&mut self) {
        self.grants.iter_mut().for_each(|g| *g = 0);
    }

    fn is_fully_granted(&self) -> bool {
        self.order
            .lines
            .iter()
            .zip(&self.grants)
            .all(|(line, granted)| *granted >= line.quantity)
    }

    fn total_granted(&self) -> i64 {
        self.grants.iter().sum()
    }

    fn to_allocation(&self) -> OrderAllocation {
        OrderAllocation {
            order_id: self.order.order.order_id.clone(),
            lines: self
                .order
                .lines
                .iter()
                .zip(&self.grants)
                .map(|(line, granted)| GrantedLine {
                    line_no: line.line_no,
                    product_id: line.product_id.clone(),
                    quantity_requested: line.quantity,
                    quantity_granted: *granted,
                })
                .collect(),
        }
    }
}

// ==========================================
// BatchAllocationEngine - 批量库存分配引擎
// ==========================================
pub struct BatchAllocationEngine {
    conn: Arc<Mutex<Connection>>,
    availability: Arc<AvailabilityCalculator>,
    reservation_manager: Arc<ReservationManager>,
    clock: Arc<dyn Clock>,
    event_publisher: OptionalEventPublisher,
    default_ttl_hours: i64,
    max_conflict_retries: u32,
}

impl BatchAllocationEngine {
    /// 创建新的 BatchAllocationEngine 实例
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        availability: Arc<AvailabilityCalculator>,
        reservation_manager: Arc<ReservationManager>,
        clock: Arc<dyn Clock>,
        event_publisher: OptionalEventPublisher,
        default_ttl_hours: i64,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            conn,
            availability,
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

    /// 批量分配库存
    ///
    /// 两阶段,单个 EXCLUSIVE 事务:
    /// 1) 决策阶段: 以事务内快照建内存可用量池,按策略授予
    /// 2) 落库阶段: 对授予结果创建真实预留
    /// 单个订单的不足只进 failed 列表,不拖垮整批;
    /// 意外错误 (数据库故障等) 整批回滚并上抛。
    #[instrument(skip(self, order_ids), fields(
        order_count = order_ids.len(),
        strategy = %strategy,
        allow_partial = allow_partial
    ))]
    pub fn allocate(
        &self,
        order_ids: &[String],
        strategy: AllocationStrategy,
        allow_partial: bool,
    ) -> EngineResult<BatchAllocationResult> {
        let result = self.with_retry("batch_allocate", || {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Exclusive)
                .map_err(RepositoryError::from)?;

            let result = self.allocate_in_tx(&tx, order_ids, strategy, allow_partial)?;

            tx.commit().map_err(RepositoryError::from)?;
            Ok(result)
        })?;

        self.event_publisher
            .publish(IntegrationEvent::BatchAllocationCompleted {
                allocated: result.allocated.len(),
                partial: result.partial.len(),
                failed: result.failed.len(),
            });

        Ok(result)
    }

    /// 事务内执行批量分配
    fn allocate_in_tx(
        &self,
        conn: &Connection,
        order_ids: &[String],
        strategy: AllocationStrategy,
        allow_partial: bool,
    ) -> EngineResult<BatchAllocationResult> {
        let mut result = BatchAllocationResult::default();

        // 1. 装载候选订单 (去重保序;缺失/不可分配的直接进 failed)
        let mut candidates = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for order_id in order_ids {
            if !seen.insert(order_id.clone()) {
                continue;
            }
            match OrderRepository::find_by_id_tx(conn, order_id)? {
                None => result.failed.push(FailedAllocation {
                    order_id: order_id.clone(),
                    reason: "订单不存在".to_string(),
                }),
                Some(order_with_lines) => {
                    if !order_with_lines.order.is_allocatable() {
                        result.failed.push(FailedAllocation {
                            order_id: order_id.clone(),
                            reason: format!(
                                "订单状态 {} 不可参与分配",
                                order_with_lines.order.status
                            ),
                        });
                    } else if order_with_lines.lines.is_empty() {
                        result.failed.push(FailedAllocation {
                            order_id: order_id.clone(),
                            reason: "订单无行项".to_string(),
                        });
                    } else {
                        candidates.push(Candidate::new(order_with_lines));
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Ok(result);
        }

        // 2. 按策略排序 (显式多级比较,保证确定性)
        Self::sort_candidates(&mut candidates, strategy);

        // 3. 以事务内快照建内存可用量池
        let mut pool = self.build_pool(conn, &candidates)?;

        // 4. 决策阶段: 按策略授予
        match strategy {
            AllocationStrategy::Fifo | AllocationStrategy::Priority => {
                self.grant_sequential(&mut candidates, &mut pool, allow_partial, &mut result);
            }
            AllocationStrategy::Fair => {
                Self::grant_fair(&mut candidates, &pool, allow_partial, &mut result);
            }
        }

        // 5. 落库阶段: 对授予结果创建真实预留
        let now = self.clock.now();
        for candidate in &candidates {
            if candidate.total_granted() == 0 {
                continue;
            }
            let order = &candidate.order.order;
            let expires_at =
                order_reservation_expiry(order.required_by, now, self.default_ttl_hours);

            for (line, granted) in candidate.order.lines.iter().zip(&candidate.grants) {
                if *granted <= 0 {
                    continue;
                }
                // 授予量不超过快照可用量,守卫检查必然通过;
                // 失败意味着意外状态 => 上抛,整批回滚
                self.reservation_manager.reserve_in_tx(
                    conn,
                    &ReserveRequest {
                        product_id: line.product_id.clone(),
                        location_id: order.location_id.clone(),
                        quantity: *granted,
                        reference_type: ReferenceType::Order,
                        reference_no: order.order_id.clone(),
                        expires_at,
                    },
                )?;
            }

            if candidate.is_fully_granted() {
                result.allocated.push(candidate.to_allocation());
            } else {
                result.partial.push(candidate.to_allocation());
            }
        }

        Ok(result)
    }

    // ==========================================
    // 决策阶段实现
    // ==========================================

    /// 按策略排序候选订单
    ///
    /// - FIFO: created_at 升序
    /// - PRIORITY: priority 降序,再 created_at 升序
    /// - FAIR: 轮转起点仍按 created_at 升序 (结果可复现)
    /// 末级一律以 order_id 定序,杜绝同时间戳的不确定性
    fn sort_candidates(candidates: &mut [Candidate], strategy: AllocationStrategy) {
        candidates.sort_by(|a, b| {
            let (oa, ob) = (&a.order.order, &b.order.order);
            let primary = match strategy {
                AllocationStrategy::Priority => ob.priority.cmp(&oa.priority),
                _ => std::cmp::Ordering::Equal,
            };
            primary
                .then(oa.created_at.cmp(&ob.created_at))
                .then(oa.order_id.cmp(&ob.order_id))
        });
    }

    /// 以事务内快照为候选订单涉及的库存键建池
    fn build_pool(
        &self,
        conn: &Connection,
        candidates: &[Candidate],
    ) -> EngineResult<BTreeMap<PoolKey, i64>> {
        let mut pool = BTreeMap::new();
        for candidate in candidates {
            let location_id = &candidate.order.order.location_id;
            for line in &candidate.order.lines {
                let key = (line.product_id.clone(), location_id.clone());
                if !pool.contains_key(&key) {
                    let availability = self.availability.available_tx(conn, &key.0, &key.1)?;
                    pool.insert(key, availability.available);
                }
            }
        }
        Ok(pool)
    }

    /// FIFO / PRIORITY: 按排序逐单尽量满足
    fn grant_sequential(
        &self,
        candidates: &mut Vec<Candidate>,
        pool: &mut BTreeMap<PoolKey, i64>,
        allow_partial: bool,
        result: &mut BatchAllocationResult,
    ) {
        for candidate in candidates.iter_mut() {
            let location_id = candidate.order.order.location_id.clone();

            // 先演练整单能否满足
            let mut shortfall: Option<(String, i64, i64)> = None;
            for line in &candidate.order.lines {
                let key = (line.product_id.clone(), location_id.clone());
                let remaining = pool.get(&key).copied().unwrap_or(0);
                if remaining < line.quantity {
                    shortfall = Some((line.product_id.clone(), line.quantity, remaining));
                    break;
                }
            }

            match shortfall {
                None => {
                    // 整单满足: 全额授予
                    for (idx, line) in candidate.order.lines.iter().enumerate() {
                        let key = (line.product_id.clone(), location_id.clone());
                        if let Some(remaining) = pool.get_mut(&key) {
                            *remaining -= line.quantity;
                        }
                        candidate.grants[idx] = line.quantity;
                    }
                }
                Some((product_id, requested, remaining)) if allow_partial => {
                    // 部分授予: 逐行取 min(请求, 剩余)
                    for (idx, line) in candidate.order.lines.iter().enumerate() {
                        let key = (line.product_id.clone(), location_id.clone());
                        let pool_remaining = pool.get(&key).copied().unwrap_or(0);
                        let granted = line.quantity.min(pool_remaining).max(0);
                        if granted > 0 {
                            if let Some(entry) = pool.get_mut(&key) {
                                *entry -= granted;
                            }
                            candidate.grants[idx] = granted;
                        }
                    }
                    if candidate.total_granted() == 0 {
                        result.failed.push(FailedAllocation {
                            order_id: candidate.order.order.order_id.clone(),
                            reason: format!(
                                "库存不足: product={} 请求={} 剩余={}",
                                product_id, requested, remaining
                            ),
                        });
                    }
                }
                Some((product_id, requested, remaining)) => {
                    // 不允许部分 => 整单失败,池不动
                    result.failed.push(FailedAllocation {
                        order_id: candidate.order.order.order_id.clone(),
                        reason: format!(
                            "库存不足: product={} 请求={} 剩余={}",
                            product_id, requested, remaining
                        ),
                    });
                }
            }
        }
    }

    /// FAIR: 跨订单逐单位轮转授予
    ///
    /// 每轮每单每行最多授予 1 个单位,直到一整轮无任何授予;
    /// 不允许部分分配时,未能整单满足的订单退出并归还授予量,
    /// 在幸存订单间重跑轮转,直至集合稳定 (每次至少淘汰一单,必然终止)
    fn grant_fair(
        candidates: &mut Vec<Candidate>,
        seed_pool: &BTreeMap<PoolKey, i64>,
        allow_partial: bool,
        result: &mut BatchAllocationResult,
    ) {
        // active[i] = 候选 i 是否仍参与轮转
        let mut active: Vec<bool> = vec![true; candidates.len()];

        loop {
            // 重置授予与池,按当前幸存集合重跑
            let mut pool = seed_pool.clone();
            for candidate in candidates.iter_mut() {
                candidate.reset_grants();
            }

            // 逐单位轮转
            loop {
                let mut granted_this_pass = false;
                for (idx, candidate) in candidates.iter_mut().enumerate() {
                    if !active[idx] {
                        continue;
                    }
                    let location_id = candidate.order.order.location_id.clone();
                    for (line_idx, line) in candidate.order.lines.iter().enumerate() {
                        if candidate.grants[line_idx] >= line.quantity {
                            continue;
                        }
                        let key = (line.product_id.clone(), location_id.clone());
                        if let Some(remaining) = pool.get_mut(&key) {
                            if *remaining > 0 {
                                *remaining -= 1;
                                candidate.grants[line_idx] += 1;
                                granted_this_pass = true;
                            }
                        }
                    }
                }
                if !granted_this_pass {
                    break;
                }
            }

            if allow_partial {
                break;
            }

            // 不允许部分: 淘汰未整单满足的订单后重跑
            let mut newly_failed = false;
            for (idx, candidate) in candidates.iter_mut().enumerate() {
                if active[idx] && !candidate.is_fully_granted() {
                    active[idx] = false;
                    newly_failed = true;
                    candidate.reset_grants();
                    result.failed.push(FailedAllocation {
                        order_id: candidate.order.order.order_id.clone(),
                        reason: "库存不足: 整单不可满足且不允许部分分配".to_string(),
                    });
                }
            }
            if !newly_failed {
                break;
            }
        }

        // 彻底颗粒无收的幸存订单也计入 failed (allow_partial 下可能出现)
        for (idx, candidate) in candidates.iter().enumerate() {
            if active[idx] && candidate.total_granted() == 0 {
                result.failed.push(FailedAllocation {
                    order_id: candidate.order.order.order_id.clone(),
                    reason: "库存不足: 可用量为零".to_string(),
                });
            }
        }
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
