// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、核心装配、测试数据种子
// ==========================================
#![allow(dead_code)]

use agri_order_inventory::api::OrderInventoryApi;
use agri_order_inventory::config::IntegrationConfigManager;
use agri_order_inventory::db;
use agri_order_inventory::domain::inventory::InventoryRecord;
use agri_order_inventory::domain::order::{Order, OrderLine, OrderWithLines};
use agri_order_inventory::domain::types::OrderStatus;
use agri_order_inventory::engine::{
    AvailabilityCalculator, BatchAllocationEngine, Clock, FeasibilityChecker, FixedClock,
    IntegrationEventPublisher, NoProductionOracle, NotificationSink, OptionalEventPublisher,
    OptionalNotificationSink, OrderStateMachine, ReservationManager,
};
use agri_order_inventory::jobs::{CleanupJob, ReconciliationJob};
use agri_order_inventory::repository::{
    InventoryRecordRepository, OrderRepository, ReconciliationLogRepository,
    ReservationRepository,
};
use chrono::{Duration, Utc};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件 (需要保持存活)
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = db::open_sqlite_connection(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 装配好的整合核心 (测试用)
pub struct TestCore {
    pub conn: Arc<Mutex<Connection>>,
    pub clock: Arc<FixedClock>,
    pub order_repo: Arc<OrderRepository>,
    pub inventory_repo: Arc<InventoryRecordRepository>,
    pub reservation_repo: Arc<ReservationRepository>,
    pub reconciliation_log_repo: Arc<ReconciliationLogRepository>,
    pub reservation_manager: Arc<ReservationManager>,
    pub state_machine: Arc<OrderStateMachine>,
    pub allocation_engine: Arc<BatchAllocationEngine>,
    pub cleanup_job: Arc<CleanupJob>,
    pub reconciliation_job: Arc<ReconciliationJob>,
    pub api: Arc<OrderInventoryApi>,
}

/// 按默认配置装配核心 (无事件发布/无通知出口)
pub fn setup_core(db_path: &str) -> TestCore {
    setup_core_with(db_path, None, None)
}

/// 装配核心,可注入事件发布者与通知出口
pub fn setup_core_with(
    db_path: &str,
    publisher: Option<Arc<dyn IntegrationEventPublisher>>,
    sink: Option<Arc<dyn NotificationSink>>,
) -> TestCore {
    let conn = Arc::new(Mutex::new(db::open_sqlite_connection(db_path).unwrap()));
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let config = IntegrationConfigManager::from_connection(conn.clone()).unwrap();

    let order_repo = Arc::new(OrderRepository::new(conn.clone()));
    let inventory_repo = Arc::new(InventoryRecordRepository::new(conn.clone()));
    let reservation_repo = Arc::new(ReservationRepository::new(conn.clone()));
    let reconciliation_log_repo = Arc::new(ReconciliationLogRepository::new(conn.clone()));

    let availability = Arc::new(AvailabilityCalculator::with_zero_signals(conn.clone()));
    let reservation_manager = Arc::new(ReservationManager::new(
        conn.clone(),
        availability.clone(),
        clock.clone(),
        OptionalEventPublisher::from_option(publisher.clone()),
        config.max_conflict_retries(),
    ));

    let state_machine = Arc::new(OrderStateMachine::new(
        conn.clone(),
        reservation_manager.clone(),
        clock.clone(),
        OptionalEventPublisher::from_option(publisher.clone()),
        config.reservation_default_ttl_hours(),
        config.max_conflict_retries(),
    ));

    let allocation_engine = Arc::new(BatchAllocationEngine::new(
        conn.clone(),
        availability.clone(),
        reservation_manager.clone(),
        clock.clone(),
        OptionalEventPublisher::from_option(publisher.clone()),
        config.reservation_default_ttl_hours(),
        config.max_conflict_retries(),
    ));

    let feasibility_checker = Arc::new(FeasibilityChecker::new(
        availability.clone(),
        Arc::new(NoProductionOracle),
    ));

    let cleanup_job = Arc::new(CleanupJob::new(
        reservation_manager.clone(),
        clock.clone(),
        OptionalNotificationSink::from_option(sink.clone()),
    ));

    let reconciliation_job = Arc::new(ReconciliationJob::new(
        reservation_repo.clone(),
        order_repo.clone(),
        reconciliation_log_repo.clone(),
        reservation_manager.clone(),
        clock.clone(),
        OptionalEventPublisher::from_option(publisher),
        OptionalNotificationSink::from_option(sink),
    ));

    let api = Arc::new(OrderInventoryApi::new(
        availability,
        feasibility_checker,
        state_machine.clone(),
        allocation_engine.clone(),
        cleanup_job.clone(),
        reconciliation_job.clone(),
    ));

    TestCore {
        conn,
        clock,
        order_repo,
        inventory_repo,
        reservation_repo,
        reconciliation_log_repo,
        reservation_manager,
        state_machine,
        allocation_engine,
        cleanup_job,
        reconciliation_job,
        api,
    }
}

/// 种子库存台账行
pub fn seed_inventory(core: &TestCore, product_id: &str, location_id: &str, physical: i64) {
    core.inventory_repo
        .upsert(&InventoryRecord {
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            physical_qty: physical,
            reserved_qty: 0,
            safety_stock: 0,
            revision: 0,
            updated_at: core.clock.now(),
        })
        .unwrap();
}

/// 种子订单与行项
///
/// # 参数
/// - `created_offset_secs`: 相对基准时间的创建偏移 (FIFO 排序用)
/// - `lines`: (product_id, quantity) 列表,行号从 1 递增
pub fn seed_order(
    core: &TestCore,
    order_id: &str,
    status: OrderStatus,
    location_id: &str,
    priority: i32,
    created_offset_secs: i64,
    lines: &[(&str, i64)],
) {
    let base = core.clock.now() - Duration::days(1);
    let created_at = base + Duration::seconds(created_offset_secs);

    let order = Order {
        order_id: order_id.to_string(),
        customer_id: Some("C001".to_string()),
        location_id: location_id.to_string(),
        status,
        priority,
        required_by: None,
        created_at,
        updated_at: created_at,
    };

    let lines = lines
        .iter()
        .enumerate()
        .map(|(idx, (product_id, quantity))| OrderLine {
            order_id: order_id.to_string(),
            line_no: (idx + 1) as i32,
            product_id: product_id.to_string(),
            quantity: *quantity,
        })
        .collect();

    core.order_repo
        .insert(&OrderWithLines { order, lines })
        .unwrap();
}

/// 读取台账行 (断言用)
pub fn inventory_of(core: &TestCore, product_id: &str, location_id: &str) -> InventoryRecord {
    core.inventory_repo
        .find_by_key(product_id, location_id)
        .unwrap()
        .unwrap()
}
