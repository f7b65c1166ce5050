// Small dev utility: run one cleanup pass + one reconciliation pass
// against the given database and print both reports.
//
// Usage:
//   cargo run --bin run-maintenance-jobs -- [db_path]
//
// This is intentionally lightweight and does not start the scheduler loops.

use agri_order_inventory::config::IntegrationConfigManager;
use agri_order_inventory::db::{init_schema, open_sqlite_connection};
use agri_order_inventory::engine::{
    AvailabilityCalculator, OptionalEventPublisher, OptionalNotificationSink, ReservationManager,
    SystemClock,
};
use agri_order_inventory::jobs::{CleanupJob, ReconciliationJob};
use agri_order_inventory::repository::{
    OrderRepository, ReconciliationLogRepository, ReservationRepository,
};
use std::sync::{Arc, Mutex};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    agri_order_inventory::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .unwrap_or_else(|| "agri_order_inventory.db".to_string());

    tracing::info!("使用数据库: {}", db_path);

    let raw_conn = open_sqlite_connection(&db_path)?;
    init_schema(&raw_conn)?;
    let conn = Arc::new(Mutex::new(raw_conn));

    let config = IntegrationConfigManager::from_connection(conn.clone())?;
    let clock = Arc::new(SystemClock);

    let availability = Arc::new(AvailabilityCalculator::with_zero_signals(conn.clone()));
    let reservation_manager = Arc::new(ReservationManager::new(
        conn.clone(),
        availability,
        clock.clone(),
        OptionalEventPublisher::none(),
        config.max_conflict_retries(),
    ));

    let cleanup_job = CleanupJob::new(
        reservation_manager.clone(),
        clock.clone(),
        OptionalNotificationSink::none(),
    );
    let reconciliation_job = ReconciliationJob::new(
        Arc::new(ReservationRepository::new(conn.clone())),
        Arc::new(OrderRepository::new(conn.clone())),
        Arc::new(ReconciliationLogRepository::new(conn.clone())),
        reservation_manager,
        clock,
        OptionalEventPublisher::none(),
        OptionalNotificationSink::none(),
    );

    let cleanup_report = cleanup_job.run()?;
    println!(
        "cleanup: expired={} notified={}",
        cleanup_report.expired, cleanup_report.notified
    );

    let reconciliation_report = reconciliation_job.run()?;
    println!(
        "reconcile: run_id={} checked={} discrepancies={} duration_ms={}",
        reconciliation_report.run_id,
        reconciliation_report.checked,
        reconciliation_report.discrepancies.len(),
        reconciliation_report.duration_ms
    );

    Ok(())
}
