// ==========================================
// 定时任务调度器集成测试
// ==========================================
// 职责: 验证调度循环能按间隔驱动清理/对账并存活于单轮失败
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod job_scheduler_test {
    use agri_order_inventory::domain::types::ReferenceType;
    use agri_order_inventory::engine::{Clock, ReserveRequest};
    use agri_order_inventory::jobs::JobScheduler;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    use crate::test_helpers::{create_test_db, inventory_of, seed_inventory, setup_core};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_drives_cleanup_loop() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let core = setup_core(&db_path);

        seed_inventory(&core, "P001", "W1", 100);
        core.reservation_manager
            .reserve(&ReserveRequest {
                product_id: "P001".to_string(),
                location_id: "W1".to_string(),
                quantity: 20,
                reference_type: ReferenceType::Order,
                reference_no: "SO-A".to_string(),
                expires_at: core.clock.now() - ChronoDuration::hours(1),
            })
            .unwrap();
        assert_eq!(inventory_of(&core, "P001", "W1").reserved_qty, 20);

        let scheduler = JobScheduler::new(
            core.cleanup_job.clone(),
            core.reconciliation_job.clone(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let handles = scheduler.spawn();

        // 轮询等待清理循环生效 (上限 2s,避免时序抖动导致偶发失败)
        let mut cleaned = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if inventory_of(&core, "P001", "W1").reserved_qty == 0 {
                cleaned = true;
                break;
            }
        }

        for handle in handles {
            handle.abort();
        }

        assert!(cleaned, "调度循环应在 2s 内驱动清理任务释放过期预留");
    }
}
