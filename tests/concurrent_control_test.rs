// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证并发确认/预留下 "预留合计 <= 实物在库" 不变量
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_control_test {
    use agri_order_inventory::domain::types::{OrderStatus, ReferenceType};
    use agri_order_inventory::engine::{Clock, EngineError, ReserveRequest};
    use agri_order_inventory::repository::reservation_repo::ReservationRepository;
    use chrono::Duration;
    use std::thread;

    use crate::test_helpers::{create_test_db, inventory_of, seed_inventory, seed_order, setup_core};

    // ==========================================
    // 测试1: 并发确认竞争同一库存池 (场景1)
    // ==========================================

    #[test]
    fn test_concurrent_confirm_never_oversells() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let core = setup_core(&db_path);

        // 100 单位池: A 要 60,B 要 50,并发确认
        seed_inventory(&core, "P001", "W1", 100);
        seed_order(&core, "SO-A", OrderStatus::Pending, "W1", 0, 0, &[("P001", 60)]);
        seed_order(&core, "SO-B", OrderStatus::Pending, "W1", 0, 10, &[("P001", 50)]);

        let sm_a = core.state_machine.clone();
        let sm_b = core.state_machine.clone();
        let handle_a =
            thread::spawn(move || sm_a.transition("SO-A", OrderStatus::Confirmed));
        let handle_b =
            thread::spawn(move || sm_b.transition("SO-B", OrderStatus::Confirmed));

        let result_a = handle_a.join().unwrap();
        let result_b = handle_b.join().unwrap();

        // 恰有一单整单成功 (60+50 > 100,不可能双赢)
        let ok_count = [result_a.is_ok(), result_b.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(ok_count, 1, "60+50 超过 100,两单不可能同时确认成功");

        // 失败方必须是库存不足,且错误携带可用量
        let failed = if result_a.is_err() { result_a } else { result_b };
        match failed.unwrap_err() {
            EngineError::InsufficientInventory { available, .. } => {
                assert!(available < 60, "失败时可用量必然已被对方占用");
            }
            other => panic!("期望 InsufficientInventory,得到 {:?}", other),
        }

        // 不变量: 预留合计 <= 实物在库
        let record = inventory_of(&core, "P001", "W1");
        assert!(record.reserved_qty <= record.physical_qty);
        assert!(record.reserved_qty == 50 || record.reserved_qty == 60);
    }

    #[test]
    fn test_loser_can_confirm_after_winner_cancels() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let core = setup_core(&db_path);

        seed_inventory(&core, "P001", "W1", 100);
        seed_order(&core, "SO-A", OrderStatus::Pending, "W1", 0, 0, &[("P001", 60)]);
        seed_order(&core, "SO-B", OrderStatus::Pending, "W1", 0, 10, &[("P001", 50)]);

        core.state_machine
            .transition("SO-A", OrderStatus::Confirmed)
            .unwrap();
        // B 此刻确认失败 (可用 40 < 50)
        assert!(core
            .state_machine
            .transition("SO-B", OrderStatus::Confirmed)
            .is_err());

        // A 取消释放后,B 重试成功
        core.state_machine
            .transition("SO-A", OrderStatus::Cancelled)
            .unwrap();
        core.state_machine
            .transition("SO-B", OrderStatus::Confirmed)
            .unwrap();

        assert_eq!(inventory_of(&core, "P001", "W1").reserved_qty, 50);
    }

    // ==========================================
    // 测试2: 多线程抢预留
    // ==========================================

    #[test]
    fn test_concurrent_reserve_respects_physical_cap() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let core = setup_core(&db_path);

        // 50 单位池,8 个线程各抢 10: 最多 5 个成功
        seed_inventory(&core, "P001", "W1", 50);
        let expires_at = core.clock.now() + Duration::days(1);

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = core.reservation_manager.clone();
            let request = ReserveRequest {
                product_id: "P001".to_string(),
                location_id: "W1".to_string(),
                quantity: 10,
                reference_type: ReferenceType::Order,
                reference_no: format!("SO-{:02}", i),
                expires_at,
            };
            handles.push(thread::spawn(move || manager.reserve(&request)));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => succeeded += 1,
                Err(EngineError::InsufficientInventory { .. }) => {}
                Err(other) => panic!("意外错误: {:?}", other),
            }
        }

        assert_eq!(succeeded, 5);
        let record = inventory_of(&core, "P001", "W1");
        assert_eq!(record.reserved_qty, 50);
        assert!(record.reserved_qty <= record.physical_qty);

        // 派生字段与预留表合计一致
        let conn = core.conn.lock().unwrap();
        let sum = ReservationRepository::sum_active_by_key_tx(&conn, "P001", "W1").unwrap();
        assert_eq!(sum, record.reserved_qty);
    }

    // ==========================================
    // 测试3: 并发释放与预留交错
    // ==========================================

    #[test]
    fn test_interleaved_reserve_and_release_keeps_invariant() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let core = setup_core(&db_path);

        seed_inventory(&core, "P001", "W1", 30);
        let expires_at = core.clock.now() + Duration::days(1);

        // 先占满
        let first = core
            .reservation_manager
            .reserve(&ReserveRequest {
                product_id: "P001".to_string(),
                location_id: "W1".to_string(),
                quantity: 30,
                reference_type: ReferenceType::Order,
                reference_no: "SO-HOLD".to_string(),
                expires_at,
            })
            .unwrap();

        // 一个线程释放,另一个线程抢占
        let manager_release = core.reservation_manager.clone();
        let release_id = first.reservation_id.clone();
        let release_handle = thread::spawn(move || manager_release.release(&release_id));

        let manager_reserve = core.reservation_manager.clone();
        let reserve_handle = thread::spawn(move || {
            manager_reserve.reserve(&ReserveRequest {
                product_id: "P001".to_string(),
                location_id: "W1".to_string(),
                quantity: 30,
                reference_type: ReferenceType::Order,
                reference_no: "SO-TAKE".to_string(),
                expires_at,
            })
        });

        release_handle.join().unwrap().unwrap();
        // 抢占方要么在释放前评估 (不足失败),要么在释放后成功;都合法
        let _ = reserve_handle.join().unwrap();

        let record = inventory_of(&core, "P001", "W1");
        assert!(record.reserved_qty <= record.physical_qty);
        assert!(record.reserved_qty == 0 || record.reserved_qty == 30);
    }
}
