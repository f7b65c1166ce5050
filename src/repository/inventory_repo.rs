// ==========================================
// 农产品配送系统 - 库存台账仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: reserved_qty / physical_qty 只允许通过本仓储的
//       守卫式 UPDATE 改写,保证"活跃预留合计 <= 实物在库"
// ==========================================

use crate::domain::inventory::{InventoryRecord, StockMovement};
use crate::domain::types::{MovementType, ReferenceType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// InventoryRecordRepository - 库存台账仓储
// ==========================================
pub struct InventoryRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRecordRepository {
    /// 创建新的 InventoryRecordRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入/覆盖台账行 (入库收货流与测试种子)
    pub fn upsert(&self, record: &InventoryRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO inventory_records (
                product_id, location_id, physical_qty, reserved_qty,
                safety_stock, revision, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id, location_id) DO UPDATE SET
                physical_qty = excluded.physical_qty,
                reserved_qty = excluded.reserved_qty,
                safety_stock = excluded.safety_stock,
                revision = inventory_records.revision + 1,
                updated_at = excluded.updated_at"#,
            params![
                &record.product_id,
                &record.location_id,
                record.physical_qty,
                record.reserved_qty,
                record.safety_stock,
                record.revision,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 按 (product_id, location_id) 查询台账行
    pub fn find_by_key(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<InventoryRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_key_tx(&conn, product_id, location_id)
    }

    /// 事务内按键查询台账行
    pub fn find_by_key_tx(
        conn: &Connection,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<InventoryRecord>> {
        let record = conn
            .query_row(
                r#"SELECT product_id, location_id, physical_qty, reserved_qty,
                          safety_stock, revision, updated_at
                   FROM inventory_records
                   WHERE product_id = ? AND location_id = ?"#,
                params![product_id, location_id],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    /// 查询全部台账行 (报表/测试)
    pub fn list_all(&self) -> RepositoryResult<Vec<InventoryRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT product_id, location_id, physical_qty, reserved_qty,
                      safety_stock, revision, updated_at
               FROM inventory_records
               ORDER BY product_id, location_id"#,
        )?;

        let records = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<InventoryRecord>, _>>()?;
        Ok(records)
    }

    /// 事务内调整预留数量 (守卫式 UPDATE)
    ///
    /// 守卫条件: 调整后 reserved_qty 不得超过 physical_qty;
    /// 负向调整钳位到 0 (释放幂等的最后防线)。
    ///
    /// # 返回
    /// - Ok(1): 调整成功
    /// - Ok(0): 守卫未通过 (台账行不存在,或正向调整会超出实物在库) —
    ///          由引擎层判定为库存不足/记录缺失
    pub fn adjust_reserved_tx(
        conn: &Connection,
        product_id: &str,
        location_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows_affected = conn.execute(
            r#"UPDATE inventory_records
               SET reserved_qty = MAX(0, reserved_qty + ?3),
                   revision = revision + 1,
                   updated_at = ?4
               WHERE product_id = ?1 AND location_id = ?2
                 AND reserved_qty + ?3 <= physical_qty"#,
            params![product_id, location_id, delta, now],
        )?;
        Ok(rows_affected)
    }

    /// 事务内调整实物数量 (守卫式 UPDATE)
    ///
    /// 守卫条件: 调整后 physical_qty 不得为负。
    /// 订单完成的扣减必须与对应预留的释放在同一事务内配对执行,
    /// 事务提交时"活跃预留合计 <= 实物在库"才能保持成立。
    ///
    /// # 返回
    /// - Ok(1): 调整成功
    /// - Ok(0): 守卫未通过 (行不存在或会扣成负数)
    pub fn adjust_physical_tx(
        conn: &Connection,
        product_id: &str,
        location_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows_affected = conn.execute(
            r#"UPDATE inventory_records
               SET physical_qty = physical_qty + ?3,
                   revision = revision + 1,
                   updated_at = ?4
               WHERE product_id = ?1 AND location_id = ?2
                 AND physical_qty + ?3 >= 0"#,
            params![product_id, location_id, delta, now],
        )?;
        Ok(rows_affected)
    }

    /// 事务内追加库存异动流水
    pub fn record_movement_tx(conn: &Connection, movement: &StockMovement) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO stock_movements (
                movement_id, product_id, location_id, movement_type,
                quantity, reference_type, reference_no, reason, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &movement.movement_id,
                &movement.product_id,
                &movement.location_id,
                movement.movement_type.to_db_str(),
                movement.quantity,
                movement.reference_type.map(|t| t.to_db_str()),
                &movement.reference_no,
                &movement.reason,
                movement.created_at,
            ],
        )?;
        Ok(())
    }

    /// 按键查询异动流水 (审计/测试)
    pub fn find_movements_by_key(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Vec<StockMovement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT movement_id, product_id, location_id, movement_type,
                      quantity, reference_type, reference_no, reason, created_at
               FROM stock_movements
               WHERE product_id = ? AND location_id = ?
               ORDER BY created_at ASC, movement_id ASC"#,
        )?;

        let movements = stmt
            .query_map(params![product_id, location_id], Self::map_movement_row)?
            .collect::<Result<Vec<StockMovement>, _>>()?;
        Ok(movements)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_row(row: &Row<'_>) -> rusqlite::Result<InventoryRecord> {
        Ok(InventoryRecord {
            product_id: row.get(0)?,
            location_id: row.get(1)?,
            physical_qty: row.get(2)?,
            reserved_qty: row.get(3)?,
            safety_stock: row.get(4)?,
            revision: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn map_movement_row(row: &Row<'_>) -> rusqlite::Result<StockMovement> {
        let movement_type_str: String = row.get(3)?;
        let reference_type_str: Option<String> = row.get(5)?;
        Ok(StockMovement {
            movement_id: row.get(0)?,
            product_id: row.get(1)?,
            location_id: row.get(2)?,
            movement_type: match movement_type_str.as_str() {
                "INBOUND" => MovementType::Inbound,
                "OUTBOUND" => MovementType::Outbound,
                "RESERVE" => MovementType::Reserve,
                _ => MovementType::Release,
            },
            quantity: row.get(4)?,
            reference_type: reference_type_str.as_deref().and_then(ReferenceType::from_db_str),
            reference_no: row.get(6)?,
            reason: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
