// ==========================================
// 农产品配送系统 - 对账差异记录仓储
// ==========================================
// 说明: 对账任务发现并修正的每条差异都落一条记录,
//       只增不改,供审计与报表回溯
// ==========================================

use crate::domain::types::DiscrepancyType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// DiscrepancyEntry - 对账差异记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyEntry {
    pub entry_id: String,
    pub run_id: String, // 所属对账批次
    pub discrepancy_type: DiscrepancyType,
    pub reservation_id: String,
    pub reference_no: String, // 预留引用的订单号
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl DiscrepancyEntry {
    /// 构造一条差异记录
    pub fn build(
        run_id: &str,
        discrepancy_type: DiscrepancyType,
        reservation_id: &str,
        reference_no: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            discrepancy_type,
            reservation_id: reservation_id.to_string(),
            reference_no: reference_no.to_string(),
            quantity,
            created_at: now,
        }
    }
}

// ==========================================
// ReconciliationLogRepository - 对账记录仓储
// ==========================================
pub struct ReconciliationLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReconciliationLogRepository {
    /// 创建新的 ReconciliationLogRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条差异记录
    pub fn insert(&self, entry: &DiscrepancyEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, entry)
    }

    /// 事务内追加一条差异记录
    pub fn insert_tx(conn: &Connection, entry: &DiscrepancyEntry) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO reconciliation_log (
                entry_id, run_id, discrepancy_type, reservation_id,
                reference_no, quantity, action, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'RELEASE', ?)"#,
            params![
                &entry.entry_id,
                &entry.run_id,
                entry.discrepancy_type.to_db_str(),
                &entry.reservation_id,
                &entry.reference_no,
                entry.quantity,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// 查询某批次的全部差异记录
    pub fn find_by_run(&self, run_id: &str) -> RepositoryResult<Vec<DiscrepancyEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT entry_id, run_id, discrepancy_type, reservation_id,
                      reference_no, quantity, created_at
               FROM reconciliation_log
               WHERE run_id = ?
               ORDER BY created_at ASC, entry_id ASC"#,
        )?;

        let entries = stmt
            .query_map(params![run_id], Self::map_row)?
            .collect::<Result<Vec<DiscrepancyEntry>, _>>()?;
        Ok(entries)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<DiscrepancyEntry> {
        let type_str: String = row.get(2)?;
        Ok(DiscrepancyEntry {
            entry_id: row.get(0)?,
            run_id: row.get(1)?,
            discrepancy_type: DiscrepancyType::from_db_str(&type_str)
                .unwrap_or(DiscrepancyType::OrphanReservation),
            reservation_id: row.get(3)?,
            reference_no: row.get(4)?,
            quantity: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
