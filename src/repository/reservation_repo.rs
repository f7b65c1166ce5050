// ==========================================
// 农产品配送系统 - 库存预留仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 索引: (product_id, location_id, status) 支撑可用量核对,
//       (reference_type, reference_no) 支撑对账回查
// ==========================================

use crate::domain::reservation::Reservation;
use crate::domain::types::{ReferenceType, ReservationStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ReservationRepository - 库存预留仓储
// ==========================================
pub struct ReservationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReservationRepository {
    /// 创建新的 ReservationRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 事务内写入预留记录
    pub fn insert_tx(conn: &Connection, reservation: &Reservation) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO reservations (
                reservation_id, product_id, location_id, quantity,
                reference_type, reference_no, status, expires_at,
                created_at, released_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &reservation.reservation_id,
                &reservation.product_id,
                &reservation.location_id,
                reservation.quantity,
                reservation.reference_type.to_db_str(),
                &reservation.reference_no,
                reservation.status.to_db_str(),
                reservation.expires_at,
                reservation.created_at,
                reservation.released_at,
            ],
        )?;
        Ok(())
    }

    /// 按 reservation_id 查询预留
    pub fn find_by_id(&self, reservation_id: &str) -> RepositoryResult<Option<Reservation>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, reservation_id)
    }

    /// 事务内按 reservation_id 查询预留
    pub fn find_by_id_tx(
        conn: &Connection,
        reservation_id: &str,
    ) -> RepositoryResult<Option<Reservation>> {
        let reservation = conn
            .query_row(
                &format!("{} WHERE reservation_id = ?", Self::SELECT_BASE),
                params![reservation_id],
                Self::map_row,
            )
            .optional()?;
        Ok(reservation)
    }

    /// 查询某业务引用下的全部活跃预留
    pub fn find_active_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_no: &str,
    ) -> RepositoryResult<Vec<Reservation>> {
        let conn = self.get_conn()?;
        Self::find_active_by_reference_tx(&conn, reference_type, reference_no)
    }

    /// 事务内查询某业务引用下的全部活跃预留
    pub fn find_active_by_reference_tx(
        conn: &Connection,
        reference_type: ReferenceType,
        reference_no: &str,
    ) -> RepositoryResult<Vec<Reservation>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE reference_type = ? AND reference_no = ? AND status = 'ACTIVE'
             ORDER BY created_at ASC, reservation_id ASC",
            Self::SELECT_BASE
        ))?;

        let reservations = stmt
            .query_map(
                params![reference_type.to_db_str(), reference_no],
                Self::map_row,
            )?
            .collect::<Result<Vec<Reservation>, _>>()?;
        Ok(reservations)
    }

    /// 查询某来源类型下的全部活跃预留 (对账任务)
    pub fn find_active_by_type(
        &self,
        reference_type: ReferenceType,
    ) -> RepositoryResult<Vec<Reservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE reference_type = ? AND status = 'ACTIVE'
             ORDER BY created_at ASC, reservation_id ASC",
            Self::SELECT_BASE
        ))?;

        let reservations = stmt
            .query_map(params![reference_type.to_db_str()], Self::map_row)?
            .collect::<Result<Vec<Reservation>, _>>()?;
        Ok(reservations)
    }

    /// 查询已过期的活跃预留 (清理任务)
    pub fn find_expired(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Reservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'ACTIVE' AND expires_at < ?
             ORDER BY expires_at ASC, reservation_id ASC",
            Self::SELECT_BASE
        ))?;

        let reservations = stmt
            .query_map(params![now], Self::map_row)?
            .collect::<Result<Vec<Reservation>, _>>()?;
        Ok(reservations)
    }

    /// 事务内迁移预留状态 (仅允许从 ACTIVE 出发)
    ///
    /// # 返回
    /// - Ok(1): 迁移成功
    /// - Ok(0): 预留不存在或已不处于 ACTIVE (幂等路径)
    pub fn mark_inactive_tx(
        conn: &Connection,
        reservation_id: &str,
        target_status: ReservationStatus,
        released_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows_affected = conn.execute(
            r#"UPDATE reservations
               SET status = ?, released_at = ?
               WHERE reservation_id = ? AND status = 'ACTIVE'"#,
            params![target_status.to_db_str(), released_at, reservation_id],
        )?;
        Ok(rows_affected)
    }

    /// 事务内统计某库存键上的活跃预留合计 (不变量核对)
    pub fn sum_active_by_key_tx(
        conn: &Connection,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<i64> {
        let sum: Option<i64> = conn.query_row(
            r#"SELECT SUM(quantity) FROM reservations
               WHERE product_id = ? AND location_id = ? AND status = 'ACTIVE'"#,
            params![product_id, location_id],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    // ==========================================
    // 行映射
    // ==========================================

    const SELECT_BASE: &'static str = r#"SELECT reservation_id, product_id, location_id, quantity,
               reference_type, reference_no, status, expires_at,
               created_at, released_at
        FROM reservations"#;

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Reservation> {
        let reference_type_str: String = row.get(4)?;
        let status_str: String = row.get(6)?;
        Ok(Reservation {
            reservation_id: row.get(0)?,
            product_id: row.get(1)?,
            location_id: row.get(2)?,
            quantity: row.get(3)?,
            reference_type: ReferenceType::from_db_str(&reference_type_str)
                .unwrap_or(ReferenceType::Manual),
            reference_no: row.get(5)?,
            status: ReservationStatus::from_db_str(&status_str)
                .unwrap_or(ReservationStatus::Released),
            expires_at: row.get(7)?,
            created_at: row.get(8)?,
            released_at: row.get(9)?,
        })
    }
}
