// ==========================================
// 农产品配送系统 - 订单仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 订单 CRUD 的全集属于订单子系统;本核心只需要
//       读取/批量读取/状态改写/删除 这几个窄接口
// ==========================================

use crate::domain::order::{Order, OrderLine, OrderWithLines};
use crate::domain::types::OrderStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    /// 创建新的 OrderRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入订单与行项 (接收外部订单流/测试种子)
    pub fn insert(&self, order_with_lines: &OrderWithLines) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        Self::insert_tx(&tx, order_with_lines)?;

        tx.commit()?;
        Ok(())
    }

    /// 事务内写入订单与行项
    pub fn insert_tx(conn: &Connection, order_with_lines: &OrderWithLines) -> RepositoryResult<()> {
        let order = &order_with_lines.order;
        conn.execute(
            r#"INSERT INTO orders (
                order_id, customer_id, location_id, status, priority,
                required_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &order.order_id,
                &order.customer_id,
                &order.location_id,
                order.status.to_db_str(),
                order.priority,
                order.required_by.map(|d| d.format("%Y-%m-%d").to_string()),
                order.created_at,
                order.updated_at,
            ],
        )?;

        for line in &order_with_lines.lines {
            conn.execute(
                r#"INSERT INTO order_lines (order_id, line_no, product_id, quantity)
                   VALUES (?, ?, ?, ?)"#,
                params![&line.order_id, line.line_no, &line.product_id, line.quantity],
            )?;
        }

        Ok(())
    }

    /// 按 order_id 查询订单 (含行项)
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<OrderWithLines>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, order_id)
    }

    /// 事务内按 order_id 查询订单 (含行项)
    pub fn find_by_id_tx(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Option<OrderWithLines>> {
        let order = conn
            .query_row(
                r#"SELECT order_id, customer_id, location_id, status, priority,
                          required_by, created_at, updated_at
                   FROM orders WHERE order_id = ?"#,
                params![order_id],
                Self::map_order_row,
            )
            .optional()?;

        let order = match order {
            Some(o) => o,
            None => return Ok(None),
        };

        let lines = Self::load_lines_tx(conn, order_id)?;
        Ok(Some(OrderWithLines { order, lines }))
    }

    /// 批量查询订单 (含行项);不存在的 ID 直接缺席,由调用方处理
    pub fn find_by_ids(&self, order_ids: &[String]) -> RepositoryResult<Vec<OrderWithLines>> {
        let conn = self.get_conn()?;
        Self::find_by_ids_tx(&conn, order_ids)
    }

    /// 事务内批量查询订单 (含行项)
    pub fn find_by_ids_tx(
        conn: &Connection,
        order_ids: &[String],
    ) -> RepositoryResult<Vec<OrderWithLines>> {
        let mut result = Vec::with_capacity(order_ids.len());
        // 逐单装配行项,保持与单查一致的加载路径
        for order_id in order_ids {
            if let Some(order_with_lines) = Self::find_by_id_tx(conn, order_id)? {
                result.push(order_with_lines);
            }
        }
        Ok(result)
    }

    /// 事务内读取订单当前状态
    pub fn find_status_tx(conn: &Connection, order_id: &str) -> RepositoryResult<Option<OrderStatus>> {
        let status_str: Option<String> = conn
            .query_row(
                "SELECT status FROM orders WHERE order_id = ?",
                params![order_id],
                |row| row.get(0),
            )
            .optional()?;

        match status_str {
            None => Ok(None),
            Some(s) => OrderStatus::from_db_str(&s)
                .map(Some)
                .ok_or_else(|| RepositoryError::FieldValueError {
                    field: "status".to_string(),
                    message: format!("无法解析的订单状态: {}", s),
                }),
        }
    }

    /// 事务内改写订单状态 (状态机引擎专用)
    ///
    /// # 返回
    /// - Ok(()): 更新成功
    /// - Err(NotFound): order_id 不存在
    pub fn update_status_tx(
        conn: &Connection,
        order_id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            "UPDATE orders SET status = ?, updated_at = ? WHERE order_id = ?",
            params![status.to_db_str(), now, order_id],
        )?;

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除订单 (级联删除行项;对账测试用于制造孤儿预留)
    pub fn delete(&self, order_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM orders WHERE order_id = ?", params![order_id])?;
        Ok(())
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn load_lines_tx(conn: &Connection, order_id: &str) -> RepositoryResult<Vec<OrderLine>> {
        let mut stmt = conn.prepare(
            r#"SELECT order_id, line_no, product_id, quantity
               FROM order_lines
               WHERE order_id = ?
               ORDER BY line_no ASC"#,
        )?;

        let lines = stmt
            .query_map(params![order_id], |row| {
                Ok(OrderLine {
                    order_id: row.get(0)?,
                    line_no: row.get(1)?,
                    product_id: row.get(2)?,
                    quantity: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<OrderLine>, _>>()?;

        Ok(lines)
    }

    fn map_order_row(row: &Row<'_>) -> rusqlite::Result<Order> {
        let status_str: String = row.get(3)?;
        let required_by: Option<String> = row.get(5)?;
        Ok(Order {
            order_id: row.get(0)?,
            customer_id: row.get(1)?,
            location_id: row.get(2)?,
            status: OrderStatus::from_db_str(&status_str).unwrap_or(OrderStatus::Draft),
            priority: row.get(4)?,
            required_by: required_by
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}
