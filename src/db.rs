// ==========================================
// 农产品配送系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为,避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 内置建表语句,库存核心可在空库上自举
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout (毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化库存核心 schema (幂等)
///
/// 表清单:
/// - orders / order_lines: 订单与行项 (核心只改 status / updated_at)
/// - inventory_records: 库存台账,(product_id, location_id) 唯一
/// - reservations: 库存预留,带引用索引供对账回查
/// - stock_movements: 库存异动流水 (只增)
/// - reconciliation_log: 对账差异记录
/// - config_kv: 全局配置键值
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            customer_id TEXT,
            location_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            priority INTEGER NOT NULL DEFAULT 0,
            required_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        CREATE TABLE IF NOT EXISTS order_lines (
            order_id TEXT NOT NULL REFERENCES orders(order_id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            PRIMARY KEY (order_id, line_no)
        );

        CREATE TABLE IF NOT EXISTS inventory_records (
            product_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            physical_qty INTEGER NOT NULL DEFAULT 0 CHECK (physical_qty >= 0),
            reserved_qty INTEGER NOT NULL DEFAULT 0 CHECK (reserved_qty >= 0),
            safety_stock INTEGER NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (product_id, location_id)
        );

        CREATE TABLE IF NOT EXISTS reservations (
            reservation_id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            reference_type TEXT NOT NULL,
            reference_no TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            released_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_reservations_key_status
            ON reservations(product_id, location_id, status);
        CREATE INDEX IF NOT EXISTS idx_reservations_reference
            ON reservations(reference_type, reference_no);

        CREATE TABLE IF NOT EXISTS stock_movements (
            movement_id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            movement_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            reference_type TEXT,
            reference_no TEXT,
            reason TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_stock_movements_key
            ON stock_movements(product_id, location_id);

        CREATE TABLE IF NOT EXISTS reconciliation_log (
            entry_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            discrepancy_type TEXT NOT NULL,
            reservation_id TEXT NOT NULL,
            reference_no TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            action TEXT NOT NULL DEFAULT 'RELEASE',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reconciliation_log_run
            ON reconciliation_log(run_id);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// 读取 schema_version (若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    use rusqlite::OptionalExtension;

    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        // 第二次初始化不应报错
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(1));
    }
}
