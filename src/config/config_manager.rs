// ==========================================
// 农产品配送系统 - 整合核心配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value, scope_id='global')
// 说明: 缺失键回退到代码内默认值,空库可直接运行
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// 配置键全集
// ==========================================
pub mod config_keys {
    /// 预留默认 TTL (小时);订单确认时若无要求到货日按此推 TTL
    pub const RESERVATION_DEFAULT_TTL_HOURS: &str = "reservation.default_ttl_hours";
    /// 瞬态事务冲突的整体重试上限
    pub const ALLOCATION_MAX_CONFLICT_RETRIES: &str = "allocation.max_conflict_retries";
    /// 清理任务间隔 (秒)
    pub const JOBS_CLEANUP_INTERVAL_SECS: &str = "jobs.cleanup_interval_secs";
    /// 对账任务间隔 (秒)
    pub const JOBS_RECONCILE_INTERVAL_SECS: &str = "jobs.reconcile_interval_secs";
}

/// 预留默认 TTL: 7 天
const DEFAULT_RESERVATION_TTL_HOURS: i64 = 168;
/// 冲突重试上限默认值
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
/// 清理任务默认间隔: 每小时
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3_600;
/// 对账任务默认间隔: 每天
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 86_400;

// ==========================================
// IntegrationConfigManager - 配置管理器
// ==========================================
pub struct IntegrationConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl IntegrationConfigManager {
    /// 创建新的 IntegrationConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建配置管理器
    ///
    /// 说明: 为保证连接行为一致,会对传入连接再次应用统一 PRAGMA (幂等)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }
        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在 (调用方回退默认值)
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值 (覆写)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at)
               VALUES ('global', ?1, ?2, datetime('now'))
               ON CONFLICT(scope_id, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at"#,
            params![key, value],
        )?;
        Ok(())
    }

    // ==========================================
    // 类型化读取 (带默认值)
    // ==========================================

    /// 预留默认 TTL (小时)
    pub fn reservation_default_ttl_hours(&self) -> i64 {
        self.get_parsed(config_keys::RESERVATION_DEFAULT_TTL_HOURS)
            .unwrap_or(DEFAULT_RESERVATION_TTL_HOURS)
    }

    /// 瞬态冲突重试上限
    pub fn max_conflict_retries(&self) -> u32 {
        self.get_parsed(config_keys::ALLOCATION_MAX_CONFLICT_RETRIES)
            .unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES)
    }

    /// 清理任务间隔
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(
            self.get_parsed(config_keys::JOBS_CLEANUP_INTERVAL_SECS)
                .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
        )
    }

    /// 对账任务间隔
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(
            self.get_parsed(config_keys::JOBS_RECONCILE_INTERVAL_SECS)
                .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
        )
    }

    /// 读取并解析配置值;缺失或解析失败返回 None (回退默认)
    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        match self.get_global_config_value(key) {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("配置值解析失败,回退默认 - key={}, value={}", key, raw);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("配置读取失败,回退默认 - key={}, err={}", key, e);
                None
            }
        }
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_manager() -> IntegrationConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        IntegrationConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_on_empty_db() {
        let manager = setup_manager();
        assert_eq!(manager.reservation_default_ttl_hours(), 168);
        assert_eq!(manager.max_conflict_retries(), 3);
        assert_eq!(manager.cleanup_interval(), Duration::from_secs(3_600));
        assert_eq!(manager.reconcile_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_override_and_read_back() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::RESERVATION_DEFAULT_TTL_HOURS, "24")
            .unwrap();
        assert_eq!(manager.reservation_default_ttl_hours(), 24);

        // 覆写
        manager
            .set_global_config_value(config_keys::RESERVATION_DEFAULT_TTL_HOURS, "48")
            .unwrap();
        assert_eq!(manager.reservation_default_ttl_hours(), 48);
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::ALLOCATION_MAX_CONFLICT_RETRIES, "not-a-number")
            .unwrap();
        assert_eq!(manager.max_conflict_retries(), 3);
    }
}
