// ==========================================
// 农产品配送系统 - 配置层
// ==========================================
// 职责: 整合核心的运行参数管理
// 存储: config_kv 表,缺失回退代码内默认值
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, IntegrationConfigManager};
