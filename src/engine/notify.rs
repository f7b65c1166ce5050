// ==========================================
// 农产品配送系统 - 通知出口
// ==========================================
// 职责: 定义通知下发 trait (外部协作方)
// 红线: 通知是尽力而为,下发失败不得导致核心操作失败
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 通知消息
// ==========================================

/// 通知消息
///
/// 具体投递渠道 (站内信/短信/邮件) 由外部实现决定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// 通知类型标识 (如 reservation_expired / reconciliation_report)
    pub kind: String,
    /// 通知载荷
    pub payload: serde_json::Value,
}

impl Notification {
    /// 构造通知消息
    pub fn new(kind: &str, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}

// ==========================================
// 通知出口 Trait
// ==========================================

/// 通知出口 Trait (fire-and-forget)
pub trait NotificationSink: Send + Sync {
    /// 下发通知
    fn notify(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作通知出口 (测试/未接入通知中心时)
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationSink;

impl NotificationSink for NoOpNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!("NoOpNotificationSink: 跳过通知 - kind={}", notification.kind);
        Ok(())
    }
}

/// 可选通知出口包装
///
/// 调用方统一走 `send`,失败只告警不上抛
pub struct OptionalNotificationSink {
    inner: Option<Arc<dyn NotificationSink>>,
}

impl OptionalNotificationSink {
    /// 创建带出口的实例
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self { inner: Some(sink) }
    }

    /// 创建空实例
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 从 Option 构造
    pub fn from_option(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { inner: sink }
    }

    /// 尽力下发;任何失败都吞掉并记录告警
    pub fn send(&self, notification: Notification) {
        if let Some(sink) = &self.inner {
            if let Err(e) = sink.notify(notification.clone()) {
                tracing::warn!("通知下发失败 - kind={}, err={}", notification.kind, e);
            }
        }
    }
}

impl Default for OptionalNotificationSink {
    fn default() -> Self {
        Self::none()
    }
}
