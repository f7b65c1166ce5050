// ==========================================
// 农产品配送系统 - 引擎层事件发布
// ==========================================
// 职责: 定义整合事件发布 trait,实现依赖倒置
// 说明: 引擎层定义 trait,外部消费方 (通知/指标) 实现适配器;
//       事件在事务提交后发出,显式方法调用,不挂隐式订阅图
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 整合事件类型
// ==========================================

/// 订单库存整合事件
///
/// 引擎层在事务提交后发布,用于通知下游系统 (通知中心/指标采集)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrationEvent {
    /// 订单状态变更
    OrderStatusChanged {
        order_id: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    /// 库存预留创建
    ReservationCreated {
        reservation_id: String,
        product_id: String,
        location_id: String,
        quantity: i64,
    },
    /// 库存预留释放
    ReservationReleased {
        reservation_id: String,
        product_id: String,
        location_id: String,
        quantity: i64,
    },
    /// 库存预留过期 (清理任务逐条发出)
    ReservationExpired {
        reservation_id: String,
        reference_no: String,
        product_id: String,
        quantity: i64,
    },
    /// 低库存信号 (扣减后跌破安全库存)
    LowStock {
        product_id: String,
        location_id: String,
        current_qty: i64,
        safety_stock: i64,
    },
    /// 批量分配完成
    BatchAllocationCompleted {
        allocated: usize,
        partial: usize,
        failed: usize,
    },
    /// 对账完成 (汇总报告)
    ReconciliationCompleted {
        run_id: String,
        discrepancy_count: usize,
        occurred_at: DateTime<Utc>,
    },
}

impl IntegrationEvent {
    /// 转换为字符串标识 (日志/指标标签)
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderStatusChanged { .. } => "OrderStatusChanged",
            IntegrationEvent::ReservationCreated { .. } => "ReservationCreated",
            IntegrationEvent::ReservationReleased { .. } => "ReservationReleased",
            IntegrationEvent::ReservationExpired { .. } => "ReservationExpired",
            IntegrationEvent::LowStock { .. } => "LowStock",
            IntegrationEvent::BatchAllocationCompleted { .. } => "BatchAllocationCompleted",
            IntegrationEvent::ReconciliationCompleted { .. } => "ReconciliationCompleted",
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 整合事件发布者 Trait
///
/// 引擎层定义,外部层实现;发布失败不回滚已提交的业务事务
pub trait IntegrationEventPublisher: Send + Sync {
    /// 发布整合事件
    fn publish(&self, event: IntegrationEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景 (如单元测试)
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl IntegrationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: IntegrationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!("NoOpEventPublisher: 跳过事件发布 - {}", event.as_str());
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn IntegrationEventPublisher>> 的使用;
/// 发布失败只记日志,绝不让业务操作失败
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn IntegrationEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn IntegrationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例 (不发布事件)
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 从 Option 构造
    pub fn from_option(publisher: Option<Arc<dyn IntegrationEventPublisher>>) -> Self {
        Self { inner: publisher }
    }

    /// 发布事件 (如果有发布者);失败吞掉并告警
    pub fn publish(&self, event: IntegrationEvent) {
        if let Some(publisher) = &self.inner {
            if let Err(e) = publisher.publish(event.clone()) {
                tracing::warn!("事件发布失败 - event={}, err={}", event.as_str(), e);
            }
        } else {
            tracing::debug!("OptionalEventPublisher: 未配置发布者,跳过事件 - {}", event.as_str());
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 收集事件的测试发布者
    #[derive(Default)]
    pub struct CollectingPublisher {
        pub events: Mutex<Vec<IntegrationEvent>>,
    }

    impl IntegrationEventPublisher for CollectingPublisher {
        fn publish(&self, event: IntegrationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let result = publisher.publish(IntegrationEvent::BatchAllocationCompleted {
            allocated: 1,
            partial: 0,
            failed: 0,
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_optional_publisher_none_does_not_panic() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish(IntegrationEvent::LowStock {
            product_id: "P001".to_string(),
            location_id: "W1".to_string(),
            current_qty: 5,
            safety_stock: 10,
        });
    }

    #[test]
    fn test_optional_publisher_delivers() {
        let collector = Arc::new(CollectingPublisher::default());
        let publisher = OptionalEventPublisher::with_publisher(collector.clone());
        assert!(publisher.is_configured());

        publisher.publish(IntegrationEvent::OrderStatusChanged {
            order_id: "SO-1001".to_string(),
            old_status: OrderStatus::Pending,
            new_status: OrderStatus::Confirmed,
        });

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_str(), "OrderStatusChanged");
    }
}
