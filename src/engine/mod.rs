// ==========================================
// 农产品配送系统 - 引擎层
// ==========================================
// 职责: 实现订单库存整合的业务规则引擎
// 红线: Engine 持有事务边界;所有拒绝必须输出显式原因
// ==========================================

pub mod allocation;
pub mod availability;
pub mod clock;
pub mod error;
pub mod events;
pub mod feasibility;
pub mod notify;
pub mod reservation_manager;
pub mod state_machine;

// 重导出核心引擎
pub use allocation::{
    BatchAllocationEngine, BatchAllocationResult, FailedAllocation, GrantedLine, OrderAllocation,
};
pub use availability::{AvailabilityCalculator, SupplyDemandSignals, ZeroSignals};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use events::{
    IntegrationEvent, IntegrationEventPublisher, NoOpEventPublisher, OptionalEventPublisher,
};
pub use feasibility::{
    CapacityAnswer, FeasibilityChecker, FeasibilityLine, FeasibilityOptions, FeasibilityReport,
    FeasibleItem, FulfillmentSuggestion, InfeasibleItem, NoProductionOracle,
    ProductionCapacityOracle,
};
pub use notify::{NoOpNotificationSink, Notification, NotificationSink, OptionalNotificationSink};
pub use reservation_manager::{order_reservation_expiry, ReservationManager, ReserveRequest};
pub use state_machine::{OrderStateMachine, TransitionOutcome};
