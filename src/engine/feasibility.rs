// ==========================================
// 农产品配送系统 - 订单可行性检查引擎
// ==========================================
// 依据: Integration_Design_v1.0.md - 订单可行性检查
// 职责: 下单前演练行项能否满足 (现货 / 现货+生产 / 不可满足)
// 说明: 纯演练 (dry run),绝不创建预留、绝不改写台账
// ==========================================

use crate::engine::availability::AvailabilityCalculator;
use crate::engine::error::EngineResult;
use crate::domain::types::FulfillmentType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// 生产产能外部协作方
// ==========================================

/// 生产产能应答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityAnswer {
    pub can_produce: bool,
    /// 生产补足的交付周期 (天)
    pub lead_time_days: i64,
}

/// 生产产能查询 Trait (外部协作方,内部实现不在本核心范围)
pub trait ProductionCapacityOracle: Send + Sync {
    /// 查询在要求日期前能否补产指定数量
    fn can_produce(
        &self,
        product_id: &str,
        quantity: i64,
        by_date: Option<NaiveDate>,
    ) -> CapacityAnswer;
}

/// 默认实现: 一律回答不可生产 (未接入生产子系统时)
#[derive(Debug, Clone, Default)]
pub struct NoProductionOracle;

impl ProductionCapacityOracle for NoProductionOracle {
    fn can_produce(&self, _: &str, _: i64, _: Option<NaiveDate>) -> CapacityAnswer {
        CapacityAnswer {
            can_produce: false,
            lead_time_days: 0,
        }
    }
}

// ==========================================
// 输入/输出结构
// ==========================================

/// 待检查的行项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityLine {
    pub product_id: String,
    pub quantity: i64,
    pub required_by: Option<NaiveDate>,
}

/// 检查选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityOptions {
    pub location_id: String,
    /// 允许部分满足: 只要有一行可行,整单即判可行
    pub allow_partial: bool,
    /// 现货不足时是否询问生产产能
    pub check_production: bool,
}

/// 可行行项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibleItem {
    pub product_id: String,
    pub quantity: i64,
    pub available_qty: i64,
    pub fulfillment_type: FulfillmentType,
    /// 生产补足数量 (fulfillment_type = MIXED 时 > 0)
    pub production_qty: i64,
    /// 生产交付周期 (天)
    pub production_lead_time_days: Option<i64>,
}

/// 不可行行项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfeasibleItem {
    pub product_id: String,
    pub quantity: i64,
    pub available_qty: i64,
    pub shortage: i64,
}

/// 替代建议 (给不可行行项的前端提示)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentSuggestion {
    pub product_id: String,
    /// 现货可立即满足的数量 (0 表示建议等待补货)
    pub suggested_quantity: i64,
    pub message: String,
}

/// 可行性报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub is_feasible: bool,
    pub feasible_items: Vec<FeasibleItem>,
    pub infeasible_items: Vec<InfeasibleItem>,
    pub suggestions: Vec<FulfillmentSuggestion>,
}

// ==========================================
// FeasibilityChecker - 可行性检查引擎
// ==========================================
pub struct FeasibilityChecker {
    availability: Arc<AvailabilityCalculator>,
    production_oracle: Arc<dyn ProductionCapacityOracle>,
}

impl FeasibilityChecker {
    /// 创建新的 FeasibilityChecker 实例
    pub fn new(
        availability: Arc<AvailabilityCalculator>,
        production_oracle: Arc<dyn ProductionCapacityOracle>,
    ) -> Self {
        Self {
            availability,
            production_oracle,
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 检查行项集合的可行性
    ///
    /// 判定规则 (逐行):
    /// 1) 可用量 >= 请求量 => 现货可行 (STOCK)
    /// 2) 否则若 check_production,询问生产产能缺口部分;
    ///    要求日期内可补产 => 混合可行 (MIXED,携带交付周期)
    /// 3) 否则不可行,附替代建议
    ///
    /// 整单可行 iff 无不可行行项,或 allow_partial 且至少一行可行
    #[instrument(skip(self, lines, options), fields(
        location_id = %options.location_id,
        line_count = lines.len()
    ))]
    pub fn check_feasibility(
        &self,
        lines: &[FeasibilityLine],
        options: &FeasibilityOptions,
    ) -> EngineResult<FeasibilityReport> {
        let mut feasible_items = Vec::new();
        let mut infeasible_items = Vec::new();
        let mut suggestions = Vec::new();

        for line in lines {
            let availability = self
                .availability
                .available(&line.product_id, &options.location_id)?;

            if availability.available >= line.quantity {
                feasible_items.push(FeasibleItem {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    available_qty: availability.available,
                    fulfillment_type: FulfillmentType::Stock,
                    production_qty: 0,
                    production_lead_time_days: None,
                });
                continue;
            }

            let shortage = line.quantity - availability.available;

            if options.check_production {
                let answer = self.production_oracle.can_produce(
                    &line.product_id,
                    shortage,
                    line.required_by,
                );
                if answer.can_produce {
                    feasible_items.push(FeasibleItem {
                        product_id: line.product_id.clone(),
                        quantity: line.quantity,
                        available_qty: availability.available,
                        fulfillment_type: FulfillmentType::Mixed,
                        production_qty: shortage,
                        production_lead_time_days: Some(answer.lead_time_days),
                    });
                    continue;
                }
            }

            infeasible_items.push(InfeasibleItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                available_qty: availability.available,
                shortage,
            });
            suggestions.push(Self::build_suggestion(&line.product_id, availability.available));
        }

        let is_feasible =
            infeasible_items.is_empty() || (options.allow_partial && !feasible_items.is_empty());

        Ok(FeasibilityReport {
            is_feasible,
            feasible_items,
            infeasible_items,
            suggestions,
        })
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 生成替代建议
    fn build_suggestion(product_id: &str, available: i64) -> FulfillmentSuggestion {
        if available > 0 {
            FulfillmentSuggestion {
                product_id: product_id.to_string(),
                suggested_quantity: available,
                message: format!("现货仅 {} 件,可降量下单或拆分多仓发货", available),
            }
        } else {
            FulfillmentSuggestion {
                product_id: product_id.to_string(),
                suggested_quantity: 0,
                message: "当前无现货,建议等待补货或更换发货仓".to_string(),
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
    use crate::domain::inventory::InventoryRecord;
    use crate::repository::inventory_repo::InventoryRecordRepository;
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::Mutex;

    /// 固定应答的生产产能桩
    struct StaticOracle {
        answer: CapacityAnswer,
    }

    impl ProductionCapacityOracle for StaticOracle {
        fn can_produce(&self, _: &str, _: i64, _: Option<NaiveDate>) -> CapacityAnswer {
            self.answer
        }
    }

    fn setup_checker(
        stock: &[(&str, i64)],
        oracle: Arc<dyn ProductionCapacityOracle>,
    ) -> FeasibilityChecker {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let repo = InventoryRecordRepository::new(conn.clone());
        for (product_id, physical) in stock {
            repo.upsert(&InventoryRecord {
                product_id: product_id.to_string(),
                location_id: "W1".to_string(),
                physical_qty: *physical,
                reserved_qty: 0,
                safety_stock: 0,
                revision: 0,
                updated_at: Utc::now(),
            })
            .unwrap();
        }

        FeasibilityChecker::new(
            Arc::new(AvailabilityCalculator::with_zero_signals(conn)),
            oracle,
        )
    }

    fn options(allow_partial: bool, check_production: bool) -> FeasibilityOptions {
        FeasibilityOptions {
            location_id: "W1".to_string(),
            allow_partial,
            check_production,
        }
    }

    fn line(product_id: &str, quantity: i64) -> FeasibilityLine {
        FeasibilityLine {
            product_id: product_id.to_string(),
            quantity,
            required_by: None,
        }
    }

    #[test]
    fn test_all_lines_stock_feasible() {
        let checker = setup_checker(&[("P001", 100), ("P002", 50)], Arc::new(NoProductionOracle));

        let report = checker
            .check_feasibility(&[line("P001", 60), line("P002", 50)], &options(false, false))
            .unwrap();

        assert!(report.is_feasible);
        assert_eq!(report.feasible_items.len(), 2);
        assert!(report.infeasible_items.is_empty());
        assert_eq!(report.feasible_items[0].fulfillment_type, FulfillmentType::Stock);
    }

    #[test]
    fn test_shortage_without_production_is_infeasible() {
        let checker = setup_checker(&[("P001", 30)], Arc::new(NoProductionOracle));

        let report = checker
            .check_feasibility(&[line("P001", 100)], &options(false, false))
            .unwrap();

        assert!(!report.is_feasible);
        assert_eq!(report.infeasible_items.len(), 1);
        assert_eq!(report.infeasible_items[0].shortage, 70);
        // 部分有货 => 建议降量
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].suggested_quantity, 30);
    }

    #[test]
    fn test_shortage_with_production_is_mixed() {
        let checker = setup_checker(
            &[("P001", 30)],
            Arc::new(StaticOracle {
                answer: CapacityAnswer {
                    can_produce: true,
                    lead_time_days: 5,
                },
            }),
        );

        let report = checker
            .check_feasibility(&[line("P001", 100)], &options(false, true))
            .unwrap();

        assert!(report.is_feasible);
        let item = &report.feasible_items[0];
        assert_eq!(item.fulfillment_type, FulfillmentType::Mixed);
        assert_eq!(item.production_qty, 70);
        assert_eq!(item.production_lead_time_days, Some(5));
    }

    #[test]
    fn test_production_declined_falls_back_to_infeasible() {
        let checker = setup_checker(
            &[("P001", 30)],
            Arc::new(StaticOracle {
                answer: CapacityAnswer {
                    can_produce: false,
                    lead_time_days: 0,
                },
            }),
        );

        let report = checker
            .check_feasibility(&[line("P001", 100)], &options(false, true))
            .unwrap();

        assert!(!report.is_feasible);
        assert_eq!(report.infeasible_items.len(), 1);
    }

    #[test]
    fn test_allow_partial_with_one_feasible_line() {
        let checker = setup_checker(&[("P001", 100), ("P002", 0)], Arc::new(NoProductionOracle));

        let lines = [line("P001", 60), line("P002", 10)];

        // 不允许部分满足 => 整单不可行
        let report = checker.check_feasibility(&lines, &options(false, false)).unwrap();
        assert!(!report.is_feasible);

        // 允许部分满足 => 整单可行
        let report = checker.check_feasibility(&lines, &options(true, false)).unwrap();
        assert!(report.is_feasible);
        assert_eq!(report.feasible_items.len(), 1);
        assert_eq!(report.infeasible_items.len(), 1);
        // 完全无货 => 建议等待补货
        assert_eq!(report.suggestions[0].suggested_quantity, 0);
    }

    #[test]
    fn test_dry_run_does_not_reserve() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = InventoryRecordRepository::new(conn.clone());
        repo.upsert(&InventoryRecord {
            product_id: "P001".to_string(),
            location_id: "W1".to_string(),
            physical_qty: 100,
            reserved_qty: 0,
            safety_stock: 0,
            revision: 0,
            updated_at: Utc::now(),
        })
        .unwrap();

        let checker = FeasibilityChecker::new(
            Arc::new(AvailabilityCalculator::with_zero_signals(conn.clone())),
            Arc::new(NoProductionOracle),
        );
        checker
            .check_feasibility(&[line("P001", 60)], &options(false, false))
            .unwrap();

        // 演练后 reserved_qty 纹丝不动
        let record = repo.find_by_key("P001", "W1").unwrap().unwrap();
        assert_eq!(record.reserved_qty, 0);
    }
}
