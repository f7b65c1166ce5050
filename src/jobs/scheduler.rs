// ==========================================
// 农产品配送系统 - 定时任务调度器
// ==========================================
// 职责: 以固定间隔驱动清理任务 (小时级) 与对账任务 (天级)
// 说明: 任务体是同步 rusqlite 代码,放 spawn_blocking 执行;
//       循环永不 panic,单轮失败记日志后照常进入下一轮
// ==========================================

use crate::jobs::cleanup::CleanupJob;
use crate::jobs::reconciliation::ReconciliationJob;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ==========================================
// JobScheduler - 定时任务调度器
// ==========================================
pub struct JobScheduler {
    cleanup_job: Arc<CleanupJob>,
    reconciliation_job: Arc<ReconciliationJob>,
    cleanup_interval: Duration,
    reconcile_interval: Duration,
}

impl JobScheduler {
    /// 创建新的 JobScheduler 实例
    ///
    /// # 参数
    /// - `cleanup_interval`: 清理任务间隔 (默认 1 小时,见配置)
    /// - `reconcile_interval`: 对账任务间隔 (默认 1 天,见配置)
    pub fn new(
        cleanup_job: Arc<CleanupJob>,
        reconciliation_job: Arc<ReconciliationJob>,
        cleanup_interval: Duration,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            cleanup_job,
            reconciliation_job,
            cleanup_interval,
            reconcile_interval,
        }
    }

    /// 启动两条定时循环
    ///
    /// 返回 JoinHandle 供调用方在停机时 abort
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![
            Self::spawn_cleanup_loop(self.cleanup_job.clone(), self.cleanup_interval),
            Self::spawn_reconcile_loop(self.reconciliation_job.clone(), self.reconcile_interval),
        ]
    }

    fn spawn_cleanup_loop(job: Arc<CleanupJob>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 首次 tick 立即返回,吃掉它,按整间隔起跑
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let job = job.clone();
                match tokio::task::spawn_blocking(move || job.run()).await {
                    Ok(Ok(report)) => {
                        tracing::info!(
                            "定时清理: 过期 {} 条,通知 {} 条",
                            report.expired,
                            report.notified
                        );
                    }
                    Ok(Err(e)) => tracing::error!("定时清理失败: {}", e),
                    Err(e) => tracing::error!("定时清理执行线程异常: {}", e),
                }
            }
        })
    }

    fn spawn_reconcile_loop(job: Arc<ReconciliationJob>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let job = job.clone();
                match tokio::task::spawn_blocking(move || job.run()).await {
                    Ok(Ok(report)) => {
                        tracing::info!(
                            "定时对账: run_id={}, 核对 {} 条,差异 {} 条",
                            report.run_id,
                            report.checked,
                            report.discrepancies.len()
                        );
                    }
                    Ok(Err(e)) => tracing::error!("定时对账失败: {}", e),
                    Err(e) => tracing::error!("定时对账执行线程异常: {}", e),
                }
            }
        })
    }
}
