use crate::error::Result;
use crate::models::{AuditOutcome, BatchReport, Shipment};
use crate::service::auditor::Auditor;
use crate::service::variance::TolerancePolicy;
use crate::store::RateCardSnapshot;
use chrono::Utc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 进度日志间隔 (票)
const PROGRESS_EVERY: usize = 100;

/// 批量审计 - 固定大小的 rayon 线程池，各票互不影响
pub struct BatchAuditor {
    pool: rayon::ThreadPool,
    auditor: Auditor,
}

impl BatchAuditor {
    pub fn new(workers: usize, policy: TolerancePolicy) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("audit-worker-{}", i))
            .build()?;
        Ok(Self {
            pool,
            auditor: Auditor::new(policy),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// 整批绑定同一快照; 结果顺序与输入一致
    pub fn run(&self, snapshot: Arc<RateCardSnapshot>, shipments: &[Shipment]) -> BatchReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        let total = shipments.len();
        let done = AtomicUsize::new(0);

        tracing::info!(
            "[Batch] 开始批量审计: {} 票, 快照 v{}, {} 个工作线程",
            total,
            snapshot.version,
            self.workers()
        );

        let outcomes: Vec<AuditOutcome> = self.pool.install(|| {
            shipments
                .par_iter()
                .map(|shipment| {
                    let outcome = self.auditor.audit(&snapshot, shipment);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if finished % PROGRESS_EVERY == 0 {
                        tracing::info!("[Batch] 进度: {}/{}", finished, total);
                    }
                    outcome
                })
                .collect()
        });

        let report = BatchReport::from_outcomes(
            snapshot.version,
            outcomes,
            started_at,
            timer.elapsed().as_millis() as u64,
        );

        tracing::info!(
            "[Batch] 审计完成: 总数 {}, 通过 {}, 复核 {}, 不通过 {}, 无法解析 {}, 差异合计 {} ({}ms)",
            report.total,
            report.passed,
            report.review,
            report.failed,
            report.unresolvable,
            report.variance_total,
            report.duration_ms
        );
        report
    }
}
