use crate::models::{AuditOutcome, Shipment};
use crate::service::engine::RateEngine;
use crate::service::variance::{evaluate, TolerancePolicy};
use crate::store::RateCardSnapshot;
use std::sync::Arc;

/// 单票审计: 计算预期 -> 差异分析
///
/// 整个审计过程绑定调用方传入的快照，期间发布的新版本不影响结果。
#[derive(Debug, Clone, Default)]
pub struct Auditor {
    policy: TolerancePolicy,
}

impl Auditor {
    pub fn new(policy: TolerancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TolerancePolicy {
        &self.policy
    }

    pub fn audit(&self, snapshot: &Arc<RateCardSnapshot>, shipment: &Shipment) -> AuditOutcome {
        let engine = RateEngine::new(snapshot.clone()).with_policy(&self.policy);

        match engine.compute_expected(shipment) {
            Ok(expected) => AuditOutcome::Audited(evaluate(&expected, &shipment.charges, &self.policy)),
            Err(error) => {
                tracing::warn!("[Audit] 运单 {} 无法解析: {}", shipment.id, error);
                AuditOutcome::Unresolvable {
                    shipment_id: shipment.id.clone(),
                    error,
                }
            }
        }
    }
}
