use crate::error::Result;
use crate::models::{AuditOutcome, AuditStatus};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

/// 批量审计报告
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub snapshot_version: u64,
    pub total: usize,
    pub passed: usize,
    pub review: usize,
    pub failed: usize,
    pub unresolvable: usize,
    pub expected_total: BigDecimal,
    pub actual_total: BigDecimal,
    pub variance_total: BigDecimal,
    pub outcomes: Vec<AuditOutcome>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// CSV 导出行
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    shipment_id: &'a str,
    status: &'a str,
    expected_total: String,
    actual_total: String,
    variance: String,
    variance_percent: String,
    confidence: String,
    rate_card_id: &'a str,
    unaudited_lines: usize,
    error: String,
}

impl BatchReport {
    /// 汇总各票结果 (金额只统计已审计的票)
    pub fn from_outcomes(
        snapshot_version: u64,
        outcomes: Vec<AuditOutcome>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let mut report = Self {
            snapshot_version,
            total: outcomes.len(),
            passed: 0,
            review: 0,
            failed: 0,
            unresolvable: 0,
            expected_total: BigDecimal::zero(),
            actual_total: BigDecimal::zero(),
            variance_total: BigDecimal::zero(),
            outcomes: Vec::new(),
            started_at,
            duration_ms,
        };

        for outcome in &outcomes {
            match outcome {
                AuditOutcome::Audited(v) => {
                    match v.status {
                        AuditStatus::Pass => report.passed += 1,
                        AuditStatus::Review => report.review += 1,
                        AuditStatus::Fail => report.failed += 1,
                    }
                    report.expected_total = &report.expected_total + &v.expected_total;
                    report.actual_total = &report.actual_total + &v.actual_total;
                    report.variance_total = &report.variance_total + &v.variance;
                }
                AuditOutcome::Unresolvable { .. } => report.unresolvable += 1,
            }
        }

        report.outcomes = outcomes;
        report
    }

    /// 每票一行导出 CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for outcome in &self.outcomes {
            let row = match outcome {
                AuditOutcome::Audited(v) => CsvRow {
                    shipment_id: &v.shipment_id,
                    status: v.status.as_str(),
                    expected_total: v.expected_total.to_string(),
                    actual_total: v.actual_total.to_string(),
                    variance: v.variance.to_string(),
                    variance_percent: v
                        .variance_percent
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                    confidence: format!("{:?}", v.confidence).to_uppercase(),
                    rate_card_id: &v.rate_card_id,
                    unaudited_lines: v.unaudited.len(),
                    error: String::new(),
                },
                AuditOutcome::Unresolvable { shipment_id, error } => CsvRow {
                    shipment_id,
                    status: "UNRESOLVABLE",
                    expected_total: String::new(),
                    actual_total: String::new(),
                    variance: String::new(),
                    variance_percent: String::new(),
                    confidence: String::new(),
                    rate_card_id: "",
                    unaudited_lines: 0,
                    error: error.to_string(),
                },
            };
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
