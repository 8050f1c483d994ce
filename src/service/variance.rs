use crate::error::ConfigError;
use crate::models::amount::{money, ratio_percent, total};
use crate::models::{
    normalize_text, AuditStatus, AuditVerdict, ChargeLine, ExpectedCharges, LineVariance,
    OmissionReason, UnauditedLine, FREIGHT_CODE,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use indexmap::{IndexMap, IndexSet};

/// 容差策略
#[derive(Debug, Clone, PartialEq)]
pub struct TolerancePolicy {
    pub pass_max_percent: BigDecimal,
    pub review_max_percent: BigDecimal,
    /// 无预期金额时按发票金额认可的代码 (如燃油附加费、关税)
    pub pass_through_codes: Vec<String>,
    /// 视为基础运费的发票代码
    pub freight_codes: Vec<String>,
    /// 无代码发票行的运费描述短语
    pub freight_phrases: Vec<String>,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            pass_max_percent: BigDecimal::from(5),
            review_max_percent: BigDecimal::from(15),
            pass_through_codes: vec!["FSC".to_string(), "DTX".to_string()],
            freight_codes: vec![FREIGHT_CODE.to_string()],
            freight_phrases: vec!["EXPRESS WORLDWIDE".to_string(), "EXPRESS DOMESTIC".to_string()],
        }
    }
}

impl TolerancePolicy {
    pub fn new(
        pass_max_percent: BigDecimal,
        review_max_percent: BigDecimal,
        pass_through_codes: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if pass_max_percent < BigDecimal::zero() || pass_max_percent > review_max_percent {
            return Err(ConfigError::InvalidThresholds {
                pass: pass_max_percent,
                review: review_max_percent,
            });
        }
        Ok(Self {
            pass_max_percent,
            review_max_percent,
            pass_through_codes: pass_through_codes.iter().map(|c| normalize_text(c)).collect(),
            ..Self::default()
        })
    }

    pub fn with_freight(mut self, codes: &[String], phrases: &[String]) -> Self {
        self.freight_codes = codes.iter().map(|c| normalize_text(c)).collect();
        self.freight_phrases = phrases
            .iter()
            .map(|p| normalize_text(p))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn is_pass_through(&self, key: &str) -> bool {
        self.pass_through_codes.iter().any(|c| c == key)
    }

    /// 发票行的审计键: 运费行统一归到 FRT，其余同 ChargeLine::key
    ///
    /// 描述短语只用于无代码的行，带代码的行按代码判断。
    pub fn audit_key(&self, line: &ChargeLine) -> String {
        let key = line.key();
        let freight = if line.code.trim().is_empty() {
            self.freight_phrases.iter().any(|p| key.contains(p.as_str()))
        } else {
            key == FREIGHT_CODE || self.freight_codes.iter().any(|c| *c == key)
        };
        if freight {
            FREIGHT_CODE.to_string()
        } else {
            key
        }
    }

    /// 差异分级; 少收 (负差异) 一律通过
    ///
    /// 阈值比较使用未舍入的百分比，返回值舍入到两位小数。
    pub fn classify(&self, variance: &BigDecimal, expected: &BigDecimal) -> (AuditStatus, Option<BigDecimal>) {
        let percent = ratio_percent(variance, expected);
        let shown = percent.as_ref().map(|p| p.round(2));
        if *variance <= BigDecimal::zero() {
            let shown = shown.or_else(|| variance.is_zero().then(BigDecimal::zero));
            return (AuditStatus::Pass, shown);
        }
        let status = match &percent {
            None => AuditStatus::Fail,
            Some(p) if *p <= self.pass_max_percent => AuditStatus::Pass,
            Some(p) if *p <= self.review_max_percent => AuditStatus::Review,
            Some(_) => AuditStatus::Fail,
        };
        (status, shown)
    }
}

struct Grouped {
    amount: BigDecimal,
    description: String,
}

fn add_to(groups: &mut IndexMap<String, Grouped>, key: String, amount: &BigDecimal, description: &str) {
    let entry = groups.entry(key).or_insert_with(|| Grouped {
        amount: BigDecimal::zero(),
        description: description.to_string(),
    });
    entry.amount = &entry.amount + amount;
}

/// 对比预期与发票行，生成审计结论
///
/// 已省略或币种不符的行不参与两侧合计: 某键在发票侧没有可审计的行时，预期侧同键也剔除。
/// 预期有而发票无的行按 0.00 对比。直通行单独合计，不进入差异百分比的分母。
/// 预期运费找不到可审计的发票行时整票至少为 REVIEW。
pub fn evaluate(expected: &ExpectedCharges, actual: &[ChargeLine], policy: &TolerancePolicy) -> AuditVerdict {
    let currency = normalize_text(&expected.currency);
    let mut unaudited = Vec::new();
    let mut dropped: IndexSet<String> = IndexSet::new();
    let mut actual_by_key: IndexMap<String, Grouped> = IndexMap::new();

    for line in actual {
        let key = policy.audit_key(line);
        let reason = if normalize_text(&line.currency) != currency {
            Some(OmissionReason::CurrencyMismatch)
        } else {
            expected.omission(&key).map(|o| o.reason)
        };
        if let Some(reason) = reason {
            dropped.insert(key.clone());
            unaudited.push(UnauditedLine {
                key,
                amount: line.amount.clone(),
                reason,
            });
            continue;
        }
        add_to(&mut actual_by_key, key, &line.amount, &line.description);
    }

    let mut expected_by_key: IndexMap<String, Grouped> = IndexMap::new();
    for line in &expected.lines {
        add_to(&mut expected_by_key, normalize_text(&line.code), &line.amount, &line.description);
    }

    let mut lines = Vec::new();
    let mut freight_unmatched = false;
    for (code, exp) in expected_by_key {
        let is_freight = code == FREIGHT_CODE;
        if dropped.contains(&code) && !actual_by_key.contains_key(&code) {
            freight_unmatched |= is_freight;
            continue;
        }
        let line = match actual_by_key.shift_remove(&code) {
            Some(act) => line_variance(code, exp.description, money(&exp.amount), act.amount, policy),
            None => {
                let zero = BigDecimal::zero();
                let mut line = line_variance(code, exp.description, money(&exp.amount), zero, policy);
                if is_freight {
                    freight_unmatched = true;
                    line.status = AuditStatus::Review;
                }
                line
            }
        };
        lines.push(line);
    }

    let mut pass_through = Vec::new();
    for (key, act) in actual_by_key {
        if policy.is_pass_through(&key) {
            let amount = act.amount;
            pass_through.push(line_variance(key, act.description, amount.clone(), amount, policy));
        } else {
            unaudited.push(UnauditedLine {
                key,
                amount: act.amount,
                reason: OmissionReason::UnknownServiceCode,
            });
        }
    }

    let expected_total = money(&total(lines.iter().map(|l| &l.expected)));
    let actual_total = money(&total(lines.iter().map(|l| &l.actual)));
    let pass_through_total = money(&total(pass_through.iter().map(|l| &l.actual)));
    let variance = money(&(&actual_total - &expected_total));
    let (mut status, variance_percent) = policy.classify(&variance, &expected_total);
    lines.extend(pass_through);

    if freight_unmatched && status == AuditStatus::Pass {
        tracing::debug!("[Variance] {} 预期运费无可审计的发票行，转人工复核", expected.shipment_id);
        status = AuditStatus::Review;
    }
    if !unaudited.is_empty() {
        tracing::debug!(
            "[Variance] {} 有 {} 行未审计",
            expected.shipment_id,
            unaudited.len()
        );
    }

    AuditVerdict {
        shipment_id: expected.shipment_id.clone(),
        status,
        expected_total,
        actual_total,
        variance,
        variance_percent,
        pass_through_total,
        freight_unmatched,
        lines,
        unaudited,
        confidence: expected.confidence,
        rate_card_id: expected.rate_card_id.clone(),
        snapshot_version: expected.snapshot_version,
        audited_at: Utc::now(),
    }
}

fn line_variance(
    code: String,
    description: String,
    expected: BigDecimal,
    actual: BigDecimal,
    policy: &TolerancePolicy,
) -> LineVariance {
    let variance = money(&(&actual - &expected));
    let (status, variance_percent) = policy.classify(&variance, &expected);
    LineVariance {
        code,
        description,
        expected,
        actual,
        variance,
        variance_percent,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Confidence, ExpectedLine, LineKind, LineOmission, PricingStrategy, FREIGHT_CODE,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn expected(lines: &[(&str, &str)]) -> ExpectedCharges {
        let lines: Vec<ExpectedLine> = lines
            .iter()
            .map(|(code, amount)| ExpectedLine {
                code: code.to_string(),
                description: String::new(),
                amount: d(amount),
                basis: String::new(),
                kind: LineKind::Freight,
            })
            .collect();
        ExpectedCharges {
            shipment_id: "S1".to_string(),
            rate_card_id: "card".to_string(),
            rate_card_version: 1,
            snapshot_version: 1,
            strategy: PricingStrategy::ZoneTiered,
            currency: "AUD".to_string(),
            total: total(lines.iter().map(|l| &l.amount)),
            lines,
            confidence: Confidence::High,
            origin_match: None,
            destination_match: None,
            omissions: Vec::new(),
        }
    }

    fn charge(code: &str, amount: &str) -> ChargeLine {
        ChargeLine::new(code, d(amount), "AUD")
    }

    #[rstest]
    #[case("16.47", "18.00", AuditStatus::Review, Some("9.29"))]
    #[case("100.00", "105.00", AuditStatus::Pass, Some("5.00"))]
    #[case("100.00", "115.00", AuditStatus::Review, Some("15.00"))]
    #[case("100.00", "115.01", AuditStatus::Fail, Some("15.01"))]
    #[case("2850.00", "2645.00", AuditStatus::Pass, Some("-7.19"))]
    #[case("1000.00", "1050.04", AuditStatus::Review, Some("5.00"))]
    #[case("1000.00", "1150.04", AuditStatus::Fail, Some("15.00"))]
    fn freight_variance_is_classified(
        #[case] exp: &str,
        #[case] act: &str,
        #[case] status: AuditStatus,
        #[case] percent: Option<&str>,
    ) {
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, exp)]),
            &[charge("FRT", act)],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.status, status);
        assert_eq!(verdict.variance_percent, percent.map(d));
    }

    #[test]
    fn zero_expected_with_positive_variance_fails_without_percent() {
        let verdict = evaluate(
            &expected(&[("OO", "0.00")]),
            &[charge("OO", "12.00")],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.status, AuditStatus::Fail);
        assert_eq!(verdict.variance_percent, None);
    }

    #[test]
    fn missing_actual_line_compares_against_zero() {
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, "50.00"), ("OO", "10.00")]),
            &[charge("FRT", "50.00")],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.status, AuditStatus::Pass);
        assert_eq!(verdict.variance, d("-10.00"));
        let oo = verdict.lines.iter().find(|l| l.code == "OO").unwrap();
        assert_eq!(oo.actual, BigDecimal::zero());
    }

    #[test]
    fn pass_through_lines_are_accepted_as_billed() {
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, "100.00")]),
            &[charge("FRT", "100.00"), charge("fsc", "22.50"), charge("ZZ", "9.00")],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.status, AuditStatus::Pass);
        assert_eq!(verdict.expected_total, d("100.00"));
        assert_eq!(verdict.actual_total, d("100.00"));
        assert_eq!(verdict.pass_through_total, d("22.50"));
        assert!(verdict.lines.iter().any(|l| l.code == "FSC" && l.actual == d("22.50")));
        assert_eq!(verdict.unaudited.len(), 1);
        assert_eq!(verdict.unaudited[0].key, "ZZ");
        assert_eq!(verdict.unaudited[0].reason, OmissionReason::UnknownServiceCode);
    }

    #[test]
    fn omitted_and_foreign_currency_lines_leave_totals() {
        let mut exp = expected(&[(FREIGHT_CODE, "100.00")]);
        exp.omissions.push(LineOmission {
            key: "WK".to_string(),
            amount: d("500.00"),
            reason: OmissionReason::AmbiguousServiceCode,
        });
        let mut usd = charge("FRT", "40.00");
        usd.currency = "USD".to_string();

        let verdict = evaluate(
            &exp,
            &[charge("FRT", "100.00"), charge("WK", "500.00"), usd],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.actual_total, d("100.00"));
        assert_eq!(verdict.variance, d("0.00"));
        let reasons: Vec<OmissionReason> = verdict.unaudited.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![OmissionReason::AmbiguousServiceCode, OmissionReason::CurrencyMismatch]
        );
    }

    #[test]
    fn pass_through_amounts_stay_out_of_the_percent() {
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, "16.47")]),
            &[charge("FRT", "19.50"), charge("FSC", "10.00")],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.expected_total, d("16.47"));
        assert_eq!(verdict.actual_total, d("19.50"));
        assert_eq!(verdict.variance_percent, Some(d("18.40")));
        assert_eq!(verdict.status, AuditStatus::Fail);
        assert_eq!(verdict.pass_through_total, d("10.00"));
    }

    #[test]
    fn freight_billed_in_other_currency_is_not_an_undercharge() {
        let mut usd = charge("FRT", "500.00");
        usd.currency = "USD".to_string();
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, "16.47")]),
            &[usd],
            &TolerancePolicy::default(),
        );
        assert_eq!(verdict.expected_total, d("0.00"));
        assert_eq!(verdict.actual_total, d("0.00"));
        assert!(verdict.lines.is_empty());
        assert!(verdict.freight_unmatched);
        assert_eq!(verdict.status, AuditStatus::Review);
        assert_eq!(verdict.unaudited[0].reason, OmissionReason::CurrencyMismatch);
    }

    #[test]
    fn missing_freight_line_needs_review() {
        let verdict = evaluate(
            &expected(&[(FREIGHT_CODE, "16.47"), ("OO", "40.00")]),
            &[charge("OO", "40.00")],
            &TolerancePolicy::default(),
        );
        assert!(verdict.freight_unmatched);
        assert_eq!(verdict.status, AuditStatus::Review);
        let frt = verdict.lines.iter().find(|l| l.code == FREIGHT_CODE).unwrap();
        assert_eq!(frt.actual, BigDecimal::zero());
        assert_eq!(frt.status, AuditStatus::Review);
    }

    #[rstest]
    #[case("FRT", "", true)]
    #[case("wpx", "", true)]
    #[case("", "EXPRESS WORLDWIDE NONDOC", true)]
    #[case("", "express  domestic 12:00", true)]
    #[case("OO", "Express Worldwide remote area", false)]
    #[case("", "Remote Area Delivery", false)]
    fn freight_lines_are_identified_by_code_or_description(
        #[case] code: &str,
        #[case] description: &str,
        #[case] freight: bool,
    ) {
        let policy = TolerancePolicy::default().with_freight(
            &["FRT".to_string(), "wpx".to_string()],
            &TolerancePolicy::default().freight_phrases,
        );
        let mut line = charge(code, "1.00");
        line.description = description.to_string();
        assert_eq!(policy.audit_key(&line) == FREIGHT_CODE, freight);
    }

    #[test]
    fn thresholds_are_validated() {
        assert!(matches!(
            TolerancePolicy::new(d("20"), d("15"), vec![]),
            Err(ConfigError::InvalidThresholds { .. })
        ));
        assert!(TolerancePolicy::new(d("-1"), d("15"), vec![]).is_err());
        assert!(TolerancePolicy::new(d("5"), d("5"), vec!["fsc".into()]).unwrap().is_pass_through("FSC"));
    }
}
