use crate::error::ResolutionError;
use crate::models::{Confidence, ServiceDirection, TransportMode, ZoneMatch};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 基础运费代码
pub const FREIGHT_CODE: &str = "FRT";

/// 计价策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingStrategy {
    ZoneTiered,
    ZoneMatrix,
    Air,
    OceanFcl,
    OceanLcl,
}

impl PricingStrategy {
    /// (运输方式, 方向) -> 计价策略
    pub fn select(mode: TransportMode, direction: ServiceDirection) -> Result<Self, ResolutionError> {
        use ServiceDirection as D;
        use TransportMode as M;
        match (mode, direction) {
            (M::Express, D::Export | D::Import) => Ok(PricingStrategy::ZoneTiered),
            (M::Express, D::ThirdParty | D::Domestic) => Ok(PricingStrategy::ZoneMatrix),
            (M::Domestic, D::Domestic) => Ok(PricingStrategy::ZoneMatrix),
            (M::Air, _) => Ok(PricingStrategy::Air),
            (M::OceanFcl, _) => Ok(PricingStrategy::OceanFcl),
            (M::OceanLcl, _) => Ok(PricingStrategy::OceanLcl),
            _ => Err(ResolutionError::UnsupportedCombination { mode, direction }),
        }
    }

    /// 费率卡可否以本策略服务该运输方式/方向 (方向为空即兜底卡)
    pub fn serves(&self, mode: TransportMode, direction: Option<ServiceDirection>) -> bool {
        match direction {
            Some(direction) => Self::select(mode, direction).as_ref() == Ok(self),
            None => [
                ServiceDirection::Export,
                ServiceDirection::Import,
                ServiceDirection::ThirdParty,
                ServiceDirection::Domestic,
            ]
            .into_iter()
            .any(|d| Self::select(mode, d).as_ref() == Ok(self)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingStrategy::ZoneTiered => "ZONE_TIERED",
            PricingStrategy::ZoneMatrix => "ZONE_MATRIX",
            PricingStrategy::Air => "AIR",
            PricingStrategy::OceanFcl => "OCEAN_FCL",
            PricingStrategy::OceanLcl => "OCEAN_LCL",
        }
    }
}

/// 预期费用行来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    Freight,
    Overage,
    Fixed,
    ServiceCharge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedLine {
    pub code: String,
    pub description: String,
    pub amount: BigDecimal,
    /// 计算依据 (如 "12.0kg @ zone 3")
    pub basis: String,
    pub kind: LineKind,
}

/// 可恢复的单行问题 - 计入 unaudited，不影响整票判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OmissionReason {
    UnknownServiceCode,
    AmbiguousServiceCode,
    MissingWeight,
    CurrencyMismatch,
    UnpricedCharge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOmission {
    pub key: String,
    pub amount: BigDecimal,
    pub reason: OmissionReason,
}

/// 预期费用明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedCharges {
    pub shipment_id: String,
    pub rate_card_id: String,
    pub rate_card_version: u32,
    pub snapshot_version: u64,
    pub strategy: PricingStrategy,
    pub currency: String,
    pub lines: Vec<ExpectedLine>,
    pub total: BigDecimal,
    pub confidence: Confidence,
    pub origin_match: Option<ZoneMatch>,
    pub destination_match: Option<ZoneMatch>,
    pub omissions: Vec<LineOmission>,
}

impl ExpectedCharges {
    pub fn omission(&self, key: &str) -> Option<&LineOmission> {
        self.omissions.iter().find(|o| o.key == key)
    }
}

/// 审计结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Pass,
    Review,
    Fail,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pass => "PASS",
            AuditStatus::Review => "REVIEW",
            AuditStatus::Fail => "FAIL",
        }
    }
}

/// 单项差异 (诊断用，不决定整票结论)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineVariance {
    pub code: String,
    pub description: String,
    pub expected: BigDecimal,
    pub actual: BigDecimal,
    pub variance: BigDecimal,
    pub variance_percent: Option<BigDecimal>,
    pub status: AuditStatus,
}

/// 未审计的发票行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnauditedLine {
    pub key: String,
    pub amount: BigDecimal,
    pub reason: OmissionReason,
}

/// 单票审计结果 (生成后不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub shipment_id: String,
    pub status: AuditStatus,
    pub expected_total: BigDecimal,
    pub actual_total: BigDecimal,
    pub variance: BigDecimal,
    pub variance_percent: Option<BigDecimal>,
    /// 直通代码按发票金额认可的合计，不计入 expected/actual
    pub pass_through_total: BigDecimal,
    /// 预期运费没有可审计的发票行 (整票至少 REVIEW)
    pub freight_unmatched: bool,
    pub lines: Vec<LineVariance>,
    pub unaudited: Vec<UnauditedLine>,
    pub confidence: Confidence,
    pub rate_card_id: String,
    pub snapshot_version: u64,
    pub audited_at: DateTime<Utc>,
}

/// 单票结果: 已审计 / 无法解析
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Audited(AuditVerdict),
    Unresolvable {
        shipment_id: String,
        error: ResolutionError,
    },
}

impl AuditOutcome {
    pub fn shipment_id(&self) -> &str {
        match self {
            AuditOutcome::Audited(v) => &v.shipment_id,
            AuditOutcome::Unresolvable { shipment_id, .. } => shipment_id,
        }
    }

    pub fn status(&self) -> Option<AuditStatus> {
        match self {
            AuditOutcome::Audited(v) => Some(v.status),
            AuditOutcome::Unresolvable { .. } => None,
        }
    }

    pub fn verdict(&self) -> Option<&AuditVerdict> {
        match self {
            AuditOutcome::Audited(v) => Some(v),
            AuditOutcome::Unresolvable { .. } => None,
        }
    }
}
