use crate::error::ConfigError;
use crate::models::{normalize_text, OmissionReason, TransportMode};
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 描述关键词 -> 服务代码 (名称匹配失败时使用，最长短语优先)
const DESCRIPTION_PHRASES: &[(&str, &str)] = &[
    ("CHANGE OF BILLING", "KA"),
    ("OVER LENGTH", "KA"),
    ("OVERWEIGHT", "KA"),
    ("DIRECT SIGNATURE", "SF"),
    ("ADULT SIGNATURE", "SD"),
    ("SIGNATURE", "SF"),
    ("REMOTE AREA PICKUP", "OB"),
    ("REMOTE AREA DELIVERY", "OO"),
    ("REMOTE AREA", "OO"),
    ("BONDED STORAGE", "WK"),
    ("EXPORT DECLARATION", "WO"),
    ("NEUTRAL DELIVERY", "NN"),
    ("NON CONVEYABLE PIECE", "YO"),
    ("OVERWEIGHT PIECE", "YY"),
    ("OVERSIZE PIECE", "YB"),
    ("SATURDAY DELIVERY", "AA"),
    ("SATURDAY PICKUP", "AB"),
    ("RESIDENTIAL ADDRESS", "TK"),
    ("ADDRESS CORRECTION", "MA"),
];

/// 适用范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Applicability {
    All,
    Domestic,
    International,
    Products(Vec<String>),
}

impl Default for Applicability {
    fn default() -> Self {
        Applicability::All
    }
}

impl Applicability {
    pub fn is_specific(&self) -> bool {
        !matches!(self, Applicability::All)
    }

    pub fn applies(&self, ctx: &ChargeContext) -> bool {
        match self {
            Applicability::All => true,
            Applicability::Domestic => ctx.domestic,
            Applicability::International => !ctx.domestic,
            Applicability::Products(products) => {
                let Some(product) = ctx.product.as_deref().map(normalize_text) else {
                    return false;
                };
                products
                    .iter()
                    .map(|p| normalize_text(p))
                    .any(|p| !p.is_empty() && product.contains(&p))
            }
        }
    }
}

/// 服务费计算形态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeShape {
    Flat { amount: BigDecimal },
    PercentOfBase { percent: BigDecimal },
    PerKg { rate: BigDecimal },
}

/// 服务费条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceChargeEntry {
    pub code: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub name: String,
    #[serde(default)]
    pub applicability: Applicability,
    pub shape: ChargeShape,
    #[serde(default)]
    pub minimum: Option<BigDecimal>,
    /// 仅当重量超过该值时收取
    #[serde(default)]
    pub applies_above_kg: Option<BigDecimal>,
    #[serde(default)]
    pub manual_override: bool,
}

impl ServiceChargeEntry {
    pub fn base_code(&self) -> String {
        normalize_text(&self.code)
    }

    /// 唯一键: 代码 + 变体后缀
    pub fn key(&self) -> String {
        match self.variant.as_deref().map(normalize_text) {
            Some(variant) if !variant.is_empty() => format!("{}-{}", self.base_code(), variant),
            _ => self.base_code(),
        }
    }

    fn is_base(&self) -> bool {
        self.key() == self.base_code()
    }

    fn has_negative_amount(&self) -> bool {
        let zero = BigDecimal::zero();
        let shape_negative = match &self.shape {
            ChargeShape::Flat { amount } => *amount < zero,
            ChargeShape::PercentOfBase { percent } => *percent < zero,
            ChargeShape::PerKg { rate } => *rate < zero,
        };
        shape_negative || self.minimum.as_ref().map_or(false, |m| *m < zero)
    }
}

/// 服务费适用上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeContext {
    pub domestic: bool,
    pub product: Option<String>,
}

/// 某运输方式的服务费表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceChargeSchedule {
    pub mode: TransportMode,
    #[serde(default)]
    pub entries: Vec<ServiceChargeEntry>,
}

impl ServiceChargeSchedule {
    pub fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = HashSet::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let key = entry.key();
            if !keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateServiceCharge {
                    mode: self.mode,
                    key,
                });
            }
            if entry.has_negative_amount() {
                return Err(ConfigError::NegativeServiceCharge {
                    mode: self.mode,
                    key,
                });
            }
            let clash = self.entries[..i].iter().any(|other| {
                other.base_code() == entry.base_code() && other.applicability == entry.applicability
            });
            if clash {
                return Err(ConfigError::AmbiguousServiceCharge {
                    mode: self.mode,
                    code: entry.base_code(),
                });
            }
        }
        Ok(())
    }

    pub fn contains_code(&self, code: &str) -> bool {
        let code = normalize_text(code);
        self.entries.iter().any(|e| e.base_code() == code)
    }

    /// 按上下文选取条目: 特定变体 > ALL 变体 > 基础条目
    pub fn resolve(&self, code: &str, ctx: &ChargeContext) -> Result<&ServiceChargeEntry, OmissionReason> {
        let code = normalize_text(code);
        let family: Vec<&ServiceChargeEntry> =
            self.entries.iter().filter(|e| e.base_code() == code).collect();
        if family.is_empty() {
            return Err(OmissionReason::UnknownServiceCode);
        }

        let specific: Vec<&ServiceChargeEntry> = family
            .iter()
            .copied()
            .filter(|e| e.applicability.is_specific() && e.applicability.applies(ctx))
            .collect();
        match specific.as_slice() {
            [only] => return Ok(*only),
            [_, _, ..] => return Err(OmissionReason::AmbiguousServiceCode),
            [] => {}
        }

        family
            .iter()
            .copied()
            .find(|e| !e.is_base() && e.applicability == Applicability::All)
            .or_else(|| {
                family
                    .iter()
                    .copied()
                    .find(|e| e.is_base() && e.applicability == Applicability::All)
            })
            .ok_or(OmissionReason::UnpricedCharge)
    }

    /// 通过描述推断服务代码
    pub fn match_description(&self, description: &str) -> Option<String> {
        let desc = normalize_text(description);
        if desc.is_empty() {
            return None;
        }

        let named: Vec<(String, &ServiceChargeEntry)> = self
            .entries
            .iter()
            .map(|e| (normalize_text(&e.name), e))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        if let Some((_, e)) = named.iter().find(|(name, _)| *name == desc) {
            return Some(e.base_code());
        }
        if let Some((_, e)) = longest(named.iter().filter(|(name, _)| desc.contains(name.as_str()))) {
            return Some(e.base_code());
        }
        if let Some((_, e)) = named.iter().find(|(name, _)| name.contains(desc.as_str())) {
            return Some(e.base_code());
        }

        DESCRIPTION_PHRASES
            .iter()
            .filter(|(phrase, _)| desc.contains(phrase))
            .fold(None::<&(&str, &str)>, |best, cand| match best {
                Some(b) if b.0.len() >= cand.0.len() => Some(b),
                _ => Some(cand),
            })
            .map(|(_, code)| code.to_string())
            .filter(|code| self.contains_code(code))
    }
}

fn longest<'a, 'b>(
    candidates: impl Iterator<Item = &'a (String, &'b ServiceChargeEntry)>,
) -> Option<&'a (String, &'b ServiceChargeEntry)>
where
    'b: 'a,
{
    candidates.fold(None, |best, cand| match best {
        Some(b) if b.0.len() >= cand.0.len() => Some(b),
        _ => Some(cand),
    })
}
