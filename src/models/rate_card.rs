use crate::error::ConfigError;
use crate::models::amount::{ceil_to_step, next_step_above};
use crate::models::{ContainerType, PricingStrategy, ServiceDirection, TransportMode};
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn default_step() -> BigDecimal {
    BigDecimal::from_str("0.5").unwrap_or_else(|_| BigDecimal::from(1))
}

/// 重量区间 (闭区间)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket<V> {
    pub weight_from: BigDecimal,
    pub weight_to: BigDecimal,
    #[serde(alias = "prices", alias = "rates", alias = "rate")]
    pub value: V,
}

impl<V> Bracket<V> {
    pub fn contains(&self, weight: &BigDecimal) -> bool {
        &self.weight_from <= weight && weight <= &self.weight_to
    }
}

/// 通用重量分段表: 先按 step 向上取整得到计费重量，再按闭区间查找
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketTable<V> {
    #[serde(default = "default_step")]
    pub step: BigDecimal,
    pub rows: Vec<Bracket<V>>,
}

impl<V> BracketTable<V> {
    pub fn billable(&self, weight: &BigDecimal) -> BigDecimal {
        ceil_to_step(weight, &self.step)
    }

    /// 按实际重量查找 (内部取整)
    pub fn get(&self, weight: &BigDecimal) -> Option<&Bracket<V>> {
        let billable = self.billable(weight);
        self.rows.iter().find(|r| r.contains(&billable))
    }

    pub fn min_weight(&self) -> Option<&BigDecimal> {
        self.rows.first().map(|r| &r.weight_from)
    }

    pub fn max_weight(&self) -> Option<&BigDecimal> {
        self.rows.last().map(|r| &r.weight_to)
    }

    pub fn top(&self) -> Option<&Bracket<V>> {
        self.rows.last()
    }

    /// 结构校验: 非空、升序、无重叠、无缺口
    ///
    /// 缺口判定基于计费刻度: prev.to 之上的第一个 step 倍数必须落在 next 内或之前，
    /// 这样 [min, max] 内每个计费重量恰好命中一行。
    pub fn validate(&self, table: &str) -> Result<(), ConfigError> {
        if self.step <= BigDecimal::zero() {
            return Err(ConfigError::NonPositiveStep {
                table: table.to_string(),
                step: self.step.clone(),
            });
        }
        if self.rows.is_empty() {
            return Err(ConfigError::EmptyBrackets {
                table: table.to_string(),
            });
        }

        for (index, row) in self.rows.iter().enumerate() {
            if row.weight_from < BigDecimal::zero() {
                return Err(ConfigError::NegativeWeight {
                    table: table.to_string(),
                    index,
                    from: row.weight_from.clone(),
                });
            }
            if row.weight_from > row.weight_to {
                return Err(ConfigError::InvertedBracket {
                    table: table.to_string(),
                    index,
                    from: row.weight_from.clone(),
                    to: row.weight_to.clone(),
                });
            }
        }

        for pair in self.rows.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.weight_from <= prev.weight_to {
                return Err(ConfigError::OverlappingBrackets {
                    table: table.to_string(),
                    previous_to: prev.weight_to.clone(),
                    next_from: next.weight_from.clone(),
                });
            }
            if next_step_above(&prev.weight_to, &self.step) < next.weight_from {
                return Err(ConfigError::BracketGap {
                    table: table.to_string(),
                    previous_to: prev.weight_to.clone(),
                    next_from: next.weight_from.clone(),
                });
            }
        }

        Ok(())
    }
}

/// 价格行: 分区/费率区标签 -> 价格 (空值表示该格未公布)
pub type PriceRow = IndexMap<String, Option<BigDecimal>>;

/// 超重费率行: 标签 -> 每个计费增量的费率
pub type RateRow = IndexMap<String, BigDecimal>;

pub type TierTable = BracketTable<PriceRow>;

impl TierTable {
    pub fn validate_prices(&self, table: &str) -> Result<(), ConfigError> {
        self.validate(table)?;
        for row in &self.rows {
            for (zone, price) in &row.value {
                if let Some(price) = price.as_ref().filter(|p| **p < BigDecimal::zero()) {
                    return Err(ConfigError::NegativePrice {
                        table: table.to_string(),
                        zone: zone.clone(),
                        price: price.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 表中出现过的列标签
    pub fn has_column(&self, label: &str) -> bool {
        self.rows.iter().any(|r| r.value.contains_key(label))
    }
}

fn default_increment() -> BigDecimal {
    default_step()
}

/// 超出最高档位后的超重计费规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverageRule {
    #[serde(default = "default_increment")]
    pub increment_kg: BigDecimal,
    pub brackets: BracketTable<RateRow>,
}

impl OverageRule {
    pub fn validate(&self, table: &str, tiers: &TierTable) -> Result<(), ConfigError> {
        if self.increment_kg <= BigDecimal::zero() {
            return Err(ConfigError::NonPositiveStep {
                table: table.to_string(),
                step: self.increment_kg.clone(),
            });
        }
        self.brackets.validate(table)?;

        for row in &self.brackets.rows {
            for (zone, rate) in &row.value {
                if *rate <= BigDecimal::zero() {
                    return Err(ConfigError::NonPositiveRate {
                        table: table.to_string(),
                        zone: zone.clone(),
                        rate: rate.clone(),
                    });
                }
            }
        }

        // 超重区间必须紧接最高档位
        if let (Some(top), Some(first)) = (tiers.max_weight(), self.brackets.min_weight()) {
            if first <= top {
                return Err(ConfigError::OverageBelowTopTier {
                    table: table.to_string(),
                    top_tier: top.clone(),
                    first_from: first.clone(),
                });
            }
            if &next_step_above(top, &self.brackets.step) < first {
                return Err(ConfigError::BracketGap {
                    table: table.to_string(),
                    previous_to: top.clone(),
                    next_from: first.clone(),
                });
            }
        }
        Ok(())
    }
}

/// 固定费用计费方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeBasis {
    Flat {
        amount: BigDecimal,
    },
    PerKg {
        rate: BigDecimal,
        #[serde(default)]
        minimum: Option<BigDecimal>,
    },
    PerCbm {
        rate: BigDecimal,
        #[serde(default)]
        minimum: Option<BigDecimal>,
    },
}

impl ChargeBasis {
    fn is_negative(&self) -> bool {
        let zero = BigDecimal::zero();
        match self {
            ChargeBasis::Flat { amount } => *amount < zero,
            ChargeBasis::PerKg { rate, minimum } | ChargeBasis::PerCbm { rate, minimum } => {
                *rate < zero || minimum.as_ref().map_or(false, |m| *m < zero)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedCharge {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub basis: ChargeBasis,
}

/// 有起止分区的线路
pub trait Lane {
    fn origin(&self) -> &str;
    fn destination(&self) -> &str;

    fn serves(&self, origin: &str, destination: &str) -> bool {
        self.origin() == origin && self.destination() == destination
    }
}

macro_rules! impl_lane {
    ($($ty:ty),*) => {
        $(impl Lane for $ty {
            fn origin(&self) -> &str {
                &self.origin
            }
            fn destination(&self) -> &str {
                &self.destination
            }
        })*
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirLane {
    pub origin: String,
    pub destination: String,
    /// 每公斤运价
    pub brackets: BracketTable<BigDecimal>,
    #[serde(default)]
    pub minimum_charge: Option<BigDecimal>,
    #[serde(default)]
    pub fixed_charges: Vec<FixedCharge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FclComponent {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRate {
    pub container: ContainerType,
    pub components: Vec<FclComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FclLane {
    pub origin: String,
    pub destination: String,
    pub rates: Vec<ContainerRate>,
}

impl FclLane {
    pub fn rate_for(&self, container: ContainerType) -> Option<&ContainerRate> {
        self.rates.iter().find(|r| r.container == container)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LclLane {
    pub origin: String,
    pub destination: String,
    pub components: Vec<FixedCharge>,
}

impl_lane!(AirLane, FclLane, LclLane);

/// 分区矩阵单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub origin: String,
    pub destination: String,
    pub rate_zone: String,
}

/// 分区交叉矩阵: (起运分区, 目的分区) -> 费率区标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMatrix {
    pub zones: Vec<String>,
    pub cells: Vec<MatrixCell>,
}

impl ZoneMatrix {
    pub fn rate_zone(&self, origin: &str, destination: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|c| c.origin == origin && c.destination == destination)
            .map(|c| c.rate_zone.as_str())
    }
}

/// 分区计价依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneBasis {
    Origin,
    Destination,
}

impl ZoneBasis {
    /// 未显式声明时: 进口按起运地，其余按目的地
    pub fn for_direction(direction: ServiceDirection) -> Self {
        match direction {
            ServiceDirection::Import => ZoneBasis::Origin,
            _ => ZoneBasis::Destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTieredPricing {
    #[serde(default)]
    pub zone_basis: Option<ZoneBasis>,
    pub tiers: TierTable,
    #[serde(default)]
    pub overage: Option<OverageRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMatrixPricing {
    pub matrix: ZoneMatrix,
    pub tiers: TierTable,
    #[serde(default)]
    pub overage: Option<OverageRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirPricing {
    pub lanes: Vec<AirLane>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FclPricing {
    pub lanes: Vec<FclLane>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LclPricing {
    pub lanes: Vec<LclLane>,
}

/// 计价规则 (封闭枚举)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pricing {
    ZoneTiered(ZoneTieredPricing),
    ZoneMatrix(ZoneMatrixPricing),
    Air(AirPricing),
    OceanFcl(FclPricing),
    OceanLcl(LclPricing),
}

impl Pricing {
    pub fn kind(&self) -> &'static str {
        self.strategy().as_str()
    }

    pub fn strategy(&self) -> PricingStrategy {
        match self {
            Pricing::ZoneTiered(_) => PricingStrategy::ZoneTiered,
            Pricing::ZoneMatrix(_) => PricingStrategy::ZoneMatrix,
            Pricing::Air(_) => PricingStrategy::Air,
            Pricing::OceanFcl(_) => PricingStrategy::OceanFcl,
            Pricing::OceanLcl(_) => PricingStrategy::OceanLcl,
        }
    }

    /// 按分档计价的规则: (档位表, 超重规则)
    pub fn tiers(&self) -> Option<(&TierTable, Option<&OverageRule>)> {
        match self {
            Pricing::ZoneTiered(p) => Some((&p.tiers, p.overage.as_ref())),
            Pricing::ZoneMatrix(p) => Some((&p.tiers, p.overage.as_ref())),
            _ => None,
        }
    }
}

/// 费率卡
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub id: String,
    #[serde(default = "default_card_version")]
    pub version: u32,
    pub mode: TransportMode,
    /// 为空表示该运输方式下的兜底卡
    #[serde(default)]
    pub direction: Option<ServiceDirection>,
    pub currency: String,
    #[serde(default)]
    pub zone_table: Option<String>,
    /// 人工维护的卡，重新导入时保留
    #[serde(default)]
    pub manual_override: bool,
    pub pricing: Pricing,
}

fn default_card_version() -> u32 {
    1
}

impl RateCard {
    /// 分档卡的重量覆盖范围 [首档起点, 末个超重区间终点]
    pub fn weight_range(&self) -> Option<(BigDecimal, BigDecimal)> {
        let (tiers, overage) = self.pricing.tiers()?;
        let from = tiers.min_weight()?.clone();
        let to = overage
            .and_then(|o| o.brackets.max_weight())
            .or_else(|| tiers.max_weight())?
            .clone();
        Some((from, to))
    }

    /// 卡内的负数费用 (固定费用与集装箱组件)
    pub fn negative_charge(&self) -> Option<&str> {
        let zero = BigDecimal::zero();
        match &self.pricing {
            Pricing::Air(p) => p.lanes.iter().find_map(|lane| {
                if lane.minimum_charge.as_ref().map_or(false, |m| *m < zero) {
                    return Some("FRT");
                }
                lane.fixed_charges
                    .iter()
                    .find(|c| c.basis.is_negative())
                    .map(|c| c.code.as_str())
            }),
            Pricing::OceanFcl(p) => p
                .lanes
                .iter()
                .flat_map(|l| l.rates.iter())
                .flat_map(|r| r.components.iter())
                .find(|c| c.amount < zero)
                .map(|c| c.code.as_str()),
            Pricing::OceanLcl(p) => p
                .lanes
                .iter()
                .flat_map(|l| l.components.iter())
                .find(|c| c.basis.is_negative())
                .map(|c| c.code.as_str()),
            Pricing::ZoneTiered(_) | Pricing::ZoneMatrix(_) => None,
        }
    }
}

/// 候选卡匹配位置: 单个分区或分区对
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locus {
    Zone(String),
    Pair { origin: String, destination: String },
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locus::Zone(zone) => write!(f, "zone {}", zone),
            Locus::Pair {
                origin,
                destination,
            } => write!(f, "{} -> {}", origin, destination),
        }
    }
}
