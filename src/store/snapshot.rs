use crate::error::ConfigError;
use crate::models::{
    Lane, Locus, Pricing, RateCard, ServiceChargeSchedule, ServiceDirection,
    TransportMode, ZoneMatrixPricing, ZoneTable,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// 导入数据集 (一次导入生成一个快照版本)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCardDataset {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub zone_tables: Vec<ZoneTable>,
    #[serde(default)]
    pub cards: Vec<RateCard>,
    #[serde(default)]
    pub schedules: Vec<ServiceChargeSchedule>,
}

/// 不可变费率快照
#[derive(Debug, Clone)]
pub struct RateCardSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub label: Option<String>,
    pub zone_tables: IndexMap<String, ZoneTable>,
    pub cards: Vec<RateCard>,
    pub schedules: IndexMap<TransportMode, ServiceChargeSchedule>,
}

/// 同一 (运输方式, 方向) 下共用一张分区表的卡组
#[derive(Debug)]
pub struct CardGroup<'a> {
    pub fallback: bool,
    pub zone_table: Option<&'a ZoneTable>,
    cards: Vec<(usize, &'a RateCard)>,
}

impl<'a> CardGroup<'a> {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> impl Iterator<Item = &'a RateCard> + '_ {
        self.cards.iter().map(|(_, card)| *card)
    }

    /// 覆盖 locus 与计费重量的卡: 重量范围窄者优先，其次卡版本高者，最后声明顺序
    pub fn candidates(&self, locus: &Locus, weight: Option<&BigDecimal>) -> Vec<&'a RateCard> {
        let mut scored: Vec<(Option<BigDecimal>, usize, &'a RateCard)> = self
            .cards
            .iter()
            .filter_map(|(idx, card)| coverage(card, locus, weight).map(|width| (width, *idx, *card)))
            .collect();

        scored.sort_by(|a, b| {
            compare_width(&a.0, &b.0)
                .then_with(|| b.2.version.cmp(&a.2.version))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.into_iter().map(|(_, _, card)| card).collect()
    }
}

fn compare_width(a: &Option<BigDecimal>, b: &Option<BigDecimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// 卡是否覆盖 locus/重量; 覆盖时返回重量范围宽度 (不按重量计价的卡为 None)
fn coverage(card: &RateCard, locus: &Locus, weight: Option<&BigDecimal>) -> Option<Option<BigDecimal>> {
    let in_range = |from: &BigDecimal, to: &BigDecimal, billable: &BigDecimal| from <= billable && billable <= to;

    match (&card.pricing, locus) {
        (Pricing::ZoneTiered(p), Locus::Zone(zone)) => {
            if !p.tiers.has_column(zone) {
                return None;
            }
            tiered_width(card, &weight.map(|w| p.tiers.billable(w)), in_range)
        }
        (Pricing::ZoneMatrix(p), Locus::Pair { origin, destination }) => {
            p.matrix.rate_zone(origin, destination)?;
            tiered_width(card, &weight.map(|w| p.tiers.billable(w)), in_range)
        }
        (Pricing::Air(p), Locus::Pair { origin, destination }) => {
            let lane = p.lanes.iter().find(|l| l.serves(origin, destination))?;
            let (from, to) = (lane.brackets.min_weight()?, lane.brackets.max_weight()?);
            match weight {
                Some(w) if !in_range(from, to, &lane.brackets.billable(w)) => None,
                _ => Some(Some(to - from)),
            }
        }
        (Pricing::OceanFcl(p), Locus::Pair { origin, destination }) => {
            p.lanes.iter().any(|l| l.serves(origin, destination)).then_some(None)
        }
        (Pricing::OceanLcl(p), Locus::Pair { origin, destination }) => {
            p.lanes.iter().any(|l| l.serves(origin, destination)).then_some(None)
        }
        _ => None,
    }
}

fn tiered_width(
    card: &RateCard,
    billable: &Option<BigDecimal>,
    in_range: impl Fn(&BigDecimal, &BigDecimal, &BigDecimal) -> bool,
) -> Option<Option<BigDecimal>> {
    let (from, to) = card.weight_range()?;
    match billable {
        Some(b) if !in_range(&from, &to, b) => None,
        _ => Some(Some(&to - &from)),
    }
}

impl RateCardSnapshot {
    /// 校验数据集并生成快照，任一错误拒绝整个版本
    pub fn build(version: u64, dataset: RateCardDataset) -> Result<Self, ConfigError> {
        let mut zone_tables = IndexMap::new();
        for table in dataset.zone_tables {
            if zone_tables.contains_key(&table.name) {
                return Err(ConfigError::DuplicateZoneTable { name: table.name });
            }
            zone_tables.insert(table.name.clone(), table);
        }

        let mut ids = HashSet::new();
        for card in &dataset.cards {
            if !ids.insert(card.id.as_str()) {
                return Err(ConfigError::DuplicateCard {
                    id: card.id.clone(),
                });
            }
            validate_card(card, &zone_tables)?;
        }
        validate_zone_namespaces(&dataset.cards)?;

        let mut schedules: IndexMap<TransportMode, ServiceChargeSchedule> = IndexMap::new();
        for schedule in dataset.schedules {
            schedules
                .entry(schedule.mode)
                .or_insert_with(|| ServiceChargeSchedule::new(schedule.mode))
                .entries
                .extend(schedule.entries);
        }
        for schedule in schedules.values() {
            schedule.validate()?;
        }

        Ok(Self {
            version,
            loaded_at: Utc::now(),
            label: dataset.label,
            zone_tables,
            cards: dataset.cards,
            schedules,
        })
    }

    pub fn zone_table(&self, name: &str) -> Option<&ZoneTable> {
        self.zone_tables.get(name)
    }

    pub fn card(&self, id: &str) -> Option<&RateCard> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn schedule(&self, mode: TransportMode) -> Option<&ServiceChargeSchedule> {
        self.schedules.get(&mode)
    }

    /// 按方向分组: 精确方向组在前，兜底组在后 (空组省略)
    pub fn card_groups(&self, mode: TransportMode, direction: ServiceDirection) -> Vec<CardGroup<'_>> {
        [Some(direction), None]
            .into_iter()
            .map(|dir| {
                let cards: Vec<(usize, &RateCard)> = self
                    .cards
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.mode == mode && c.direction == dir)
                    .collect();
                let zone_table = cards
                    .iter()
                    .find_map(|(_, c)| c.zone_table.as_deref())
                    .and_then(|name| self.zone_tables.get(name));
                CardGroup {
                    fallback: dir.is_none(),
                    zone_table,
                    cards,
                }
            })
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// 候选卡 (有序): 精确方向优先于兜底，其余排序见 CardGroup::candidates
    pub fn find_candidates(
        &self,
        mode: TransportMode,
        direction: ServiceDirection,
        locus: &Locus,
        weight: Option<&BigDecimal>,
    ) -> Vec<&RateCard> {
        self.card_groups(mode, direction)
            .iter()
            .flat_map(|g| g.candidates(locus, weight))
            .collect()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            label: self.label.clone(),
            loaded_at: self.loaded_at,
            zone_tables: self.zone_tables.keys().cloned().collect(),
            cards: self
                .cards
                .iter()
                .map(|c| CardSummary {
                    id: c.id.clone(),
                    version: c.version,
                    mode: c.mode,
                    direction: c.direction,
                    pricing: c.pricing.kind().to_string(),
                    manual_override: c.manual_override,
                })
                .collect(),
            service_charges: self
                .schedules
                .values()
                .map(|s| s.entries.len())
                .sum(),
        }
    }
}

/// 快照概要 (API 输出)
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub label: Option<String>,
    pub loaded_at: DateTime<Utc>,
    pub zone_tables: Vec<String>,
    pub cards: Vec<CardSummary>,
    pub service_charges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub id: String,
    pub version: u32,
    pub mode: TransportMode,
    pub direction: Option<ServiceDirection>,
    pub pricing: String,
    pub manual_override: bool,
}

fn validate_card(card: &RateCard, zone_tables: &IndexMap<String, ZoneTable>) -> Result<(), ConfigError> {
    if !card.pricing.strategy().serves(card.mode, card.direction) {
        return Err(ConfigError::PricingMismatch {
            card: card.id.clone(),
            mode: card.mode,
            pricing: card.pricing.kind().to_string(),
        });
    }

    // 分区计价与线路计价都依赖分区表
    let name = card.zone_table.as_deref().ok_or_else(|| ConfigError::MissingZoneTable {
        card: card.id.clone(),
        strategy: card.pricing.kind().to_string(),
    })?;
    let table = zone_tables.get(name).ok_or_else(|| ConfigError::UnknownZoneTable {
        card: card.id.clone(),
        table: name.to_string(),
    })?;

    if let Some((tiers, overage)) = card.pricing.tiers() {
        let name = format!("{}:tiers", card.id);
        tiers.validate_prices(&name)?;
        if let Some(overage) = overage {
            overage.validate(&format!("{}:overage", card.id), tiers)?;
        }
    }

    if let Some(code) = card.negative_charge() {
        return Err(ConfigError::NegativeCharge {
            card: card.id.clone(),
            code: code.to_string(),
        });
    }

    match &card.pricing {
        Pricing::ZoneMatrix(p) => validate_matrix(card, p, table),
        Pricing::Air(p) => {
            unique_lanes(card, &p.lanes)?;
            for lane in &p.lanes {
                let name = format!("{}:{}-{}", card.id, lane.origin, lane.destination);
                lane.brackets.validate(&name)?;
                if let Some(rate) = lane.brackets.rows.iter().map(|r| &r.value).find(|r| **r <= BigDecimal::zero()) {
                    return Err(ConfigError::NonPositiveRate {
                        table: name,
                        zone: format!("{}-{}", lane.origin, lane.destination),
                        rate: rate.clone(),
                    });
                }
            }
            Ok(())
        }
        Pricing::OceanFcl(p) => unique_lanes(card, &p.lanes),
        Pricing::OceanLcl(p) => unique_lanes(card, &p.lanes),
        Pricing::ZoneTiered(_) => Ok(()),
    }
}

fn unique_lanes<L: Lane>(card: &RateCard, lanes: &[L]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for lane in lanes {
        if !seen.insert((lane.origin(), lane.destination())) {
            return Err(ConfigError::DuplicateLane {
                card: card.id.clone(),
                origin: lane.origin().to_string(),
                destination: lane.destination().to_string(),
            });
        }
    }
    Ok(())
}

/// 矩阵必须是 zones x zones 上的全函数，且标签均有价格列
fn validate_matrix(card: &RateCard, pricing: &ZoneMatrixPricing, table: &ZoneTable) -> Result<(), ConfigError> {
    let matrix = &pricing.matrix;
    let zones: IndexSet<&str> = matrix.zones.iter().map(String::as_str).collect();

    if let Some(zone) = table.zones().into_iter().find(|z| !zones.contains(z)) {
        return Err(ConfigError::ZoneOutsideMatrix {
            card: card.id.clone(),
            zone: zone.to_string(),
        });
    }

    let mut cells = HashSet::new();
    for cell in &matrix.cells {
        for zone in [&cell.origin, &cell.destination] {
            if !zones.contains(zone.as_str()) {
                return Err(ConfigError::ZoneOutsideMatrix {
                    card: card.id.clone(),
                    zone: zone.clone(),
                });
            }
        }
        if !cells.insert((cell.origin.as_str(), cell.destination.as_str())) {
            return Err(ConfigError::DuplicateMatrixCell {
                card: card.id.clone(),
                origin: cell.origin.clone(),
                destination: cell.destination.clone(),
            });
        }
        if !pricing.tiers.has_column(&cell.rate_zone) {
            return Err(ConfigError::UnknownRateZone {
                card: card.id.clone(),
                label: cell.rate_zone.clone(),
            });
        }
    }

    for origin in &zones {
        for destination in &zones {
            if !cells.contains(&(*origin, *destination)) {
                return Err(ConfigError::MatrixNotTotal {
                    card: card.id.clone(),
                    origin: origin.to_string(),
                    destination: destination.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// 同一 (方式, 方向) 的卡共用分区表; 国内与第三方卡的分区表互不相交
fn validate_zone_namespaces(cards: &[RateCard]) -> Result<(), ConfigError> {
    let mut by_key: IndexMap<(TransportMode, Option<ServiceDirection>), &str> = IndexMap::new();
    for card in cards {
        let Some(table) = card.zone_table.as_deref() else {
            continue;
        };
        let key = (card.mode, card.direction);
        match by_key.get(&key) {
            Some(first) if *first != table => {
                return Err(ConfigError::MixedZoneTables {
                    mode: card.mode,
                    direction: card.direction,
                    first: first.to_string(),
                    second: table.to_string(),
                });
            }
            Some(_) => {}
            None => {
                by_key.insert(key, table);
            }
        }
    }

    let domestic: HashSet<&str> = cards
        .iter()
        .filter(|c| c.direction == Some(ServiceDirection::Domestic) || c.mode == TransportMode::Domestic)
        .filter_map(|c| c.zone_table.as_deref())
        .collect();
    let shared = cards
        .iter()
        .filter(|c| c.direction == Some(ServiceDirection::ThirdParty))
        .filter_map(|c| c.zone_table.as_deref())
        .find(|t| domestic.contains(t));
    if let Some(table) = shared {
        return Err(ConfigError::SharedZoneNamespace {
            table: table.to_string(),
        });
    }
    Ok(())
}
