use crate::error::ResolutionError;
use crate::models::amount::{ceil_to_step, money, total};
use crate::models::{
    normalize_text, ChargeBasis, ChargeContext, ChargeShape, Confidence, ExpectedCharges,
    ExpectedLine, FixedCharge, LineKind, LineOmission, Locality, Locus, OmissionReason,
    OverageRule, Pricing, PricingStrategy, RateCard, ServiceChargeSchedule, Shipment, TierTable,
    ZoneBasis, ZoneMatch, FREIGHT_CODE,
};
use crate::service::geo::GeoResolver;
use crate::service::variance::TolerancePolicy;
use crate::store::{CardGroup, RateCardSnapshot};
use bigdecimal::{BigDecimal, Zero};
use std::collections::HashSet;
use std::sync::Arc;

/// 基础运费计算结果
struct Priced<'a> {
    card: &'a RateCard,
    lines: Vec<ExpectedLine>,
    origin_match: Option<ZoneMatch>,
    destination_match: Option<ZoneMatch>,
}

/// 费率解析引擎 - 绑定一个快照完成整票计算
pub struct RateEngine {
    snapshot: Arc<RateCardSnapshot>,
    policy: TolerancePolicy,
}

impl RateEngine {
    pub fn new(snapshot: Arc<RateCardSnapshot>) -> Self {
        Self {
            snapshot,
            policy: TolerancePolicy::default(),
        }
    }

    /// 直通代码与运费识别规则跟随审计策略
    pub fn with_policy(mut self, policy: &TolerancePolicy) -> Self {
        self.policy = policy.clone();
        self
    }

    pub fn snapshot(&self) -> &Arc<RateCardSnapshot> {
        &self.snapshot
    }

    /// 计算预期费用: 选策略 -> 选卡 -> 基础运费 -> 服务费
    pub fn compute_expected(&self, shipment: &Shipment) -> Result<ExpectedCharges, ResolutionError> {
        let strategy = PricingStrategy::select(shipment.mode, shipment.direction)?;
        let groups = self.snapshot.card_groups(shipment.mode, shipment.direction);

        let mut first_error = None;
        for group in &groups {
            match self.price(shipment, strategy, group) {
                Ok(priced) => {
                    if group.fallback {
                        tracing::debug!("[Engine] {} 使用兜底费率卡 {}", shipment.id, priced.card.id);
                    }
                    return Ok(self.finish(shipment, strategy, priced));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(ResolutionError::NoRateCard {
            mode: shipment.mode,
            direction: shipment.direction,
        }))
    }

    fn price<'a>(
        &self,
        shipment: &Shipment,
        strategy: PricingStrategy,
        group: &CardGroup<'a>,
    ) -> Result<Priced<'a>, ResolutionError> {
        let no_card = || ResolutionError::NoRateCard {
            mode: shipment.mode,
            direction: shipment.direction,
        };
        let table = group.zone_table.ok_or_else(no_card)?;
        let resolver = GeoResolver::new(table);

        match strategy {
            PricingStrategy::ZoneTiered => {
                let weight = require_weight(shipment)?;
                let basis = group_basis(group, shipment);
                let side = match basis {
                    ZoneBasis::Origin => &shipment.origin,
                    ZoneBasis::Destination => &shipment.destination,
                };
                let zone = resolve(&resolver, side)?;
                let locus = Locus::Zone(zone.zone.clone());
                let card = select_card(group, shipment, &locus, weight, || no_card())?;
                let Pricing::ZoneTiered(p) = &card.pricing else {
                    return Err(no_card());
                };

                let lines = tier_lines(card, &p.tiers, p.overage.as_ref(), &zone.zone, weight)?;
                let (origin_match, destination_match) = match basis {
                    ZoneBasis::Origin => (Some(zone), None),
                    ZoneBasis::Destination => (None, Some(zone)),
                };
                Ok(Priced {
                    card,
                    lines,
                    origin_match,
                    destination_match,
                })
            }
            PricingStrategy::ZoneMatrix => {
                let weight = require_weight(shipment)?;
                let (origin, destination) = resolve_pair(&resolver, shipment)?;
                let locus = pair(&origin, &destination);
                let card = select_card(group, shipment, &locus, weight, || ResolutionError::UnmappedZonePair {
                    origin: origin.zone.clone(),
                    destination: destination.zone.clone(),
                })?;
                let Pricing::ZoneMatrix(p) = &card.pricing else {
                    return Err(no_card());
                };

                let label = p
                    .matrix
                    .rate_zone(&origin.zone, &destination.zone)
                    .ok_or_else(|| ResolutionError::UnmappedZonePair {
                        origin: origin.zone.clone(),
                        destination: destination.zone.clone(),
                    })?;
                let lines = tier_lines(card, &p.tiers, p.overage.as_ref(), label, weight)?;
                Ok(Priced {
                    card,
                    lines,
                    origin_match: Some(origin),
                    destination_match: Some(destination),
                })
            }
            PricingStrategy::Air => {
                let weight = require_weight(shipment)?;
                let (origin, destination) = resolve_pair(&resolver, shipment)?;
                let locus = pair(&origin, &destination);
                let card = select_card(group, shipment, &locus, weight, || no_lane(shipment, &locus))?;
                let Pricing::Air(p) = &card.pricing else {
                    return Err(no_card());
                };
                let lane = p
                    .lanes
                    .iter()
                    .find(|l| l.origin == origin.zone && l.destination == destination.zone)
                    .ok_or_else(|| no_lane(shipment, &locus))?;

                let chargeable = lane.brackets.billable(weight);
                let rate = lane
                    .brackets
                    .get(weight)
                    .map(|b| &b.value)
                    .ok_or_else(|| ResolutionError::NoPublishedPrice {
                        card: card.id.clone(),
                        column: format!("{}-{}", lane.origin, lane.destination),
                        weight: chargeable.clone(),
                    })?;
                let mut freight = &chargeable * rate;
                let mut basis = format!("{}kg @ {}/kg", chargeable, rate);
                if let Some(minimum) = lane.minimum_charge.as_ref().filter(|m| **m > freight) {
                    freight = minimum.clone();
                    basis = format!("minimum charge {}", minimum);
                }

                let mut lines = vec![ExpectedLine {
                    code: FREIGHT_CODE.to_string(),
                    description: "Air freight".to_string(),
                    amount: money(&freight),
                    basis,
                    kind: LineKind::Freight,
                }];
                for charge in &lane.fixed_charges {
                    lines.push(fixed_line(charge, shipment, Some(&chargeable))?);
                }
                Ok(Priced {
                    card,
                    lines,
                    origin_match: Some(origin),
                    destination_match: Some(destination),
                })
            }
            PricingStrategy::OceanFcl => {
                let containers: Vec<_> = shipment.declared_containers().collect();
                if containers.is_empty() {
                    return Err(ResolutionError::MissingDimension {
                        mode: shipment.mode,
                        dimension: "containers".to_string(),
                    });
                }
                let (origin, destination) = resolve_pair(&resolver, shipment)?;
                let locus = pair(&origin, &destination);
                let card = group
                    .candidates(&locus, None)
                    .into_iter()
                    .next()
                    .ok_or_else(|| no_lane(shipment, &locus))?;
                let Pricing::OceanFcl(p) = &card.pricing else {
                    return Err(no_card());
                };
                let lane = p
                    .lanes
                    .iter()
                    .find(|l| l.origin == origin.zone && l.destination == destination.zone)
                    .ok_or_else(|| no_lane(shipment, &locus))?;

                let mut lines = Vec::new();
                for count in containers {
                    let rate = lane.rate_for(count.container).ok_or_else(|| ResolutionError::NoContainerRate {
                        card: card.id.clone(),
                        container: count.container.to_string(),
                        origin: origin.zone.clone(),
                        destination: destination.zone.clone(),
                    })?;
                    let units = BigDecimal::from(count.count);
                    for component in &rate.components {
                        lines.push(ExpectedLine {
                            code: normalize_text(&component.code),
                            description: component.description.clone(),
                            amount: money(&(&component.amount * &units)),
                            basis: format!("{} x {} @ {}", count.count, count.container, component.amount),
                            kind: LineKind::Fixed,
                        });
                    }
                }
                Ok(Priced {
                    card,
                    lines,
                    origin_match: Some(origin),
                    destination_match: Some(destination),
                })
            }
            PricingStrategy::OceanLcl => {
                if shipment.volume().is_none() {
                    return Err(ResolutionError::MissingDimension {
                        mode: shipment.mode,
                        dimension: "volume_cbm".to_string(),
                    });
                }
                let (origin, destination) = resolve_pair(&resolver, shipment)?;
                let locus = pair(&origin, &destination);
                let card = group
                    .candidates(&locus, None)
                    .into_iter()
                    .next()
                    .ok_or_else(|| no_lane(shipment, &locus))?;
                let Pricing::OceanLcl(p) = &card.pricing else {
                    return Err(no_card());
                };
                let lane = p
                    .lanes
                    .iter()
                    .find(|l| l.origin == origin.zone && l.destination == destination.zone)
                    .ok_or_else(|| no_lane(shipment, &locus))?;

                let lines = lane
                    .components
                    .iter()
                    .map(|c| fixed_line(c, shipment, shipment.weight()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Priced {
                    card,
                    lines,
                    origin_match: Some(origin),
                    destination_match: Some(destination),
                })
            }
        }
    }

    /// 合并服务费、汇总金额与置信度
    fn finish(&self, shipment: &Shipment, strategy: PricingStrategy, priced: Priced<'_>) -> ExpectedCharges {
        let Priced {
            card,
            mut lines,
            origin_match,
            destination_match,
        } = priced;

        let mut omissions = Vec::new();
        if let Some(schedule) = self.snapshot.schedule(shipment.mode) {
            self.service_charges(shipment, card, schedule, &mut lines, &mut omissions);
        } else {
            self.unknown_charges(shipment, &lines, &mut omissions);
        }

        let confidence = Confidence::lowest(origin_match.iter().chain(destination_match.iter()));
        let total = money(&total(lines.iter().map(|l| &l.amount)));

        tracing::debug!(
            "[Engine] {} -> 费率卡 {} ({}), 预期 {} {}, {} 行, {} 行省略",
            shipment.id,
            card.id,
            strategy.as_str(),
            total,
            card.currency,
            lines.len(),
            omissions.len()
        );

        ExpectedCharges {
            shipment_id: shipment.id.clone(),
            rate_card_id: card.id.clone(),
            rate_card_version: card.version,
            snapshot_version: self.snapshot.version,
            strategy,
            currency: card.currency.clone(),
            lines,
            total,
            confidence,
            origin_match,
            destination_match,
            omissions,
        }
    }

    /// 发票中非策略产出、非直通的费用行按服务费表定价
    fn service_charges(
        &self,
        shipment: &Shipment,
        card: &RateCard,
        schedule: &ServiceChargeSchedule,
        lines: &mut Vec<ExpectedLine>,
        omissions: &mut Vec<LineOmission>,
    ) {
        let produced: HashSet<String> = lines.iter().map(|l| normalize_text(&l.code)).collect();
        let base_freight = total(
            lines
                .iter()
                .filter(|l| l.code == FREIGHT_CODE)
                .map(|l| &l.amount),
        );
        let ctx = ChargeContext {
            domestic: shipment.is_domestic(),
            product: shipment.product.clone(),
        };
        let currency = normalize_text(&card.currency);
        let mut handled = HashSet::new();

        for charge in &shipment.charges {
            let key = self.policy.audit_key(charge);
            if key.is_empty() || produced.contains(&key) || self.policy.is_pass_through(&key) {
                continue;
            }
            if !handled.insert(key.clone()) {
                continue;
            }
            let omit = |reason| LineOmission {
                key: key.clone(),
                amount: charge.amount.clone(),
                reason,
            };
            if normalize_text(&charge.currency) != currency {
                omissions.push(omit(OmissionReason::CurrencyMismatch));
                continue;
            }

            let code = if schedule.contains_code(&key) {
                Some(key.clone())
            } else {
                schedule.match_description(&charge.description)
            };
            let Some(code) = code else {
                omissions.push(omit(OmissionReason::UnknownServiceCode));
                continue;
            };

            let entry = match schedule.resolve(&code, &ctx) {
                Ok(entry) => entry,
                Err(reason) => {
                    omissions.push(omit(reason));
                    continue;
                }
            };

            let priced = service_amount(
                entry.shape.clone(),
                entry.minimum.as_ref(),
                entry.applies_above_kg.as_ref(),
                shipment,
                &base_freight,
            );
            match priced {
                Ok((amount, basis)) => lines.push(ExpectedLine {
                    code: key.clone(),
                    description: entry.name.clone(),
                    amount: money(&amount),
                    basis: format!("{} {}", entry.key(), basis),
                    kind: LineKind::ServiceCharge,
                }),
                Err(reason) => omissions.push(omit(reason)),
            }
        }
    }

    /// 无服务费表时，非策略产出的发票行全部记为未知代码
    fn unknown_charges(&self, shipment: &Shipment, lines: &[ExpectedLine], omissions: &mut Vec<LineOmission>) {
        let produced: HashSet<String> = lines.iter().map(|l| normalize_text(&l.code)).collect();
        let mut handled = HashSet::new();
        for charge in &shipment.charges {
            let key = self.policy.audit_key(charge);
            if key.is_empty() || produced.contains(&key) || self.policy.is_pass_through(&key) {
                continue;
            }
            if !handled.insert(key.clone()) {
                continue;
            }
            omissions.push(LineOmission {
                key,
                amount: charge.amount.clone(),
                reason: OmissionReason::UnknownServiceCode,
            });
        }
    }
}

fn require_weight(shipment: &Shipment) -> Result<&BigDecimal, ResolutionError> {
    shipment.weight().ok_or_else(|| ResolutionError::MissingDimension {
        mode: shipment.mode,
        dimension: "weight_kg".to_string(),
    })
}

fn resolve(resolver: &GeoResolver<'_>, locality: &Locality) -> Result<ZoneMatch, ResolutionError> {
    resolver
        .resolve(locality)
        .ok_or_else(|| ResolutionError::zone_not_found(resolver.table_name(), locality))
}

fn resolve_pair(
    resolver: &GeoResolver<'_>,
    shipment: &Shipment,
) -> Result<(ZoneMatch, ZoneMatch), ResolutionError> {
    Ok((resolve(resolver, &shipment.origin)?, resolve(resolver, &shipment.destination)?))
}

fn pair(origin: &ZoneMatch, destination: &ZoneMatch) -> Locus {
    Locus::Pair {
        origin: origin.zone.clone(),
        destination: destination.zone.clone(),
    }
}

fn no_lane(shipment: &Shipment, locus: &Locus) -> ResolutionError {
    ResolutionError::NoApplicableRateCard {
        mode: shipment.mode,
        direction: shipment.direction,
        locus: locus.to_string(),
        weight: shipment.weight().cloned(),
    }
}

/// 组内首张显式声明计价依据的卡决定依据，否则按方向推断
fn group_basis(group: &CardGroup<'_>, shipment: &Shipment) -> ZoneBasis {
    group
        .cards()
        .find_map(|c| match &c.pricing {
            Pricing::ZoneTiered(p) => p.zone_basis,
            _ => None,
        })
        .unwrap_or_else(|| ZoneBasis::for_direction(shipment.direction))
}

/// 先确认有卡覆盖 locus (否则 uncovered 错误)，再按重量筛选
fn select_card<'a>(
    group: &CardGroup<'a>,
    shipment: &Shipment,
    locus: &Locus,
    weight: &BigDecimal,
    uncovered: impl FnOnce() -> ResolutionError,
) -> Result<&'a RateCard, ResolutionError> {
    if group.candidates(locus, None).is_empty() {
        return Err(uncovered());
    }
    group
        .candidates(locus, Some(weight))
        .into_iter()
        .next()
        .ok_or_else(|| ResolutionError::NoApplicableRateCard {
            mode: shipment.mode,
            direction: shipment.direction,
            locus: locus.to_string(),
            weight: Some(weight.clone()),
        })
}

/// 分档计价: 档位内直接取价; 超出最高档位时按增量加收超重费
fn tier_lines(
    card: &RateCard,
    tiers: &TierTable,
    overage: Option<&OverageRule>,
    column: &str,
    weight: &BigDecimal,
) -> Result<Vec<ExpectedLine>, ResolutionError> {
    let billable = tiers.billable(weight);
    let unpublished = |at: &BigDecimal| ResolutionError::NoPublishedPrice {
        card: card.id.clone(),
        column: column.to_string(),
        weight: at.clone(),
    };
    let price_at = |row: &crate::models::PriceRow, at: &BigDecimal| {
        row.get(column).cloned().flatten().ok_or_else(|| unpublished(at))
    };

    let top = tiers.top().ok_or_else(|| unpublished(&billable))?;
    if billable <= top.weight_to {
        let bracket = tiers.get(weight).ok_or_else(|| unpublished(&billable))?;
        let price = price_at(&bracket.value, &billable)?;
        return Ok(vec![ExpectedLine {
            code: FREIGHT_CODE.to_string(),
            description: "Freight".to_string(),
            amount: money(&price),
            basis: format!("{}kg @ {}", billable, column),
            kind: LineKind::Freight,
        }]);
    }

    let overage = overage.ok_or_else(|| unpublished(&billable))?;
    let top_price = price_at(&top.value, &top.weight_to)?;
    let rate = overage
        .brackets
        .get(weight)
        .and_then(|b| b.value.get(column))
        .ok_or_else(|| unpublished(&billable))?;

    let excess = weight - &top.weight_to;
    let increments = &ceil_to_step(&excess, &overage.increment_kg) / &overage.increment_kg;
    let increments = increments.with_scale(0);
    let overage_amount = &increments * rate;

    Ok(vec![
        ExpectedLine {
            code: FREIGHT_CODE.to_string(),
            description: "Freight".to_string(),
            amount: money(&top_price),
            basis: format!("{}kg @ {}", top.weight_to, column),
            kind: LineKind::Freight,
        },
        ExpectedLine {
            code: FREIGHT_CODE.to_string(),
            description: "Freight overage".to_string(),
            amount: money(&overage_amount),
            basis: format!(
                "{} x {}kg over {}kg @ {}",
                increments, overage.increment_kg, top.weight_to, rate
            ),
            kind: LineKind::Overage,
        },
    ])
}

/// 固定费用行 (空运杂费 / 拼箱组件)
fn fixed_line(
    charge: &FixedCharge,
    shipment: &Shipment,
    weight: Option<&BigDecimal>,
) -> Result<ExpectedLine, ResolutionError> {
    let missing = |dimension: &str| ResolutionError::MissingDimension {
        mode: shipment.mode,
        dimension: dimension.to_string(),
    };
    let (amount, basis) = match &charge.basis {
        ChargeBasis::Flat { amount } => (amount.clone(), "flat".to_string()),
        ChargeBasis::PerKg { rate, minimum } => {
            let weight = weight.ok_or_else(|| missing("weight_kg"))?;
            floored(weight * rate, minimum.as_ref(), format!("{}kg @ {}/kg", weight, rate))
        }
        ChargeBasis::PerCbm { rate, minimum } => {
            let volume = shipment.volume().ok_or_else(|| missing("volume_cbm"))?;
            floored(volume * rate, minimum.as_ref(), format!("{}cbm @ {}/cbm", volume, rate))
        }
    };
    Ok(ExpectedLine {
        code: normalize_text(&charge.code),
        description: charge.description.clone(),
        amount: money(&amount),
        basis,
        kind: LineKind::Fixed,
    })
}

fn floored(amount: BigDecimal, minimum: Option<&BigDecimal>, basis: String) -> (BigDecimal, String) {
    match minimum {
        Some(min) if *min > amount => (min.clone(), format!("minimum {}", min)),
        _ => (amount, basis),
    }
}

/// 服务费金额; 重量门槛未超过时为 0
fn service_amount(
    shape: ChargeShape,
    minimum: Option<&BigDecimal>,
    applies_above_kg: Option<&BigDecimal>,
    shipment: &Shipment,
    base_freight: &BigDecimal,
) -> Result<(BigDecimal, String), OmissionReason> {
    if let Some(threshold) = applies_above_kg {
        let weight = shipment.weight().ok_or(OmissionReason::MissingWeight)?;
        if weight <= threshold {
            return Ok((BigDecimal::zero(), format!("not above {}kg", threshold)));
        }
    }

    let (amount, basis) = match shape {
        ChargeShape::Flat { amount } => (amount, "flat".to_string()),
        ChargeShape::PercentOfBase { percent } => (
            base_freight * &percent / BigDecimal::from(100),
            format!("{}% of {}", percent, base_freight),
        ),
        ChargeShape::PerKg { rate } => {
            let weight = shipment.weight().ok_or(OmissionReason::MissingWeight)?;
            (weight * &rate, format!("{}kg @ {}/kg", weight, rate))
        }
    };
    Ok(floored(amount, minimum, basis))
}
