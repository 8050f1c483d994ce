mod common;

use common::*;
use freight_audit_rust::models::{
    AuditStatus, Confidence, ContainerType, LineKind, Locality, OmissionReason, PricingStrategy,
    ServiceDirection, TransportMode,
};
use freight_audit_rust::{Auditor, RateEngine, ResolutionError, TolerancePolicy};
use pretty_assertions::assert_eq;

fn engine() -> RateEngine {
    RateEngine::new(snapshot())
}

fn amounts(expected: &freight_audit_rust::models::ExpectedCharges) -> Vec<(String, String)> {
    expected
        .lines
        .iter()
        .map(|l| (l.code.clone(), l.amount.to_string()))
        .collect()
}

#[test]
fn overage_is_emitted_as_separate_freight_line() {
    let s = express_export("E1", city("Hong Kong", "HK"), "45.2", vec![]);
    let expected = engine().compute_expected(&s).unwrap();

    // 45.2 - 30 = 15.2kg -> 31 个 0.5kg 增量 @ 2.20
    assert_eq!(expected.lines.len(), 2);
    assert_eq!(expected.lines[0].kind, LineKind::Freight);
    assert_eq!(expected.lines[0].amount, d("85.00"));
    assert_eq!(expected.lines[1].kind, LineKind::Overage);
    assert_eq!(expected.lines[1].amount, d("68.20"));
    assert_eq!(expected.total, d("153.20"));
}

#[test]
fn overage_rate_follows_the_bracket_of_the_weight() {
    let s = express_export("E2", city("Hong Kong", "HK"), "80", vec![]);
    let expected = engine().compute_expected(&s).unwrap();
    // 50kg 超重 = 100 个增量 @ 2.00 (70.1-300 区间)
    assert_eq!(expected.lines[1].amount, d("200.00"));
    assert_eq!(expected.total, d("285.00"));
}

#[test]
fn import_without_direction_card_uses_fallback_and_origin_zone() {
    let mut s = express_export("E3", city("Melbourne", "AU"), "2.0", vec![charge("FRT", "45.00")]);
    s.direction = ServiceDirection::Import;
    s.origin = Locality {
        city: Some("Pudong, China".to_string()),
        port: None,
        country: None,
    };

    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(expected.rate_card_id, "express-fallback-2023");
    assert_eq!(expected.strategy, PricingStrategy::ZoneTiered);
    assert_eq!(expected.total, d("45.00"));
    assert_eq!(expected.origin_match.as_ref().map(|m| m.zone.as_str()), Some("3"));
    assert!(expected.destination_match.is_none());
    assert_eq!(expected.confidence, Confidence::Low);
}

#[test]
fn unpublished_cell_falls_through_to_fallback_card() {
    // 美国 (分区 5) 在 2.0-30kg 档没有公布价格
    let s = express_export("E4", city("New York", "United States"), "10", vec![]);
    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(expected.rate_card_id, "express-fallback-2023");
    assert_eq!(expected.total, d("95.00"));
}

#[test]
fn third_party_prices_through_its_own_matrix() {
    let mut s = express_export("E5", city("Berlin", "DE"), "1.0", vec![]);
    s.direction = ServiceDirection::ThirdParty;
    s.origin = city("Hong Kong", "HK");

    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(expected.rate_card_id, "express-3rd-2024");
    assert_eq!(expected.strategy, PricingStrategy::ZoneMatrix);
    assert_eq!(expected.total, d("40.00"));
    assert_eq!(expected.confidence, Confidence::Low);
}

#[test]
fn air_lane_applies_minimum_and_fixed_charges() {
    let light = air("A1", "Shanghai", "Melbourne", "10", vec![]);
    let expected = engine().compute_expected(&light).unwrap();
    assert_eq!(amounts(&expected), vec![("FRT".to_string(), "120.00".to_string())]);

    let s = air("A2", "PUDONG", "Sydney", "79.3", vec![]);
    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(
        amounts(&expected),
        vec![
            ("FRT".to_string(), "600.00".to_string()),
            ("SEC".to_string(), "30.00".to_string()),
            ("PUP".to_string(), "85.00".to_string()),
        ]
    );
    assert_eq!(expected.total, d("715.00"));
    assert_eq!(expected.confidence, Confidence::Medium);
}

#[test]
fn lcl_components_respect_minimums() {
    let mut s = shipment(
        "L1",
        TransportMode::OceanLcl,
        ServiceDirection::Import,
        Locality::port("CNSHA"),
        Locality::port("AUSYD"),
    );
    s.volume_cbm = Some(d("2.5"));
    assert_eq!(engine().compute_expected(&s).unwrap().total, d("340.00"));

    s.volume_cbm = Some(d("0.5"));
    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(
        amounts(&expected),
        vec![
            ("FRT".to_string(), "85.00".to_string()),
            ("CFS".to_string(), "40.00".to_string()),
            ("DOC".to_string(), "65.00".to_string()),
        ]
    );
}

#[test]
fn service_charges_resolve_by_context_and_description() {
    let s = express_export(
        "SC1",
        city("Hong Kong", "HK"),
        "1.5",
        vec![
            charge("FRT", "16.47"),
            charge("OO", "40.00"),
            charge("CR", "2.00"),
            charge("YY", "90.00"),
            described("Remote Area Delivery surcharge", "40.00"),
            charge("FSC", "3.10"),
        ],
    );
    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(
        amounts(&expected),
        vec![
            ("FRT".to_string(), "16.47".to_string()),
            ("OO".to_string(), "40.00".to_string()),
            ("CR".to_string(), "2.00".to_string()),
            ("YY".to_string(), "0.00".to_string()),
            ("REMOTE AREA DELIVERY SURCHARGE".to_string(), "40.00".to_string()),
        ]
    );
    assert!(expected.omissions.is_empty());

    let domestic = express_domestic("SC2", "Sydney", "Perth", "1.0", vec![charge("OO", "25.00")]);
    let expected = engine().compute_expected(&domestic).unwrap();
    let oo = expected.lines.iter().find(|l| l.code == "OO").unwrap();
    assert_eq!(oo.amount, d("25.00"));
}

#[test]
fn unresolvable_lines_become_omissions_not_failures() {
    let mut foreign = charge("SF", "5.50");
    foreign.currency = "USD".to_string();
    let s = express_export(
        "SC3",
        city("Hong Kong", "HK"),
        "1.5",
        vec![
            charge("FRT", "16.47"),
            charge("ZZ", "12.00"),
            charge("NN", "15.00"),
            foreign,
        ],
    );
    let expected = engine().compute_expected(&s).unwrap();
    let reasons: Vec<(String, OmissionReason)> = expected
        .omissions
        .iter()
        .map(|o| (o.key.clone(), o.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("ZZ".to_string(), OmissionReason::UnknownServiceCode),
            ("NN".to_string(), OmissionReason::UnpricedCharge),
            ("SF".to_string(), OmissionReason::CurrencyMismatch),
        ]
    );

    let v = verdict(Auditor::default().audit(&snapshot(), &s));
    assert_eq!(v.status, AuditStatus::Pass);
    assert_eq!(v.unaudited.len(), 3);
    assert_eq!(v.actual_total, d("16.47"));
}

#[test]
fn product_specific_variant_applies_with_matching_product() {
    let mut s = express_export("SC4", city("Hong Kong", "HK"), "1.5", vec![charge("NN", "15.00")]);
    s.product = Some("Express Economy Select".to_string());
    let expected = engine().compute_expected(&s).unwrap();
    assert!(expected.omissions.is_empty());
    assert_eq!(expected.lines.last().unwrap().amount, d("15.00"));
}

#[test]
fn per_kg_schedule_entry_uses_minimum() {
    let s = air("SC5", "Shanghai", "Melbourne", "80", vec![charge("SCR", "25.00"), charge("DGR", "150.00")]);
    let expected = engine().compute_expected(&s).unwrap();
    assert_eq!(
        amounts(&expected)[1..].to_vec(),
        vec![
            ("SCR".to_string(), "25.00".to_string()),
            ("DGR".to_string(), "150.00".to_string()),
        ]
    );
}

#[test]
fn resolution_failures_are_reported() {
    let engine = engine();

    let mut no_weight = express_export("F1", city("Hong Kong", "HK"), "1", vec![]);
    no_weight.weight_kg = None;
    assert!(matches!(
        engine.compute_expected(&no_weight),
        Err(ResolutionError::MissingDimension { .. })
    ));

    let nowhere = express_export("F2", Locality::city("Atlantis", ""), "1", vec![]);
    assert!(matches!(
        engine.compute_expected(&nowhere),
        Err(ResolutionError::ZoneNotFound { .. })
    ));

    let heavy = express_export("F3", city("Hong Kong", "HK"), "400", vec![]);
    assert!(matches!(
        engine.compute_expected(&heavy),
        Err(ResolutionError::NoApplicableRateCard { .. })
    ));

    let mut unsupported = express_domestic("F4", "Melbourne", "Sydney", "1", vec![]);
    unsupported.mode = TransportMode::Domestic;
    unsupported.direction = ServiceDirection::Export;
    assert!(matches!(
        engine.compute_expected(&unsupported),
        Err(ResolutionError::UnsupportedCombination { .. })
    ));

    unsupported.direction = ServiceDirection::Domestic;
    assert!(matches!(
        engine.compute_expected(&unsupported),
        Err(ResolutionError::NoRateCard { .. })
    ));

    let hc = fcl("F5", &[(ContainerType::Hc40, 1)], vec![]);
    assert!(matches!(
        engine.compute_expected(&hc),
        Err(ResolutionError::NoContainerRate { .. })
    ));

    let empty = fcl("F6", &[(ContainerType::Ft20, 0)], vec![]);
    assert!(matches!(
        engine.compute_expected(&empty),
        Err(ResolutionError::MissingDimension { .. })
    ));

    let other_lane = air("F7", "Melbourne", "Sydney", "10", vec![]);
    assert!(matches!(
        engine.compute_expected(&other_lane),
        Err(ResolutionError::NoApplicableRateCard { .. })
    ));
}

#[test]
fn unresolvable_shipment_is_a_distinct_outcome() {
    let s = express_export("U1", Locality::city("Atlantis", ""), "1", vec![charge("FRT", "1.00")]);
    let outcome = Auditor::new(TolerancePolicy::default()).audit(&snapshot(), &s);
    assert_eq!(outcome.status(), None);
    assert_eq!(outcome.shipment_id(), "U1");

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "UNRESOLVABLE");
    assert_eq!(json["error"]["kind"], "zone_not_found");
}

#[test]
fn matrix_without_cell_for_pair_is_unmapped() {
    use chrono::Utc;
    use freight_audit_rust::models::Pricing;
    use freight_audit_rust::RateCardSnapshot;
    use indexmap::IndexMap;
    use std::sync::Arc;

    // 直接构造快照以绕过发布时的矩阵完整性校验
    let mut data = dataset();
    for card in data.cards.iter_mut() {
        if let Pricing::ZoneMatrix(p) = &mut card.pricing {
            p.matrix.cells.retain(|c| !(c.origin == "2" && c.destination == "4"));
        }
    }
    let snapshot = RateCardSnapshot {
        version: 99,
        loaded_at: Utc::now(),
        label: None,
        zone_tables: data.zone_tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        cards: data.cards,
        schedules: IndexMap::new(),
    };

    let s = express_domestic("M1", "Brisbane", "Canberra", "1.0", vec![]);
    let err = RateEngine::new(Arc::new(snapshot)).compute_expected(&s).unwrap_err();
    assert_eq!(
        err,
        ResolutionError::UnmappedZonePair {
            origin: "2".to_string(),
            destination: "4".to_string(),
        }
    );
}

#[test]
fn described_freight_line_is_audited_as_freight() {
    let s = express_export(
        "FR1",
        city("Hong Kong", "HK"),
        "1.5",
        vec![described("EXPRESS WORLDWIDE NONDOC", "500.00")],
    );
    let expected = engine().compute_expected(&s).unwrap();
    assert!(expected.omissions.is_empty());

    let v = verdict(Auditor::default().audit(&snapshot(), &s));
    assert_eq!(v.expected_total, d("16.47"));
    assert_eq!(v.actual_total, d("500.00"));
    assert_eq!(v.status, AuditStatus::Fail);
    assert!(v.unaudited.is_empty());
    assert!(!v.freight_unmatched);
}

#[test]
fn freight_in_foreign_currency_goes_to_review() {
    let mut usd = charge("FRT", "500.00");
    usd.currency = "USD".to_string();
    let s = express_export("FR2", city("Hong Kong", "HK"), "1.5", vec![usd]);

    let v = verdict(Auditor::default().audit(&snapshot(), &s));
    assert_eq!(v.status, AuditStatus::Review);
    assert!(v.freight_unmatched);
    assert_eq!(v.expected_total, d("0.00"));
    assert_eq!(v.unaudited.len(), 1);
    assert_eq!(v.unaudited[0].reason, OmissionReason::CurrencyMismatch);
}
