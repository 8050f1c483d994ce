#![allow(dead_code)]

use bigdecimal::BigDecimal;
use freight_audit_rust::models::{
    AuditOutcome, AuditVerdict, ChargeLine, ContainerCount, ContainerType, Locality,
    ServiceDirection, Shipment, TransportMode,
};
use freight_audit_rust::{load_dataset, RateCardDataset, RateCardSnapshot, RateCardStore};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub fn d(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/rate_cards.json")
}

pub fn dataset() -> RateCardDataset {
    load_dataset(fixture_path()).expect("fixture dataset should parse")
}

pub fn store() -> RateCardStore {
    let store = RateCardStore::new(3);
    store.publish(dataset()).expect("fixture dataset should validate");
    store
}

pub fn snapshot() -> Arc<RateCardSnapshot> {
    store().current().unwrap()
}

pub fn city(name: &str, country: &str) -> Locality {
    Locality::city(name, country)
}

pub fn charge(code: &str, amount: &str) -> ChargeLine {
    ChargeLine::new(code, d(amount), "AUD")
}

pub fn described(description: &str, amount: &str) -> ChargeLine {
    let mut line = ChargeLine::new("", d(amount), "AUD");
    line.description = description.to_string();
    line
}

pub fn shipment(
    id: &str,
    mode: TransportMode,
    direction: ServiceDirection,
    origin: Locality,
    destination: Locality,
) -> Shipment {
    Shipment {
        id: id.to_string(),
        origin,
        destination,
        mode,
        direction,
        weight_kg: None,
        volume_cbm: None,
        containers: Vec::new(),
        product: None,
        charges: Vec::new(),
    }
}

pub fn express_export(id: &str, destination: Locality, weight: &str, charges: Vec<ChargeLine>) -> Shipment {
    let mut s = shipment(
        id,
        TransportMode::Express,
        ServiceDirection::Export,
        city("Melbourne", "AU"),
        destination,
    );
    s.weight_kg = Some(d(weight));
    s.charges = charges;
    s
}

pub fn express_domestic(id: &str, origin: &str, destination: &str, weight: &str, charges: Vec<ChargeLine>) -> Shipment {
    let mut s = shipment(
        id,
        TransportMode::Express,
        ServiceDirection::Domestic,
        city(origin, "AU"),
        city(destination, "AU"),
    );
    s.weight_kg = Some(d(weight));
    s.charges = charges;
    s
}

pub fn air(id: &str, origin: &str, destination: &str, weight: &str, charges: Vec<ChargeLine>) -> Shipment {
    let mut s = shipment(
        id,
        TransportMode::Air,
        ServiceDirection::Import,
        city(origin, "CN"),
        city(destination, "AU"),
    );
    s.weight_kg = Some(d(weight));
    s.charges = charges;
    s
}

pub fn fcl(id: &str, containers: &[(ContainerType, u32)], charges: Vec<ChargeLine>) -> Shipment {
    let mut s = shipment(
        id,
        TransportMode::OceanFcl,
        ServiceDirection::Import,
        Locality::port("CNSHA"),
        Locality::port("AUMEL"),
    );
    s.containers = containers
        .iter()
        .map(|(container, count)| ContainerCount {
            container: *container,
            count: *count,
        })
        .collect();
    s.charges = charges;
    s
}

pub fn verdict(outcome: AuditOutcome) -> AuditVerdict {
    match outcome {
        AuditOutcome::Audited(v) => v,
        AuditOutcome::Unresolvable { shipment_id, error } => {
            panic!("{} should be audited, got {}", shipment_id, error)
        }
    }
}
