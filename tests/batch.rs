mod common;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::Response;
use common::*;
use freight_audit_rust::api::handlers::{self, AuditRequest, BatchAuditRequest};
use freight_audit_rust::api::AppState;
use freight_audit_rust::models::{AuditStatus, Locality, Shipment};
use freight_audit_rust::{Auditor, BatchAuditor, RateCardStore, TolerancePolicy};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;

fn mixed_batch() -> Vec<Shipment> {
    vec![
        express_export("B1", city("Hong Kong", "HK"), "1.5", vec![charge("FRT", "16.47")]),
        express_export("B2", city("Hong Kong", "HK"), "1.5", vec![charge("FRT", "18.00")]),
        express_export("B3", city("Hong Kong", "HK"), "1.5", vec![charge("FRT", "25.00")]),
        express_export("B4", Locality::city("Atlantis", ""), "1.5", vec![charge("FRT", "10.00")]),
        express_domestic("B5", "Melbourne", "Sydney", "1.5", vec![charge("FRT", "16.00")]),
    ]
}

#[test]
fn batch_counts_every_outcome_in_input_order() {
    let batch = BatchAuditor::new(3, TolerancePolicy::default()).unwrap();
    assert_eq!(batch.workers(), 3);

    let report = batch.run(snapshot(), &mixed_batch());
    assert_eq!(report.total, 5);
    assert_eq!(report.passed, 2);
    assert_eq!(report.review, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.unresolvable, 1);
    assert_eq!(report.snapshot_version, 1);

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.shipment_id()).collect();
    assert_eq!(ids, vec!["B1", "B2", "B3", "B4", "B5"]);
    assert_eq!(report.outcomes[2].status(), Some(AuditStatus::Fail));
    assert_eq!(report.outcomes[3].status(), None);

    // 金额只统计已审计的票
    assert_eq!(report.expected_total, d("65.88"));
    assert_eq!(report.actual_total, d("75.47"));
    assert_eq!(report.variance_total, d("9.59"));
}

#[test]
fn batch_matches_sequential_audit() {
    let snapshot = snapshot();
    let shipments: Vec<Shipment> = (0..250)
        .map(|i| {
            let weight = format!("{}.5", i % 40);
            express_export(&format!("P{}", i), city("Hong Kong", "HK"), &weight, vec![charge("FRT", "50.00")])
        })
        .collect();

    let report = BatchAuditor::new(4, TolerancePolicy::default())
        .unwrap()
        .run(snapshot.clone(), &shipments);

    let auditor = Auditor::default();
    for (shipment, outcome) in shipments.iter().zip(&report.outcomes) {
        let sequential = auditor.audit(&snapshot, shipment);
        assert_eq!(outcome.shipment_id(), sequential.shipment_id());
        assert_eq!(outcome.status(), sequential.status());
        assert_eq!(
            outcome.verdict().map(|v| &v.expected_total),
            sequential.verdict().map(|v| &v.expected_total)
        );
    }
}

#[test]
fn csv_export_has_one_row_per_shipment() {
    let batch = BatchAuditor::new(2, TolerancePolicy::default()).unwrap();
    let report = batch.run(snapshot(), &mixed_batch());

    let mut buf = Vec::new();
    report.write_csv(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "shipment_id,status,expected_total,actual_total,variance,variance_percent,confidence,rate_card_id,unaudited_lines,error"
    );
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[2], "B2,REVIEW,16.47,18.00,1.53,9.29,HIGH,express-export-2024,0,");
    assert!(lines[4].starts_with("B4,UNRESOLVABLE,,,,,,,0,"));
}

fn state(store: RateCardStore) -> AppState {
    AppState {
        store: Arc::new(store),
        auditor: Arc::new(Auditor::default()),
        batch: Arc::new(BatchAuditor::new(2, TolerancePolicy::default()).unwrap()),
    }
}

async fn body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn audit_requires_a_published_snapshot() {
    let state = state(RateCardStore::new(2));
    let req = AuditRequest {
        shipment: mixed_batch().remove(0),
        snapshot_version: None,
    };
    let (status, json) = body(handlers::audit_shipment(State(state.clone()), Json(req)).await).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (status, _) = body(handlers::current_rate_cards(State(state)).await).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn publish_then_audit_over_the_api() {
    let state = state(RateCardStore::new(2));

    let (status, json) = body(handlers::publish_rate_cards(State(state.clone()), Json(dataset())).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["version"], 1);

    let req = AuditRequest {
        shipment: mixed_batch().remove(1),
        snapshot_version: Some(1),
    };
    let (status, json) = body(handlers::audit_shipment(State(state.clone()), Json(req)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "AUDITED");
    assert_eq!(json["data"]["status"], "REVIEW");
    assert_eq!(json["data"]["expected_total"], "16.47");

    let req = AuditRequest {
        shipment: mixed_batch().remove(0),
        snapshot_version: Some(9),
    };
    let (status, _) = body(handlers::audit_shipment(State(state.clone()), Json(req)).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = BatchAuditRequest {
        shipments: mixed_batch(),
        snapshot_version: None,
    };
    let (status, json) = body(handlers::audit_batch(State(state), Json(req)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 5);
    assert_eq!(json["data"]["unresolvable"], 1);
}

#[tokio::test]
async fn invalid_dataset_is_rejected_with_reason() {
    let state = state(store());
    let mut bad = dataset();
    bad.zone_tables.clear();

    let (status, json) = body(handlers::publish_rate_cards(State(state.clone()), Json(bad)).await).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["data"]["kind"], "unknown_zone_table");

    let (status, json) = body(handlers::current_rate_cards(State(state)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["version"], 1);
}
