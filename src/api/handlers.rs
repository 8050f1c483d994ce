use crate::api::AppState;
use crate::error::AuditError;
use crate::models::{AuditOutcome, BatchReport, Shipment};
use crate::store::{RateCardDataset, SnapshotSummary};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// 单票审计请求
#[derive(Debug, Deserialize)]
pub struct AuditRequest {
    pub shipment: Shipment,
    #[serde(default)]
    pub snapshot_version: Option<u64>,
}

/// 批量审计请求
#[derive(Debug, Deserialize)]
pub struct BatchAuditRequest {
    pub shipments: Vec<Shipment>,
    #[serde(default)]
    pub snapshot_version: Option<u64>,
}

/// 统一响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn ok<T: Serialize>(message: String, data: T) -> Response {
    let response = ApiResponse {
        success: true,
        message,
        data: Some(data),
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn fail<T: Serialize>(status: StatusCode, message: String, data: Option<T>) -> Response {
    let response = ApiResponse {
        success: false,
        message,
        data,
    };
    (status, Json(response)).into_response()
}

fn status_for(error: &AuditError) -> StatusCode {
    match error {
        AuditError::NoSnapshot => StatusCode::CONFLICT,
        AuditError::UnknownVersion(_) => StatusCode::NOT_FOUND,
        AuditError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: AuditError) -> Response {
    fail::<()>(status_for(&error), format!("Error: {}", error), None)
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 发布费率数据集 (校验失败整版拒绝)
pub async fn publish_rate_cards(
    State(state): State<AppState>,
    Json(dataset): Json<RateCardDataset>,
) -> Response {
    match state.store.publish(dataset) {
        Ok(snapshot) => ok(
            format!("Published rate card snapshot v{}", snapshot.version),
            snapshot.summary(),
        ),
        Err(e) => {
            tracing::warn!("[RateCards] 数据集被拒绝: {}", e);
            fail(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Rate card configuration error: {}", e),
                Some(e),
            )
        }
    }
}

/// 当前快照概要
pub async fn current_rate_cards(State(state): State<AppState>) -> Response {
    match state.store.snapshot(None) {
        Ok(snapshot) => {
            let summary: SnapshotSummary = snapshot.summary();
            ok(format!("Current snapshot v{}", summary.version), summary)
        }
        Err(e) => error_response(e),
    }
}

/// 单票审计
pub async fn audit_shipment(State(state): State<AppState>, Json(req): Json<AuditRequest>) -> Response {
    let snapshot = match state.store.snapshot(req.snapshot_version) {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(e),
    };

    let outcome: AuditOutcome = state.auditor.audit(&snapshot, &req.shipment);
    let message = match outcome.status() {
        Some(status) => format!("Shipment {} audited: {}", req.shipment.id, status.as_str()),
        None => format!("Shipment {} is unresolvable", req.shipment.id),
    };
    ok(message, outcome)
}

/// 批量审计 (在阻塞线程上运行 rayon 线程池)
pub async fn audit_batch(State(state): State<AppState>, Json(req): Json<BatchAuditRequest>) -> Response {
    let snapshot = match state.store.snapshot(req.snapshot_version) {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(e),
    };

    let batch = state.batch.clone();
    let shipments = req.shipments;
    let joined = tokio::task::spawn_blocking(move || batch.run(snapshot, &shipments)).await;

    match joined {
        Ok(report) => {
            let report: BatchReport = report;
            ok(
                format!(
                    "Audited {} shipments: {} passed, {} review, {} failed, {} unresolvable",
                    report.total, report.passed, report.review, report.failed, report.unresolvable
                ),
                report,
            )
        }
        Err(e) => fail::<()>(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: batch worker failed: {}", e),
            None,
        ),
    }
}
