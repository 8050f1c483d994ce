pub mod handlers;

pub use handlers::{
    audit_batch, audit_shipment, current_rate_cards, health_check, publish_rate_cards,
};

use crate::service::{Auditor, BatchAuditor};
use crate::store::RateCardStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RateCardStore>,
    pub auditor: Arc<Auditor>,
    pub batch: Arc<BatchAuditor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/rate-cards", post(publish_rate_cards))
        .route("/api/rate-cards/current", get(current_rate_cards))
        .route("/api/audit", post(audit_shipment))
        .route("/api/audit/batch", post(audit_batch))
        .with_state(state)
        .layer(ServiceBuilder::new())
}
