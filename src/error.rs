use crate::models::{Locality, ServiceDirection, TransportMode};
use bigdecimal::BigDecimal;
use serde::Serialize;
use thiserror::Error;

/// 费率卡数据集校验错误 - 整个版本拒绝加载
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("{table}: bracket table is empty")]
    EmptyBrackets { table: String },

    #[error("{table}: step must be positive, got {step}")]
    NonPositiveStep { table: String, step: BigDecimal },

    #[error("{table}: row {index} has weight_from {from} > weight_to {to}")]
    InvertedBracket {
        table: String,
        index: usize,
        from: BigDecimal,
        to: BigDecimal,
    },

    #[error("{table}: row {index} starts below zero ({from})")]
    NegativeWeight {
        table: String,
        index: usize,
        from: BigDecimal,
    },

    #[error("{table}: rows overlap ({previous_to} >= {next_from})")]
    OverlappingBrackets {
        table: String,
        previous_to: BigDecimal,
        next_from: BigDecimal,
    },

    #[error("{table}: gap between {previous_to} and {next_from}")]
    BracketGap {
        table: String,
        previous_to: BigDecimal,
        next_from: BigDecimal,
    },

    #[error("{table}: negative price {price} for zone {zone}")]
    NegativePrice {
        table: String,
        zone: String,
        price: BigDecimal,
    },

    #[error("{table}: rate for zone {zone} must be positive, got {rate}")]
    NonPositiveRate {
        table: String,
        zone: String,
        rate: BigDecimal,
    },

    #[error("{table}: overage starts at {first_from}, not above top tier {top_tier}")]
    OverageBelowTopTier {
        table: String,
        top_tier: BigDecimal,
        first_from: BigDecimal,
    },

    #[error("rate card {card}: zone matrix has no cell for {origin} x {destination}")]
    MatrixNotTotal {
        card: String,
        origin: String,
        destination: String,
    },

    #[error("rate card {card}: matrix cell {origin} x {destination} declared twice")]
    DuplicateMatrixCell {
        card: String,
        origin: String,
        destination: String,
    },

    #[error("rate card {card}: zone {zone} is outside the declared matrix range")]
    ZoneOutsideMatrix { card: String, zone: String },

    #[error("rate card {card}: rate zone {label} has no price column")]
    UnknownRateZone { card: String, label: String },

    #[error("rate card {card}: unknown zone table {table}")]
    UnknownZoneTable { card: String, table: String },

    #[error("rate card {card}: {strategy} pricing requires a zone table")]
    MissingZoneTable { card: String, strategy: String },

    #[error("{mode:?}/{direction:?} cards reference different zone tables ({first} vs {second})")]
    MixedZoneTables {
        mode: TransportMode,
        direction: Option<ServiceDirection>,
        first: String,
        second: String,
    },

    #[error("zone table {table} is shared by domestic and third-party cards")]
    SharedZoneNamespace { table: String },

    #[error("rate card {card}: {mode:?} cannot be priced with {pricing} pricing")]
    PricingMismatch {
        card: String,
        mode: TransportMode,
        pricing: String,
    },

    #[error("rate card {card}: lane {origin} -> {destination} declared twice")]
    DuplicateLane {
        card: String,
        origin: String,
        destination: String,
    },

    #[error("rate card {card}: charge {code} has a negative amount")]
    NegativeCharge { card: String, code: String },

    #[error("duplicate rate card id {id}")]
    DuplicateCard { id: String },

    #[error("duplicate zone table {name}")]
    DuplicateZoneTable { name: String },

    #[error("{mode:?} schedule: service code {key} declared twice")]
    DuplicateServiceCharge { mode: TransportMode, key: String },

    #[error("{mode:?} schedule: {code} has two variants with the same applicability")]
    AmbiguousServiceCharge { mode: TransportMode, code: String },

    #[error("{mode:?} schedule: {key} has a negative amount")]
    NegativeServiceCharge { mode: TransportMode, key: String },

    #[error("invalid thresholds: pass {pass} must be within 0..=review {review}")]
    InvalidThresholds { pass: BigDecimal, review: BigDecimal },
}

/// 单票解析失败 - 以 UNRESOLVABLE 结果上报，不得退化为 PASS
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("{mode:?} shipments cannot be billed as {direction:?}")]
    UnsupportedCombination {
        mode: TransportMode,
        direction: ServiceDirection,
    },

    #[error("no rate card available for {mode:?}/{direction:?}")]
    NoRateCard {
        mode: TransportMode,
        direction: ServiceDirection,
    },

    #[error("no rate card for {mode:?}/{direction:?} covers {locus} at {weight:?}kg")]
    NoApplicableRateCard {
        mode: TransportMode,
        direction: ServiceDirection,
        locus: String,
        weight: Option<BigDecimal>,
    },

    #[error("locality '{locality}' not found in zone table {table}")]
    ZoneNotFound { table: String, locality: String },

    #[error("no rate zone for {origin} x {destination}")]
    UnmappedZonePair { origin: String, destination: String },

    #[error("{mode:?} shipment is missing {dimension}")]
    MissingDimension {
        mode: TransportMode,
        dimension: String,
    },

    #[error("rate card {card}: no published price for {column} at {weight}kg")]
    NoPublishedPrice {
        card: String,
        column: String,
        weight: BigDecimal,
    },

    #[error("rate card {card}: no {container} rate on lane {origin} -> {destination}")]
    NoContainerRate {
        card: String,
        container: String,
        origin: String,
        destination: String,
    },
}

impl ResolutionError {
    pub fn zone_not_found(table: &str, locality: &Locality) -> Self {
        Self::ZoneNotFound {
            table: table.to_string(),
            locality: locality.to_string(),
        }
    }
}

/// 审计服务错误
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Rate card configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("No rate card snapshot loaded")]
    NoSnapshot,

    #[error("Rate card snapshot version {0} not found")]
    UnknownVersion(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AuditError>;
