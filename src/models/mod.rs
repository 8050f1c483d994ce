pub mod amount;
pub mod batch;
pub mod rate_card;
pub mod service_charge;
pub mod shipment;
pub mod verdict;
pub mod zone;

pub use batch::BatchReport;
pub use rate_card::{
    AirLane, AirPricing, Bracket, BracketTable, ChargeBasis, ContainerRate, FclComponent,
    FclLane, FclPricing, FixedCharge, Lane, LclLane, LclPricing, Locus, MatrixCell,
    OverageRule, PriceRow, Pricing, RateCard, RateRow, TierTable, ZoneBasis, ZoneMatrix,
    ZoneMatrixPricing, ZoneTieredPricing,
};
pub use service_charge::{
    Applicability, ChargeContext, ChargeShape, ServiceChargeEntry, ServiceChargeSchedule,
};
pub use shipment::{
    normalize_text, ChargeLine, ContainerCount, ContainerType, Locality, ServiceDirection,
    Shipment, TransportMode,
};
pub use verdict::{
    AuditOutcome, AuditStatus, AuditVerdict, ExpectedCharges, ExpectedLine, LineKind,
    LineOmission, LineVariance, OmissionReason, PricingStrategy, UnauditedLine, FREIGHT_CODE,
};
pub use zone::{Confidence, EntryKind, Specificity, ZoneEntry, ZoneMatch, ZoneTable};
