pub mod auditor;
pub mod batch;
pub mod engine;
pub mod geo;
pub mod variance;

pub use auditor::Auditor;
pub use batch::BatchAuditor;
pub use engine::RateEngine;
pub use geo::GeoResolver;
pub use variance::{evaluate, TolerancePolicy};
