pub mod loader;
pub mod registry;
pub mod snapshot;

pub use loader::{load_dataset, load_shipments};
pub use registry::RateCardStore;
pub use snapshot::{CardGroup, CardSummary, RateCardDataset, RateCardSnapshot, SnapshotSummary};
