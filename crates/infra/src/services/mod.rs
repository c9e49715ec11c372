//! Application services: command orchestration plus synchronous read-model
//! maintenance over the event-sourcing pipeline.

pub mod forecaster;
pub mod ledger;
pub mod pipeline;
pub mod profiles;
pub mod reconciler;

pub use forecaster::ConsumptionForecaster;
pub use ledger::AppointmentLedger;
pub use pipeline::Pipeline;
pub use profiles::{InMemoryProfileStore, ProfileStore};
pub use reconciler::InventoryReconciler;
