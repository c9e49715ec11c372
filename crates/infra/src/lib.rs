//! Infrastructure layer: event store, command dispatch, projections, and the
//! application services that tie the clinic domains together.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;

#[cfg(test)]
mod integration_tests;

/// Stream type for appointment aggregates.
pub const APPOINTMENT_AGGREGATE: &str = "appointments.appointment";

/// Stream type for inventory item aggregates.
pub const INVENTORY_AGGREGATE: &str = "inventory.item";

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use services::{
    AppointmentLedger, ConsumptionForecaster, InMemoryProfileStore, InventoryReconciler, Pipeline,
    ProfileStore,
};
