//! Shared dispatch + projection pipeline.
//!
//! Committed events are applied to the in-process projections synchronously
//! after each dispatch, so a service query issued right after a command sees
//! the command's effect. The bus still carries every envelope for external
//! subscribers; projections stay idempotent, so seeing an envelope twice
//! (once synchronously, once via the bus) is harmless.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use vetledger_appointments::{AppointmentId, AppointmentSnapshot};
use vetledger_core::{Aggregate, AggregateId, DomainError};
use vetledger_events::{EventBus, EventEnvelope};
use vetledger_inventory::InventoryItemId;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{AppointmentDirectory, ConsumptionLog, StockLevel, StockLevels};
use crate::read_model::{InMemoryKeyedStore, KeyedStore};

type DirectoryStore = Arc<dyn KeyedStore<AppointmentId, AppointmentSnapshot>>;
type StockStore = Arc<dyn KeyedStore<InventoryItemId, StockLevel>>;

/// Dispatcher plus the projections every service reads from.
pub struct Pipeline<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    directory: AppointmentDirectory<DirectoryStore>,
    stock: StockLevels<StockStore>,
    consumption: ConsumptionLog,
}

impl<S, B> Pipeline<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        let directory_store: DirectoryStore = Arc::new(InMemoryKeyedStore::new());
        let stock_store: StockStore = Arc::new(InMemoryKeyedStore::new());
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            directory: AppointmentDirectory::new(directory_store),
            stock: StockLevels::new(stock_store),
            consumption: ConsumptionLog::new(),
        }
    }

    pub fn directory(&self) -> &AppointmentDirectory<DirectoryStore> {
        &self.directory
    }

    pub fn stock(&self) -> &StockLevels<StockStore> {
        &self.stock
    }

    pub fn consumption(&self) -> &ConsumptionLog {
        &self.consumption
    }
}

impl<S, B> Pipeline<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command, then fold the committed events into the
    /// projections before returning.
    pub fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: vetledger_events::Event + Serialize + DeserializeOwned,
    {
        let committed =
            self.dispatcher
                .dispatch(aggregate_id, aggregate_type, command, make_aggregate)?;
        self.project(&committed)?;
        Ok(committed)
    }

    fn project(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            let envelope = stored.to_envelope();
            self.directory
                .apply_envelope(&envelope)
                .map_err(|e| DispatchError::Publish(e.to_string()))?;
            self.stock
                .apply_envelope(&envelope)
                .map_err(|e| DispatchError::Publish(e.to_string()))?;
            self.consumption
                .apply_envelope(&envelope)
                .map_err(|e| DispatchError::Publish(e.to_string()))?;
        }
        Ok(())
    }

    /// Rebuild every projection from the full event history.
    pub fn rebuild_projections(&self) -> Result<(), DispatchError> {
        let all = self.dispatcher.store().load_all()?;
        let envelopes: Vec<_> = all.iter().map(|e| e.to_envelope()).collect();

        self.directory
            .rebuild_from_scratch(envelopes.clone())
            .map_err(|e| DispatchError::Publish(e.to_string()))?;
        self.stock
            .rebuild_from_scratch(envelopes.clone())
            .map_err(|e| DispatchError::Publish(e.to_string()))?;
        self.consumption
            .rebuild_from_scratch(envelopes)
            .map_err(|e| DispatchError::Publish(e.to_string()))?;
        Ok(())
    }
}
