//! On-hand stock projection.
//!
//! On-hand stock is a derived number with two inputs: administrative events
//! from the inventory catalog (register, restock, override) and confirmed
//! consumption from appointments. Confirmation events carry the item and
//! quantity, and each one is applied exactly once per stream position, so a
//! republished or replayed confirmation never deducts twice.

use serde_json::Value as JsonValue;
use thiserror::Error;

use vetledger_appointments::AppointmentEvent;
use vetledger_events::EventEnvelope;
use vetledger_inventory::{ForecastParams, InventoryEvent, InventoryItemId};

use crate::projections::cursor::{CursorDecision, CursorError, StreamCursors};
use crate::read_model::KeyedStore;
use crate::{APPOINTMENT_AGGREGATE, INVENTORY_AGGREGATE};

/// Queryable stock row: catalog fields plus the derived on-hand level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: String,
    /// Catalog price, minor currency units.
    pub price: i64,
    pub expiry: Option<chrono::NaiveDate>,
    pub on_hand: i64,
    pub forecast: Option<ForecastParams>,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("envelope stream mismatch: {0}")]
    StreamMismatch(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Stock levels projection over inventory and appointment streams.
#[derive(Debug)]
pub struct StockLevels<S>
where
    S: KeyedStore<InventoryItemId, StockLevel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> StockLevels<S>
where
    S: KeyedStore<InventoryItemId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, item_id: InventoryItemId) -> Option<StockLevel> {
        self.store.get(&item_id)
    }

    pub fn list(&self) -> Vec<StockLevel> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Apply one published envelope from either stream family.
    /// Idempotent under at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        match envelope.aggregate_type() {
            INVENTORY_AGGREGATE => self.apply_gated(envelope, Self::apply_inventory),
            APPOINTMENT_AGGREGATE => self.apply_gated(envelope, Self::apply_appointment),
            _ => Ok(()),
        }
    }

    fn apply_gated(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        apply: impl FnOnce(&Self, &EventEnvelope<JsonValue>) -> Result<(), StockProjectionError>,
    ) -> Result<(), StockProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        apply(self, envelope)?;

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_inventory(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        let item_id = match &event {
            InventoryEvent::ItemRegistered(e) => e.item_id,
            InventoryEvent::ItemRestocked(e) => e.item_id,
            InventoryEvent::StockLevelSet(e) => e.item_id,
            InventoryEvent::ForecastParamsSet(e) => e.item_id,
        };
        if item_id.0 != envelope.aggregate_id() {
            return Err(StockProjectionError::StreamMismatch(
                "event item_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            InventoryEvent::ItemRegistered(e) => {
                // Add to, rather than replace, any placeholder created by an
                // out-of-order consumption replay.
                let carried = self.store.get(&e.item_id).map(|r| r.on_hand).unwrap_or(0);
                self.store.upsert(
                    e.item_id,
                    StockLevel {
                        item_id: e.item_id,
                        name: e.name,
                        category: e.category,
                        price: e.price,
                        expiry: e.expiry,
                        on_hand: carried + e.initial_stock,
                        forecast: None,
                    },
                );
            }
            InventoryEvent::ItemRestocked(e) => {
                self.update(e.item_id, |row| row.on_hand += e.quantity);
            }
            InventoryEvent::StockLevelSet(e) => {
                // Staff override replaces the derived level outright.
                self.update(e.item_id, |row| row.on_hand = e.quantity);
            }
            InventoryEvent::ForecastParamsSet(e) => {
                self.update(e.item_id, |row| row.forecast = Some(e.params));
            }
        }
        Ok(())
    }

    fn apply_appointment(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        let event: AppointmentEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        // Only confirmed consumption touches stock. Replays may deliver a
        // confirmation before the item's registration; a placeholder row
        // keeps the deduction until registration fills the catalog fields.
        if let AppointmentEvent::ConsumptionConfirmed(e) = event {
            let mut row = self.store.get(&e.item_id).unwrap_or(StockLevel {
                item_id: e.item_id,
                name: String::new(),
                category: String::new(),
                price: 0,
                expiry: None,
                on_hand: 0,
                forecast: None,
            });
            row.on_hand -= e.quantity;
            self.store.upsert(e.item_id, row);
        }
        Ok(())
    }

    fn update(&self, item_id: InventoryItemId, f: impl FnOnce(&mut StockLevel)) {
        if let Some(mut row) = self.store.get(&item_id) {
            f(&mut row);
            self.store.upsert(item_id, row);
        }
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    ///
    /// Overrides and deductions do not commute, so envelopes must arrive in
    /// global append order as `EventStore::load_all` yields them.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
        self.cursors.clear();
        self.store.clear();

        for env in envelopes {
            self.apply_envelope(&env)?;
        }
        Ok(())
    }
}
