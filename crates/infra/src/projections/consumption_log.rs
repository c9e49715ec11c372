//! Confirmed-consumption log projection.
//!
//! Flattens every `ConsumptionConfirmed` event into a [`ConsumptionFact`]
//! dated by its confirmation day. The forecaster reads these facts; it never
//! sees pending or rejected lines. Item names are learned from registration
//! events so the log is joinable without a catalog lookup.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use vetledger_appointments::AppointmentEvent;
use vetledger_events::EventEnvelope;
use vetledger_inventory::{InventoryEvent, InventoryItemId};
use vetledger_reporting::ConsumptionFact;

use crate::projections::cursor::{CursorDecision, CursorError, StreamCursors};
use crate::{APPOINTMENT_AGGREGATE, INVENTORY_AGGREGATE};

#[derive(Debug, Error)]
pub enum ConsumptionLogError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Append-only log of confirmed consumption facts.
#[derive(Debug, Default)]
pub struct ConsumptionLog {
    facts: RwLock<Vec<ConsumptionFact>>,
    names: RwLock<HashMap<InventoryItemId, String>>,
    cursors: StreamCursors,
}

impl ConsumptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts(&self) -> Vec<ConsumptionFact> {
        self.facts.read().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn facts_for(&self, item_id: InventoryItemId) -> Vec<ConsumptionFact> {
        self.facts
            .read()
            .map(|f| f.iter().filter(|x| x.item_id == item_id).cloned().collect())
            .unwrap_or_default()
    }

    /// Apply one published envelope. Idempotent under at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ConsumptionLogError> {
        match envelope.aggregate_type() {
            APPOINTMENT_AGGREGATE | INVENTORY_AGGREGATE => {}
            _ => return Ok(()),
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        if envelope.aggregate_type() == INVENTORY_AGGREGATE {
            let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ConsumptionLogError::Deserialize(e.to_string()))?;
            if let InventoryEvent::ItemRegistered(e) = event {
                if let Ok(mut names) = self.names.write() {
                    names.insert(e.item_id, e.name);
                }
            }
        } else {
            let event: AppointmentEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ConsumptionLogError::Deserialize(e.to_string()))?;
            if let AppointmentEvent::ConsumptionConfirmed(e) = event {
                let name = self
                    .names
                    .read()
                    .ok()
                    .and_then(|n| n.get(&e.item_id).cloned())
                    .unwrap_or_default();
                if let Ok(mut facts) = self.facts.write() {
                    facts.push(ConsumptionFact {
                        item_id: e.item_id,
                        item_name: name,
                        quantity: e.quantity,
                        confirmed_on: e.occurred_at.date_naive(),
                    });
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the log from scratch by replaying envelopes.
    ///
    /// Envelopes must arrive in global append order as `EventStore::load_all`
    /// yields them; registration always precedes the first confirmation of an
    /// item, so names resolve without a separate pass.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ConsumptionLogError> {
        self.cursors.clear();
        if let Ok(mut facts) = self.facts.write() {
            facts.clear();
        }
        if let Ok(mut names) = self.names.write() {
            names.clear();
        }

        for env in envelopes {
            self.apply_envelope(&env)?;
        }
        Ok(())
    }
}
