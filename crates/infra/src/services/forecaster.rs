//! Consumption forecasting service.
//!
//! Joins the stock-levels projection with the confirmed-consumption log and
//! answers the purchasing questions: how fast does an item burn, when does
//! it run out, and which items need reordering now.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use vetledger_core::DomainError;
use vetledger_events::{EventBus, EventEnvelope};
use vetledger_inventory::InventoryItemId;
use vetledger_reporting::{
    StockHealth, StockoutProjection, average_daily_use, classify, stockout_projection,
};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::services::pipeline::Pipeline;

/// One row of the reorder report.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutlook {
    pub item_id: InventoryItemId,
    pub name: String,
    pub on_hand: i64,
    pub daily_use: f64,
    pub health: Option<StockHealth>,
}

pub struct ConsumptionForecaster<S, B> {
    pipeline: Arc<Pipeline<S, B>>,
}

impl<S, B> ConsumptionForecaster<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(pipeline: Arc<Pipeline<S, B>>) -> Self {
        Self { pipeline }
    }

    /// Average units consumed per active day.
    pub fn daily_use(&self, item_id: InventoryItemId) -> f64 {
        average_daily_use(&self.pipeline.consumption().facts_for(item_id), item_id)
    }

    /// Depletion curve at the current burn rate. `InsufficientData` when the
    /// item is unknown or has no confirmed consumption.
    pub fn stockout(&self, item_id: InventoryItemId) -> Result<StockoutProjection, DispatchError> {
        let level = self
            .pipeline
            .stock()
            .get(item_id)
            .ok_or(DispatchError::NotFound)?;
        stockout_projection(level.on_hand, self.daily_use(item_id), level.forecast)
            .map_err(DispatchError::from)
    }

    /// Stock health against the item's configured reorder point. Items
    /// without forecast parameters cannot be classified.
    pub fn health(&self, item_id: InventoryItemId) -> Result<StockHealth, DispatchError> {
        let level = self
            .pipeline
            .stock()
            .get(item_id)
            .ok_or(DispatchError::NotFound)?;
        let params = level.forecast.ok_or_else(|| {
            DispatchError::from(DomainError::insufficient_data(
                "item has no forecast parameters",
            ))
        })?;
        Ok(classify(level.on_hand, params.reorder_point))
    }

    /// The reorder report: every catalog item with its burn rate and health,
    /// most urgent first.
    pub fn outlook(&self) -> Vec<ItemOutlook> {
        let mut rows: Vec<ItemOutlook> = self
            .pipeline
            .stock()
            .list()
            .into_iter()
            .map(|level| {
                let daily_use = self.daily_use(level.item_id);
                let health = level
                    .forecast
                    .as_ref()
                    .map(|p| classify(level.on_hand, p.reorder_point));
                ItemOutlook {
                    item_id: level.item_id,
                    name: level.name,
                    on_hand: level.on_hand,
                    daily_use,
                    health,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            urgency(a.health)
                .cmp(&urgency(b.health))
                .then(a.on_hand.cmp(&b.on_hand))
        });
        rows
    }
}

fn urgency(health: Option<StockHealth>) -> u8 {
    match health {
        Some(StockHealth::ReorderNow) => 0,
        Some(StockHealth::Monitor) => 1,
        Some(StockHealth::Safe) => 2,
        None => 3,
    }
}
