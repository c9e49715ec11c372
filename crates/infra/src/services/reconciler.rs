//! Inventory reconciliation service.
//!
//! Owns the consumption-line workflow: clinicians log usage against an
//! appointment, staff confirm or reject each line, and confirmed lines are
//! the only thing that ever deducts on-hand stock. The deduction itself
//! happens in the stock projection when the confirmation event lands; the
//! aggregate's line-state guard makes a retried confirmation fail instead of
//! deducting twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use vetledger_appointments::{
    Appointment, AppointmentCommand, AppointmentId, ConfirmConsumption, ConsumptionLine,
    DeductionStatus, LineId, LogUsage, RejectConsumption,
};
use vetledger_core::StaffId;
use vetledger_events::{EventBus, EventEnvelope};
use vetledger_inventory::{
    InventoryCommand, InventoryItem, InventoryItemId, RegisterItem, RestockItem, SetForecastParams,
    SetStockLevel,
};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::projections::StockLevel;
use crate::services::pipeline::Pipeline;
use crate::{APPOINTMENT_AGGREGATE, INVENTORY_AGGREGATE};

pub struct InventoryReconciler<S, B> {
    pipeline: Arc<Pipeline<S, B>>,
}

impl<S, B> InventoryReconciler<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(pipeline: Arc<Pipeline<S, B>>) -> Self {
        Self { pipeline }
    }

    // Catalog administration.

    #[tracing::instrument(skip_all, fields(name = %cmd.name))]
    pub fn register_item(&self, cmd: RegisterItem) -> Result<InventoryItemId, DispatchError> {
        let item_id = cmd.item_id;
        self.execute_inventory(item_id, InventoryCommand::RegisterItem(cmd))?;
        info!(item_id = %item_id.0, "inventory item registered");
        Ok(item_id)
    }

    pub fn restock(&self, cmd: RestockItem) -> Result<(), DispatchError> {
        self.execute_inventory(cmd.item_id, InventoryCommand::RestockItem(cmd))
    }

    /// Staff override of the recorded stock level.
    pub fn set_stock_level(&self, cmd: SetStockLevel) -> Result<(), DispatchError> {
        self.execute_inventory(cmd.item_id, InventoryCommand::SetStockLevel(cmd))
    }

    pub fn set_forecast_params(&self, cmd: SetForecastParams) -> Result<(), DispatchError> {
        self.execute_inventory(cmd.item_id, InventoryCommand::SetForecastParams(cmd))
    }

    // Consumption-line lifecycle.

    /// Log item usage against an appointment as a pending line.
    #[tracing::instrument(skip_all, fields(appointment_id = %appointment_id, quantity = quantity))]
    pub fn log_usage(
        &self,
        appointment_id: AppointmentId,
        item_id: InventoryItemId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<LineId, DispatchError> {
        // The item must exist in the catalog before usage can reference it.
        if self.pipeline.stock().get(item_id).is_none() {
            return Err(DispatchError::NotFound);
        }

        let line_id = LineId::new();
        self.execute_appointment(
            appointment_id,
            AppointmentCommand::LogUsage(LogUsage {
                appointment_id,
                line_id,
                item_id,
                quantity,
                occurred_at: now,
            }),
        )?;
        Ok(line_id)
    }

    /// Confirm a pending line, deducting stock exactly once.
    #[tracing::instrument(skip_all, fields(appointment_id = %appointment_id, line_id = %line_id))]
    pub fn confirm(
        &self,
        appointment_id: AppointmentId,
        line_id: LineId,
        approved_by: StaffId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.execute_appointment(
            appointment_id,
            AppointmentCommand::ConfirmConsumption(ConfirmConsumption {
                appointment_id,
                line_id,
                approved_by,
                occurred_at: now,
            }),
        )?;
        info!("consumption confirmed");
        Ok(())
    }

    /// Reject a pending line with a reason; stock is untouched.
    #[tracing::instrument(skip_all, fields(appointment_id = %appointment_id, line_id = %line_id))]
    pub fn reject(
        &self,
        appointment_id: AppointmentId,
        line_id: LineId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.execute_appointment(
            appointment_id,
            AppointmentCommand::RejectConsumption(RejectConsumption {
                appointment_id,
                line_id,
                reason: reason.into(),
                occurred_at: now,
            }),
        )
    }

    // Queries.

    pub fn stock_level(&self, item_id: InventoryItemId) -> Option<StockLevel> {
        self.pipeline.stock().get(item_id)
    }

    pub fn stock_levels(&self) -> Vec<StockLevel> {
        self.pipeline.stock().list()
    }

    /// Lines awaiting a staff decision across all appointments.
    pub fn pending_lines(&self) -> Vec<(AppointmentId, ConsumptionLine)> {
        self.pipeline
            .directory()
            .list()
            .into_iter()
            .flat_map(|row| {
                let id = row.appointment_id;
                row.lines
                    .into_iter()
                    .filter(|l| l.status == DeductionStatus::Pending)
                    .map(move |l| (id, l))
            })
            .collect()
    }

    fn execute_inventory(
        &self,
        item_id: InventoryItemId,
        command: InventoryCommand,
    ) -> Result<(), DispatchError> {
        self.pipeline
            .execute(item_id.0, INVENTORY_AGGREGATE, command, |id| {
                InventoryItem::empty(InventoryItemId::new(id))
            })?;
        Ok(())
    }

    fn execute_appointment(
        &self,
        id: AppointmentId,
        command: AppointmentCommand,
    ) -> Result<(), DispatchError> {
        self.pipeline
            .execute(id.0, APPOINTMENT_AGGREGATE, command, |aid| {
                Appointment::empty(AppointmentId::new(aid))
            })?;
        Ok(())
    }
}
