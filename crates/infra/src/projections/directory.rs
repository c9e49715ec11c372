//! Appointment directory projection.
//!
//! Consumes published appointment envelopes and maintains one flat
//! [`AppointmentSnapshot`] row per appointment. The directory answers the
//! booking queries (by id, by date, by staff, by owner); access filtering is
//! the caller's concern.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use vetledger_appointments::{
    AppointmentEvent, AppointmentId, AppointmentSnapshot, AppointmentStatus, ConsumptionLine,
    DeductionStatus, PaymentKind,
};
use vetledger_core::StaffId;
use vetledger_events::EventEnvelope;

use crate::read_model::KeyedStore;
use crate::projections::cursor::{CursorDecision, CursorError, StreamCursors};
use crate::APPOINTMENT_AGGREGATE;

#[derive(Debug, Error)]
pub enum DirectoryProjectionError {
    #[error("failed to deserialize appointment event: {0}")]
    Deserialize(String),

    #[error("envelope stream mismatch: {0}")]
    StreamMismatch(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Directory of appointment snapshot rows, rebuilt from the event stream.
#[derive(Debug)]
pub struct AppointmentDirectory<S>
where
    S: KeyedStore<AppointmentId, AppointmentSnapshot>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> AppointmentDirectory<S>
where
    S: KeyedStore<AppointmentId, AppointmentSnapshot>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, id: AppointmentId) -> Option<AppointmentSnapshot> {
        self.store.get(&id)
    }

    pub fn list(&self) -> Vec<AppointmentSnapshot> {
        self.store.list()
    }

    pub fn list_by_date(&self, date: NaiveDate) -> Vec<AppointmentSnapshot> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| r.date == date)
            .collect();
        rows.sort_by_key(|r| r.time);
        rows
    }

    /// Bookings that occupy a slot for one staff member on one date
    /// (pending and approved records only).
    pub fn active_for_staff(&self, staff_id: StaffId, date: NaiveDate) -> Vec<AppointmentSnapshot> {
        self.store
            .list()
            .into_iter()
            .filter(|r| r.staff_id == staff_id && r.date == date && r.status.occupies_slot())
            .collect()
    }

    pub fn list_by_owner(&self, owner_email: &str) -> Vec<AppointmentSnapshot> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| r.owner_email.eq_ignore_ascii_case(owner_email))
            .collect();
        rows.sort_by_key(|r| (r.date, r.time));
        rows
    }

    /// Apply one published envelope. Idempotent under at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DirectoryProjectionError> {
        if envelope.aggregate_type() != APPOINTMENT_AGGREGATE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        let event: AppointmentEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| DirectoryProjectionError::Deserialize(e.to_string()))?;

        let appointment_id = AppointmentId::new(aggregate_id);
        self.apply_event(appointment_id, &event)?;

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        appointment_id: AppointmentId,
        event: &AppointmentEvent,
    ) -> Result<(), DirectoryProjectionError> {
        match event {
            AppointmentEvent::AppointmentRequested(e) => {
                if e.appointment_id != appointment_id {
                    return Err(DirectoryProjectionError::StreamMismatch(
                        "event appointment_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.store.upsert(
                    appointment_id,
                    AppointmentSnapshot {
                        appointment_id,
                        pet_name: e.details.pet_name.clone(),
                        owner_name: e.details.owner_name.clone(),
                        owner_email: e.details.owner_email.clone(),
                        owner_phone: e.details.owner_phone.clone(),
                        service: e.details.service.clone(),
                        price: e.details.price,
                        date: e.details.date,
                        time: e.details.time,
                        staff_id: e.details.staff_id,
                        status: AppointmentStatus::Pending,
                        payment_status: None,
                        payment_method: None,
                        deposit_confirmed_at: None,
                        full_payment_confirmed_at: None,
                        remaining_balance_confirmed_at: None,
                        replaced_by: None,
                        lines: Vec::new(),
                    },
                );
            }
            AppointmentEvent::AppointmentApproved(_) => {
                self.update(appointment_id, |row| row.status = AppointmentStatus::Approved);
            }
            AppointmentEvent::AppointmentRejected(_) => {
                self.update(appointment_id, |row| row.status = AppointmentStatus::Rejected);
            }
            AppointmentEvent::AppointmentCancelled(_) => {
                self.update(appointment_id, |row| row.status = AppointmentStatus::Cancelled);
            }
            AppointmentEvent::AppointmentRescheduled(e) => {
                self.update(appointment_id, |row| {
                    row.status = AppointmentStatus::Rescheduled;
                    row.replaced_by = Some(e.replacement_id);
                });
            }
            AppointmentEvent::PaymentRecorded(e) => {
                self.update(appointment_id, |row| {
                    row.payment_status = Some(e.payment_status);
                    row.payment_method = Some(e.method);
                    match e.kind {
                        PaymentKind::DepositConfirmed => {
                            row.deposit_confirmed_at = Some(e.confirmed_at);
                        }
                        PaymentKind::FullPaymentConfirmed => {
                            row.full_payment_confirmed_at = Some(e.confirmed_at);
                        }
                        PaymentKind::RemainingBalanceConfirmed => {
                            row.remaining_balance_confirmed_at = Some(e.confirmed_at);
                        }
                    }
                });
            }
            AppointmentEvent::UsageLogged(e) => {
                self.update(appointment_id, |row| {
                    row.lines.push(ConsumptionLine {
                        line_id: e.line_id,
                        item_id: e.item_id,
                        quantity: e.quantity,
                        status: DeductionStatus::Pending,
                        rejection_reason: None,
                        approved_by: None,
                        approved_at: None,
                    });
                });
            }
            AppointmentEvent::ConsumptionConfirmed(e) => {
                self.update(appointment_id, |row| {
                    if let Some(line) = row.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                        line.status = DeductionStatus::Confirmed;
                        line.approved_by = Some(e.approved_by);
                        line.approved_at = Some(e.occurred_at);
                    }
                });
            }
            AppointmentEvent::ConsumptionRejected(e) => {
                self.update(appointment_id, |row| {
                    if let Some(line) = row.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                        line.status = DeductionStatus::Rejected;
                        line.rejection_reason = Some(e.reason.clone());
                    }
                });
            }
        }
        Ok(())
    }

    fn update(&self, id: AppointmentId, f: impl FnOnce(&mut AppointmentSnapshot)) {
        if let Some(mut row) = self.store.get(&id) {
            f(&mut row);
            self.store.upsert(id, row);
        }
    }

    /// Rebuild the directory from scratch by replaying envelopes in global
    /// append order, as `EventStore::load_all` yields them.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DirectoryProjectionError> {
        self.cursors.clear();
        self.store.clear();

        for env in envelopes {
            self.apply_envelope(&env)?;
        }
        Ok(())
    }
}
