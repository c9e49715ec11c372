//! Appointment ledger service.
//!
//! Orchestrates the appointment lifecycle end to end: slot validation
//! against the staff member's availability profile and current bookings,
//! command dispatch, and access-filtered queries over the directory
//! projection.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use vetledger_access::AccessContext;
use vetledger_appointments::{
    Appointment, AppointmentCommand, AppointmentId, AppointmentSnapshot, AppointmentStatus,
    ApproveAppointment, BookingDetails, CancelAppointment, PaymentKind, PaymentMethod,
    RecordPayment, RejectAppointment, RequestAppointment, RescheduleAppointment,
};
use vetledger_core::{AggregateId, DomainError, StaffId};
use vetledger_events::{EventBus, EventEnvelope};
use vetledger_scheduling::{check_slot, generate_slots};

use crate::APPOINTMENT_AGGREGATE;
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::services::pipeline::Pipeline;
use crate::services::profiles::ProfileStore;

pub struct AppointmentLedger<S, B, P> {
    pipeline: Arc<Pipeline<S, B>>,
    profiles: P,
}

impl<S, B, P> AppointmentLedger<S, B, P>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: ProfileStore,
{
    pub fn new(pipeline: Arc<Pipeline<S, B>>, profiles: P) -> Self {
        Self { pipeline, profiles }
    }

    /// The bookable slot grid for one staff member on one date. Empty on
    /// non-working days.
    pub fn available_slots(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, DispatchError> {
        let profile = self.profiles.get(staff_id).ok_or(DispatchError::NotFound)?;
        Ok(generate_slots(&profile, date))
    }

    /// Book a new appointment request after validating the requested slot.
    #[tracing::instrument(
        skip_all,
        fields(identity = %ctx.identity(), staff_id = %details.staff_id, date = %details.date)
    )]
    pub fn request(
        &self,
        ctx: &AccessContext,
        details: BookingDetails,
        now: DateTime<Utc>,
    ) -> Result<AppointmentId, DispatchError> {
        self.validate_slot(&details, None)?;

        let appointment_id = AppointmentId::new(AggregateId::new());
        self.pipeline.execute(
            appointment_id.0,
            APPOINTMENT_AGGREGATE,
            AppointmentCommand::RequestAppointment(RequestAppointment {
                appointment_id,
                details,
                occurred_at: now,
            }),
            |id| Appointment::empty(AppointmentId::new(id)),
        )?;

        info!(appointment_id = %appointment_id, "appointment requested");
        Ok(appointment_id)
    }

    /// Staff decision on a pending request.
    #[tracing::instrument(skip_all, fields(identity = %ctx.identity(), appointment_id = %id))]
    pub fn approve(
        &self,
        ctx: &AccessContext,
        id: AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        require_clinic(ctx)?;
        self.execute_on(
            id,
            AppointmentCommand::ApproveAppointment(ApproveAppointment {
                appointment_id: id,
                occurred_at: now,
            }),
        )
    }

    /// Staff decision on a pending request.
    #[tracing::instrument(skip_all, fields(identity = %ctx.identity(), appointment_id = %id))]
    pub fn reject(
        &self,
        ctx: &AccessContext,
        id: AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        require_clinic(ctx)?;
        self.execute_on(
            id,
            AppointmentCommand::RejectAppointment(RejectAppointment {
                appointment_id: id,
                occurred_at: now,
            }),
        )
    }

    /// Cancel a pending or approved appointment. Owners may only cancel
    /// bookings they can see.
    #[tracing::instrument(skip_all, fields(identity = %ctx.identity(), appointment_id = %id))]
    pub fn cancel(
        &self,
        ctx: &AccessContext,
        id: AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let row = self
            .pipeline
            .directory()
            .get(id)
            .ok_or(DispatchError::NotFound)?;
        if !ctx.can_view(&row.owner_email) {
            return Err(DispatchError::NotFound);
        }
        self.execute_on(
            id,
            AppointmentCommand::CancelAppointment(CancelAppointment {
                appointment_id: id,
                occurred_at: now,
            }),
        )
    }

    /// Move an approved appointment to a new slot.
    ///
    /// The original record is kept as terminal history: a fresh pending
    /// request takes the new slot and the old record is marked rescheduled,
    /// pointing at its replacement.
    #[tracing::instrument(
        skip_all,
        fields(identity = %ctx.identity(), appointment_id = %id, date = %new_date)
    )]
    pub fn reschedule(
        &self,
        ctx: &AccessContext,
        id: AppointmentId,
        new_date: NaiveDate,
        new_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<AppointmentId, DispatchError> {
        require_clinic(ctx)?;
        let current = self
            .pipeline
            .directory()
            .get(id)
            .ok_or(DispatchError::NotFound)?;
        if current.status != AppointmentStatus::Approved {
            return Err(DomainError::invalid_transition(format!(
                "cannot reschedule an appointment that is {}",
                current.status
            ))
            .into());
        }

        let details = BookingDetails {
            pet_name: current.pet_name,
            owner_name: current.owner_name,
            owner_email: current.owner_email,
            owner_phone: current.owner_phone,
            service: current.service,
            price: current.price,
            date: new_date,
            time: new_time,
            staff_id: current.staff_id,
        };
        // The original still occupies its slot; it must not block its own
        // replacement's spacing check.
        self.validate_slot(&details, Some(id))?;

        // The replacement is created first; if marking the original fails
        // (concurrent change), the original stays authoritative and the
        // caller retries against the pending replacement.
        let replacement_id = AppointmentId::new(AggregateId::new());
        self.pipeline.execute(
            replacement_id.0,
            APPOINTMENT_AGGREGATE,
            AppointmentCommand::RequestAppointment(RequestAppointment {
                appointment_id: replacement_id,
                details,
                occurred_at: now,
            }),
            |aid| Appointment::empty(AppointmentId::new(aid)),
        )?;

        self.execute_on(
            id,
            AppointmentCommand::RescheduleAppointment(RescheduleAppointment {
                appointment_id: id,
                replacement_id,
                occurred_at: now,
            }),
        )?;

        info!(replacement_id = %replacement_id, "appointment rescheduled");
        Ok(replacement_id)
    }

    /// Record a confirmed payment against an approved appointment.
    #[tracing::instrument(skip_all, fields(identity = %ctx.identity(), appointment_id = %id))]
    pub fn record_payment(
        &self,
        ctx: &AccessContext,
        id: AppointmentId,
        kind: PaymentKind,
        method: PaymentMethod,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        require_clinic(ctx)?;
        self.execute_on(
            id,
            AppointmentCommand::RecordPayment(RecordPayment {
                appointment_id: id,
                kind,
                method,
                confirmed_at,
            }),
        )
    }

    /// One appointment, if the caller may see it.
    pub fn get(&self, ctx: &AccessContext, id: AppointmentId) -> Option<AppointmentSnapshot> {
        self.pipeline
            .directory()
            .get(id)
            .filter(|row| ctx.can_view(&row.owner_email))
    }

    /// Every appointment visible to the caller. Clinic roles see all rows;
    /// owners see their own bookings only.
    pub fn list(&self, ctx: &AccessContext) -> Vec<AppointmentSnapshot> {
        let mut rows: Vec<_> = self
            .pipeline
            .directory()
            .list()
            .into_iter()
            .filter(|row| ctx.can_view(&row.owner_email))
            .collect();
        rows.sort_by_key(|r| (r.date, r.time));
        rows
    }

    pub fn list_by_date(&self, ctx: &AccessContext, date: NaiveDate) -> Vec<AppointmentSnapshot> {
        self.pipeline
            .directory()
            .list_by_date(date)
            .into_iter()
            .filter(|row| ctx.can_view(&row.owner_email))
            .collect()
    }

    fn execute_on(
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

    fn validate_slot(
        &self,
        details: &BookingDetails,
        exclude: Option<AppointmentId>,
    ) -> Result<(), DispatchError> {
        let profile = self
            .profiles
            .get(details.staff_id)
            .ok_or(DispatchError::NotFound)?;

        let booked: Vec<NaiveTime> = self
            .pipeline
            .directory()
            .active_for_staff(details.staff_id, details.date)
            .iter()
            .filter(|row| Some(row.appointment_id) != exclude)
            .map(|row| row.time)
            .collect();

        check_slot(&profile, details.date, details.time, &booked).map_err(DispatchError::from)
    }
}

fn require_clinic(ctx: &AccessContext) -> Result<(), DispatchError> {
    if ctx.role().is_clinic_side() {
        Ok(())
    } else {
        Err(DomainError::validation("requires a clinic-side role").into())
    }
}
