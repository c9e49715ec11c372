use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vetledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, StaffId};
use vetledger_events::Event;
use vetledger_inventory::InventoryItemId;

use crate::payment::{self, PaymentKind, PaymentMethod, PaymentRecord, PaymentStatus};

/// Appointment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub AggregateId);

impl AppointmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Consumption line identifier (scoped to the owning appointment).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Appointment status lifecycle.
///
/// `Rejected`, `Cancelled` and `Rescheduled` are terminal: a reschedule marks
/// the old record and spawns a fresh `Pending` one, preserving slot history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rescheduled
        )
    }

    /// Statuses that count as occupying a slot for break-spacing checks.
    pub fn occupies_slot(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Approved)
    }
}

impl core::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
        };
        f.write_str(s)
    }
}

/// Deduction lifecycle of one consumption line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl core::fmt::Display for DeductionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            DeductionStatus::Pending => "pending",
            DeductionStatus::Confirmed => "confirmed",
            DeductionStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One inventory item + quantity logged against the appointment, subject to
/// staff approval before it affects stock. Immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionLine {
    pub line_id: LineId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub status: DeductionStatus,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<StaffId>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Booking request fields captured at creation time.
///
/// `price` is the service price snapshot at booking time, in minor currency
/// units; later catalog changes never affect existing appointments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub pet_name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_phone: String,
    pub service: String,
    pub price: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub staff_id: StaffId,
}

impl BookingDetails {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.pet_name.trim().is_empty() {
            return Err(DomainError::validation("pet name is required"));
        }
        if self.owner_name.trim().is_empty() {
            return Err(DomainError::validation("owner name is required"));
        }
        if self.owner_email.trim().is_empty() || !self.owner_email.contains('@') {
            return Err(DomainError::validation("a valid owner email is required"));
        }
        if self.service.trim().is_empty() {
            return Err(DomainError::validation("service is required"));
        }
        if self.price < 0 {
            return Err(DomainError::validation("price cannot be negative"));
        }
        Ok(())
    }
}

/// Aggregate root: Appointment.
///
/// Owns the status state machine, the payment axis and the consumption lines
/// logged against the visit. Cancellation and rejection never reverse
/// already-confirmed lines; those facts are committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    id: AppointmentId,
    details: Option<BookingDetails>,
    status: AppointmentStatus,
    payment_status: Option<PaymentStatus>,
    payments: Vec<PaymentRecord>,
    lines: Vec<ConsumptionLine>,
    replaced_by: Option<AppointmentId>,
    version: u64,
    created: bool,
}

impl Appointment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AppointmentId) -> Self {
        Self {
            id,
            details: None,
            status: AppointmentStatus::Pending,
            payment_status: None,
            payments: Vec::new(),
            lines: Vec::new(),
            replaced_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AppointmentId {
        self.id
    }

    pub fn details(&self) -> Option<&BookingDetails> {
        self.details.as_ref()
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment_status
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    pub fn lines(&self) -> &[ConsumptionLine] {
        &self.lines
    }

    pub fn line(&self, line_id: LineId) -> Option<&ConsumptionLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn replaced_by(&self) -> Option<AppointmentId> {
        self.replaced_by
    }

    /// The single settlement predicate reused by every derivation.
    pub fn is_settled(&self) -> bool {
        matches!(self.payment_status, Some(PaymentStatus::FullyPaid))
            || payment::settled_at(&self.payments).is_some()
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        payment::settled_at(&self.payments)
    }
}

impl AggregateRoot for Appointment {
    type Id = AppointmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestAppointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAppointment {
    pub appointment_id: AppointmentId,
    pub details: BookingDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveAppointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveAppointment {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectAppointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectAppointment {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelAppointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RescheduleAppointment.
///
/// Marks this record terminal and points at the replacement. The replacement
/// record itself is created through its own `RequestAppointment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleAppointment {
    pub appointment_id: AppointmentId,
    pub replacement_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub appointment_id: AppointmentId,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub confirmed_at: DateTime<Utc>,
}

/// Command: LogUsage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogUsage {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmConsumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmConsumption {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub approved_by: StaffId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectConsumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectConsumption {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentCommand {
    RequestAppointment(RequestAppointment),
    ApproveAppointment(ApproveAppointment),
    RejectAppointment(RejectAppointment),
    CancelAppointment(CancelAppointment),
    RescheduleAppointment(RescheduleAppointment),
    RecordPayment(RecordPayment),
    LogUsage(LogUsage),
    ConfirmConsumption(ConfirmConsumption),
    RejectConsumption(RejectConsumption),
}

/// Event: AppointmentRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRequested {
    pub appointment_id: AppointmentId,
    pub details: BookingDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AppointmentApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentApproved {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AppointmentRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRejected {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AppointmentCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentCancelled {
    pub appointment_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AppointmentRescheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRescheduled {
    pub appointment_id: AppointmentId,
    pub replacement_id: AppointmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
///
/// Carries the resulting payment status so consumers never re-derive the
/// sub-state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub appointment_id: AppointmentId,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub confirmed_at: DateTime<Utc>,
}

/// Event: UsageLogged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLogged {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConsumptionConfirmed.
///
/// Repeats item + quantity so stock consumers need no line lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionConfirmed {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub approved_by: StaffId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConsumptionRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRejected {
    pub appointment_id: AppointmentId,
    pub line_id: LineId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentEvent {
    AppointmentRequested(AppointmentRequested),
    AppointmentApproved(AppointmentApproved),
    AppointmentRejected(AppointmentRejected),
    AppointmentCancelled(AppointmentCancelled),
    AppointmentRescheduled(AppointmentRescheduled),
    PaymentRecorded(PaymentRecorded),
    UsageLogged(UsageLogged),
    ConsumptionConfirmed(ConsumptionConfirmed),
    ConsumptionRejected(ConsumptionRejected),
}

impl Event for AppointmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AppointmentEvent::AppointmentRequested(_) => "appointments.requested",
            AppointmentEvent::AppointmentApproved(_) => "appointments.approved",
            AppointmentEvent::AppointmentRejected(_) => "appointments.rejected",
            AppointmentEvent::AppointmentCancelled(_) => "appointments.cancelled",
            AppointmentEvent::AppointmentRescheduled(_) => "appointments.rescheduled",
            AppointmentEvent::PaymentRecorded(_) => "appointments.payment_recorded",
            AppointmentEvent::UsageLogged(_) => "appointments.usage_logged",
            AppointmentEvent::ConsumptionConfirmed(_) => "appointments.consumption_confirmed",
            AppointmentEvent::ConsumptionRejected(_) => "appointments.consumption_rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AppointmentEvent::AppointmentRequested(e) => e.occurred_at,
            AppointmentEvent::AppointmentApproved(e) => e.occurred_at,
            AppointmentEvent::AppointmentRejected(e) => e.occurred_at,
            AppointmentEvent::AppointmentCancelled(e) => e.occurred_at,
            AppointmentEvent::AppointmentRescheduled(e) => e.occurred_at,
            AppointmentEvent::PaymentRecorded(e) => e.confirmed_at,
            AppointmentEvent::UsageLogged(e) => e.occurred_at,
            AppointmentEvent::ConsumptionConfirmed(e) => e.occurred_at,
            AppointmentEvent::ConsumptionRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Appointment {
    type Command = AppointmentCommand;
    type Event = AppointmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AppointmentEvent::AppointmentRequested(e) => {
                self.id = e.appointment_id;
                self.details = Some(e.details.clone());
                self.status = AppointmentStatus::Pending;
                self.payment_status = None;
                self.payments.clear();
                self.lines.clear();
                self.replaced_by = None;
                self.created = true;
            }
            AppointmentEvent::AppointmentApproved(_) => {
                self.status = AppointmentStatus::Approved;
            }
            AppointmentEvent::AppointmentRejected(_) => {
                self.status = AppointmentStatus::Rejected;
            }
            AppointmentEvent::AppointmentCancelled(_) => {
                self.status = AppointmentStatus::Cancelled;
            }
            AppointmentEvent::AppointmentRescheduled(e) => {
                self.status = AppointmentStatus::Rescheduled;
                self.replaced_by = Some(e.replacement_id);
            }
            AppointmentEvent::PaymentRecorded(e) => {
                self.payment_status = Some(e.payment_status);
                self.payments.push(PaymentRecord {
                    kind: e.kind,
                    method: e.method,
                    confirmed_at: e.confirmed_at,
                });
            }
            AppointmentEvent::UsageLogged(e) => {
                self.lines.push(ConsumptionLine {
                    line_id: e.line_id,
                    item_id: e.item_id,
                    quantity: e.quantity,
                    status: DeductionStatus::Pending,
                    rejection_reason: None,
                    approved_by: None,
                    approved_at: None,
                });
            }
            AppointmentEvent::ConsumptionConfirmed(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.status = DeductionStatus::Confirmed;
                    line.approved_by = Some(e.approved_by);
                    line.approved_at = Some(e.occurred_at);
                }
            }
            AppointmentEvent::ConsumptionRejected(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.status = DeductionStatus::Rejected;
                    line.rejection_reason = Some(e.reason.clone());
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AppointmentCommand::RequestAppointment(cmd) => self.handle_request(cmd),
            AppointmentCommand::ApproveAppointment(cmd) => self.handle_approve(cmd),
            AppointmentCommand::RejectAppointment(cmd) => self.handle_reject(cmd),
            AppointmentCommand::CancelAppointment(cmd) => self.handle_cancel(cmd),
            AppointmentCommand::RescheduleAppointment(cmd) => self.handle_reschedule(cmd),
            AppointmentCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            AppointmentCommand::LogUsage(cmd) => self.handle_log_usage(cmd),
            AppointmentCommand::ConfirmConsumption(cmd) => self.handle_confirm_consumption(cmd),
            AppointmentCommand::RejectConsumption(cmd) => self.handle_reject_consumption(cmd),
        }
    }
}

impl Appointment {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_appointment_id(&self, appointment_id: AppointmentId) -> Result<(), DomainError> {
        if self.id != appointment_id {
            return Err(DomainError::validation("appointment_id mismatch"));
        }
        Ok(())
    }

    fn handle_request(
        &self,
        cmd: &RequestAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("appointment already exists"));
        }
        cmd.details.validate()?;

        Ok(vec![AppointmentEvent::AppointmentRequested(
            AppointmentRequested {
                appointment_id: cmd.appointment_id,
                details: cmd.details.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApproveAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if self.status != AppointmentStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot approve an appointment that is {}",
                self.status
            )));
        }

        Ok(vec![AppointmentEvent::AppointmentApproved(
            AppointmentApproved {
                appointment_id: cmd.appointment_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reject(
        &self,
        cmd: &RejectAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if self.status != AppointmentStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot reject an appointment that is {}",
                self.status
            )));
        }

        Ok(vec![AppointmentEvent::AppointmentRejected(
            AppointmentRejected {
                appointment_id: cmd.appointment_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        // Cancelling never reverses confirmed consumption; those facts stand.
        if !matches!(
            self.status,
            AppointmentStatus::Pending | AppointmentStatus::Approved
        ) {
            return Err(DomainError::invalid_transition(format!(
                "cannot cancel an appointment that is {}",
                self.status
            )));
        }

        Ok(vec![AppointmentEvent::AppointmentCancelled(
            AppointmentCancelled {
                appointment_id: cmd.appointment_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reschedule(
        &self,
        cmd: &RescheduleAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if self.status != AppointmentStatus::Approved {
            return Err(DomainError::invalid_transition(format!(
                "cannot reschedule an appointment that is {}",
                self.status
            )));
        }
        if cmd.replacement_id == cmd.appointment_id {
            return Err(DomainError::validation(
                "replacement must be a different appointment",
            ));
        }

        Ok(vec![AppointmentEvent::AppointmentRescheduled(
            AppointmentRescheduled {
                appointment_id: cmd.appointment_id,
                replacement_id: cmd.replacement_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if self.status != AppointmentStatus::Approved {
            return Err(DomainError::invalid_transition(format!(
                "payment can only be recorded on an approved appointment (status is {})",
                self.status
            )));
        }

        let next = payment::advance(self.payment_status, cmd.kind)?;

        Ok(vec![AppointmentEvent::PaymentRecorded(PaymentRecorded {
            appointment_id: cmd.appointment_id,
            kind: cmd.kind,
            method: cmd.method,
            payment_status: next,
            confirmed_at: cmd.confirmed_at,
        })])
    }

    fn handle_log_usage(&self, cmd: &LogUsage) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !matches!(
            self.status,
            AppointmentStatus::Pending | AppointmentStatus::Approved
        ) {
            return Err(DomainError::invalid_transition(format!(
                "cannot log usage against an appointment that is {}",
                self.status
            )));
        }
        if self.line(cmd.line_id).is_some() {
            return Err(DomainError::conflict("line_id already logged"));
        }

        Ok(vec![AppointmentEvent::UsageLogged(UsageLogged {
            appointment_id: cmd.appointment_id,
            line_id: cmd.line_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_consumption(
        &self,
        cmd: &ConfirmConsumption,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        let line = self.line(cmd.line_id).ok_or(DomainError::NotFound)?;
        if line.status != DeductionStatus::Pending {
            // The transition guard is the idempotence mechanism: a retried
            // confirm lands here and never re-emits the deduction.
            return Err(DomainError::invalid_transition(format!(
                "consumption line is already {}",
                line.status
            )));
        }

        Ok(vec![AppointmentEvent::ConsumptionConfirmed(
            ConsumptionConfirmed {
                appointment_id: cmd.appointment_id,
                line_id: cmd.line_id,
                item_id: line.item_id,
                quantity: line.quantity,
                approved_by: cmd.approved_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reject_consumption(
        &self,
        cmd: &RejectConsumption,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("a rejection reason is required"));
        }
        let line = self.line(cmd.line_id).ok_or(DomainError::NotFound)?;
        if line.status != DeductionStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "consumption line is already {}",
                line.status
            )));
        }

        Ok(vec![AppointmentEvent::ConsumptionRejected(
            ConsumptionRejected {
                appointment_id: cmd.appointment_id,
                line_id: cmd.line_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
