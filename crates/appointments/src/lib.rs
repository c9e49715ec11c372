//! Appointment domain module (event-sourced).
//!
//! The [`Appointment`] aggregate owns three coupled concerns of one clinic
//! visit: the booking status machine, the append-only payment axis, and the
//! consumption lines that drive stock deduction once staff confirm them.
//! All logic is deterministic and IO-free; storage and projections live in
//! the infra crate.

pub mod appointment;
pub mod payment;
pub mod snapshot;

pub use appointment::{
    Appointment, AppointmentApproved, AppointmentCancelled, AppointmentCommand, AppointmentEvent,
    AppointmentId, AppointmentRejected, AppointmentRequested, AppointmentRescheduled,
    AppointmentStatus, ApproveAppointment, BookingDetails, CancelAppointment, ConfirmConsumption,
    ConsumptionConfirmed, ConsumptionLine, ConsumptionRejected, DeductionStatus, LineId, LogUsage,
    PaymentRecorded, RecordPayment, RejectAppointment, RejectConsumption, RequestAppointment,
    RescheduleAppointment, UsageLogged,
};
pub use payment::{PaymentKind, PaymentMethod, PaymentRecord, PaymentStatus};
pub use snapshot::AppointmentSnapshot;
