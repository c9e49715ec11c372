//! Flat appointment row for read models and reporting.
//!
//! A snapshot is plain data rebuilt from the event stream; it duplicates the
//! aggregate's derivations (`is_settled`, `settled_at`) so reporting code can
//! work from rows alone without rehydrating aggregates.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use vetledger_core::StaffId;

use crate::appointment::{AppointmentId, AppointmentStatus, ConsumptionLine};
use crate::payment::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    pub appointment_id: AppointmentId,
    pub pet_name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_phone: String,
    pub service: String,
    /// Price snapshot at booking time, minor currency units.
    pub price: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub staff_id: StaffId,
    pub status: AppointmentStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub deposit_confirmed_at: Option<DateTime<Utc>>,
    pub full_payment_confirmed_at: Option<DateTime<Utc>>,
    pub remaining_balance_confirmed_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<AppointmentId>,
    pub lines: Vec<ConsumptionLine>,
}

impl AppointmentSnapshot {
    pub fn is_settled(&self) -> bool {
        self.settled_at().is_some()
    }

    /// Settlement timestamp, preferring the remaining-balance confirmation
    /// over the one-shot full payment. `None` while unsettled.
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.remaining_balance_confirmed_at
            .or(self.full_payment_confirmed_at)
    }

    /// Date a revenue report buckets this appointment under: the settlement
    /// date when known, otherwise the appointment date itself.
    pub fn revenue_bucket_date(&self) -> NaiveDate {
        self.settled_at()
            .map(|ts| ts.date_naive())
            .unwrap_or(self.date)
    }
}
