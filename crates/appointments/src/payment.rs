//! Payment sub-state machine.
//!
//! Payment confirmations are a typed, append-only list of [`PaymentRecord`]s;
//! derivations select records by kind instead of probing optional fields.
//! The payment axis is independent of the appointment status axis, is only
//! meaningful once an appointment is approved, and never regresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vetledger_core::{DomainError, DomainResult};

/// Current position on the payment axis. Absent means no payment workflow
/// has started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    DownPaymentPaid,
    FullyPaid,
}

/// Kind of a payment confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Partial advance payment (down payment).
    DepositConfirmed,
    /// Full settlement in one payment, no prior deposit required.
    FullPaymentConfirmed,
    /// Settlement of the balance remaining after a deposit.
    RemainingBalanceConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Ewallet,
}

/// One confirmed payment fact. Append-only; never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub confirmed_at: DateTime<Utc>,
}

/// Advance the payment axis by one confirmation.
///
/// Legal paths: `(absent) → DownPaymentPaid → FullyPaid`, or
/// `(absent) → FullyPaid` directly. Anything else is an invalid transition.
pub fn advance(
    current: Option<PaymentStatus>,
    kind: PaymentKind,
) -> DomainResult<PaymentStatus> {
    match (current, kind) {
        (None, PaymentKind::DepositConfirmed) => Ok(PaymentStatus::DownPaymentPaid),
        (None, PaymentKind::FullPaymentConfirmed) => Ok(PaymentStatus::FullyPaid),
        (None, PaymentKind::RemainingBalanceConfirmed) => Err(DomainError::invalid_transition(
            "remaining balance requires a prior deposit",
        )),
        (Some(PaymentStatus::DownPaymentPaid), PaymentKind::RemainingBalanceConfirmed)
        | (Some(PaymentStatus::DownPaymentPaid), PaymentKind::FullPaymentConfirmed) => {
            Ok(PaymentStatus::FullyPaid)
        }
        (Some(PaymentStatus::DownPaymentPaid), PaymentKind::DepositConfirmed) => Err(
            DomainError::invalid_transition("deposit has already been confirmed"),
        ),
        (Some(PaymentStatus::FullyPaid), _) => Err(DomainError::invalid_transition(
            "appointment is already fully paid",
        )),
    }
}

/// When the appointment became fully settled, if it did.
///
/// Prefers the remaining-balance confirmation over the full-payment
/// confirmation; this same priority drives revenue attribution.
pub fn settled_at(records: &[PaymentRecord]) -> Option<DateTime<Utc>> {
    let by_kind = |kind: PaymentKind| {
        records
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.confirmed_at)
    };
    by_kind(PaymentKind::RemainingBalanceConfirmed)
        .or_else(|| by_kind(PaymentKind::FullPaymentConfirmed))
}
