//! Revenue attribution over appointment snapshot rows.
//!
//! Revenue is recognized at full service price, once, in the bucket holding
//! the settlement date. The settlement date prefers the remaining-balance
//! confirmation over the one-shot full payment, and falls back to the
//! appointment date for rows settled without timestamps. Deposits alone
//! recognize nothing.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use vetledger_appointments::{AppointmentSnapshot, AppointmentStatus};
use vetledger_core::{DomainError, DomainResult};

/// Day-bucketed reports are capped at this span; longer periods switch to
/// month buckets.
pub const DAY_BUCKET_MAX_DAYS: i64 = 60;

/// Inclusive reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportPeriod {
    pub fn new(from: NaiveDate, to: NaiveDate) -> DomainResult<Self> {
        if from > to {
            return Err(DomainError::validation(
                "period start must not be after period end",
            ));
        }
        Ok(Self { from, to })
    }

    /// Number of calendar days the period spans, endpoints inclusive.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Bucket granularity: days up to [`DAY_BUCKET_MAX_DAYS`], months beyond.
    pub fn granularity(&self) -> Granularity {
        if self.days() <= DAY_BUCKET_MAX_DAYS {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }

    pub fn bucket_for(&self, date: NaiveDate) -> Bucket {
        match self.granularity() {
            Granularity::Day => Bucket::Day(date),
            Granularity::Month => Bucket::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Day,
    Month,
}

/// One time bucket of a revenue series. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl core::fmt::Display for Bucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Bucket::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Bucket::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

/// One point of the recognized-revenue series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub bucket: Bucket,
    /// Minor currency units.
    pub total: i64,
    pub appointments: u64,
}

/// Recognized revenue over a period, bucketed chronologically.
///
/// A snapshot contributes iff it is an approved, settled appointment with a
/// positive price and its bucket date falls inside the period. Each
/// contributing row adds its full price to exactly one bucket.
pub fn recognized_revenue(
    rows: &[AppointmentSnapshot],
    period: &ReportPeriod,
) -> Vec<RevenuePoint> {
    let mut buckets: BTreeMap<Bucket, (i64, u64)> = BTreeMap::new();

    for row in rows {
        if !contributes(row) {
            continue;
        }
        let date = row.revenue_bucket_date();
        if !period.contains(date) {
            continue;
        }
        let entry = buckets.entry(period.bucket_for(date)).or_insert((0, 0));
        entry.0 += row.price;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(bucket, (total, appointments))| RevenuePoint {
            bucket,
            total,
            appointments,
        })
        .collect()
}

fn contributes(row: &AppointmentSnapshot) -> bool {
    row.status == AppointmentStatus::Approved && row.price > 0 && row.is_settled()
}

/// One slice of the service-mix report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceShare {
    pub service: String,
    pub appointments: u64,
    pub revenue: i64,
    /// Share of total recognized revenue, in percent.
    pub share_pct: f64,
}

/// Distribution of recognized revenue across services, largest first.
pub fn service_distribution(
    rows: &[AppointmentSnapshot],
    period: &ReportPeriod,
) -> Vec<ServiceShare> {
    let mut by_service: BTreeMap<String, (u64, i64)> = BTreeMap::new();

    for row in rows {
        if !contributes(row) || !period.contains(row.revenue_bucket_date()) {
            continue;
        }
        let entry = by_service.entry(row.service.clone()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += row.price;
    }

    let total: i64 = by_service.values().map(|(_, revenue)| revenue).sum();
    let mut shares: Vec<ServiceShare> = by_service
        .into_iter()
        .map(|(service, (appointments, revenue))| ServiceShare {
            service,
            appointments,
            revenue,
            share_pct: if total > 0 {
                revenue as f64 * 100.0 / total as f64
            } else {
                0.0
            },
        })
        .collect();
    shares.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.service.cmp(&b.service)));
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveTime, Utc};
    use vetledger_appointments::{AppointmentId, AppointmentStatus};
    use vetledger_core::{AggregateId, StaffId};

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn at(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(14, 0, 0).unwrap().and_utc()
    }

    fn row(service: &str, price: i64, date: NaiveDate) -> AppointmentSnapshot {
        AppointmentSnapshot {
            appointment_id: AppointmentId::new(AggregateId::new()),
            pet_name: "Miso".to_string(),
            owner_name: "Dana Reyes".to_string(),
            owner_email: "dana@example.com".to_string(),
            owner_phone: "555-0141".to_string(),
            service: service.to_string(),
            price,
            date,
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            staff_id: StaffId::new(),
            status: AppointmentStatus::Approved,
            payment_status: None,
            payment_method: None,
            deposit_confirmed_at: None,
            full_payment_confirmed_at: None,
            remaining_balance_confirmed_at: None,
            replaced_by: None,
            lines: Vec::new(),
        }
    }

    fn settled_row(service: &str, price: i64, settled_on: NaiveDate) -> AppointmentSnapshot {
        let mut r = row(service, price, settled_on);
        r.full_payment_confirmed_at = Some(at(settled_on));
        r
    }

    #[test]
    fn short_periods_bucket_by_day_long_periods_by_month() {
        let p = ReportPeriod::new(day(2024, 3, 1), day(2024, 4, 29)).unwrap();
        assert_eq!(p.days(), 60);
        assert_eq!(p.granularity(), Granularity::Day);

        let p = ReportPeriod::new(day(2024, 3, 1), day(2024, 4, 30)).unwrap();
        assert_eq!(p.days(), 61);
        assert_eq!(p.granularity(), Granularity::Month);
    }

    #[test]
    fn inverted_period_is_rejected() {
        let err = ReportPeriod::new(day(2024, 4, 1), day(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn full_price_lands_in_the_settlement_month() {
        // Appointment in February, settled in March: revenue is March's.
        let mut r = row("Vaccination", 1000, day(2024, 2, 20));
        r.full_payment_confirmed_at = Some(at(day(2024, 3, 15)));

        let period = ReportPeriod::new(day(2024, 1, 1), day(2024, 6, 30)).unwrap();
        let points = recognized_revenue(&[r], &period);

        assert_eq!(points.len(), 1);
        assert_eq!(
            points[0].bucket,
            Bucket::Month {
                year: 2024,
                month: 3
            }
        );
        assert_eq!(points[0].total, 1000);
        assert_eq!(points[0].appointments, 1);
    }

    #[test]
    fn remaining_balance_timestamp_outranks_full_payment() {
        let mut r = row("Surgery", 5000, day(2024, 2, 20));
        r.deposit_confirmed_at = Some(at(day(2024, 2, 21)));
        r.full_payment_confirmed_at = Some(at(day(2024, 3, 1)));
        r.remaining_balance_confirmed_at = Some(at(day(2024, 4, 2)));

        let period = ReportPeriod::new(day(2024, 1, 1), day(2024, 6, 30)).unwrap();
        let points = recognized_revenue(&[r], &period);

        assert_eq!(points.len(), 1);
        assert_eq!(
            points[0].bucket,
            Bucket::Month {
                year: 2024,
                month: 4
            }
        );
        // Full price, not just the balance.
        assert_eq!(points[0].total, 5000);
    }

    #[test]
    fn deposits_alone_recognize_nothing() {
        let mut r = row("Grooming", 800, day(2024, 3, 5));
        r.deposit_confirmed_at = Some(at(day(2024, 3, 5)));

        let period = ReportPeriod::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();
        assert!(recognized_revenue(&[r], &period).is_empty());
    }

    #[test]
    fn cancelled_and_zero_priced_rows_recognize_nothing() {
        let mut cancelled = settled_row("Vaccination", 1000, day(2024, 3, 5));
        cancelled.status = AppointmentStatus::Cancelled;
        let free = settled_row("Checkup", 0, day(2024, 3, 6));

        let period = ReportPeriod::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();
        assert!(recognized_revenue(&[cancelled.clone(), free.clone()], &period).is_empty());
        assert!(service_distribution(&[cancelled, free], &period).is_empty());
    }

    #[test]
    fn settlements_outside_the_period_are_excluded() {
        let r = settled_row("Vaccination", 1000, day(2024, 5, 2));
        let period = ReportPeriod::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();
        assert!(recognized_revenue(&[r], &period).is_empty());
    }

    #[test]
    fn day_buckets_accumulate_and_sort_chronologically() {
        let rows = vec![
            settled_row("Vaccination", 1000, day(2024, 3, 10)),
            settled_row("Grooming", 500, day(2024, 3, 4)),
            settled_row("Vaccination", 1000, day(2024, 3, 4)),
        ];
        let period = ReportPeriod::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();
        let points = recognized_revenue(&rows, &period);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].bucket, Bucket::Day(day(2024, 3, 4)));
        assert_eq!(points[0].total, 1500);
        assert_eq!(points[0].appointments, 2);
        assert_eq!(points[1].bucket, Bucket::Day(day(2024, 3, 10)));
        assert_eq!(points[1].total, 1000);
    }

    #[test]
    fn service_distribution_reports_shares_largest_first() {
        let rows = vec![
            settled_row("Vaccination", 1000, day(2024, 3, 4)),
            settled_row("Vaccination", 1000, day(2024, 3, 6)),
            settled_row("Grooming", 500, day(2024, 3, 8)),
        ];
        let period = ReportPeriod::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();
        let shares = service_distribution(&rows, &period);

        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].service, "Vaccination");
        assert_eq!(shares[0].appointments, 2);
        assert_eq!(shares[0].revenue, 2000);
        assert!((shares[0].share_pct - 80.0).abs() < 1e-9);
        assert_eq!(shares[1].service, "Grooming");
        assert!((shares[1].share_pct - 20.0).abs() < 1e-9);
    }
}
