//! Bookable-slot computation from staff availability profiles.
//!
//! Slot generation is a pure function: same profile + date always yields the
//! same sequence. No hidden state, restartable.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use vetledger_core::{DomainError, DomainResult, StaffId};

/// Lunch window within the working day. Slots intersecting it are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// One staff member's availability profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityProfile {
    pub staff_id: StaffId,
    pub working_days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Appointment duration in minutes; also the generation step.
    pub slot_minutes: u32,
    /// Minimum gap reserved between two consecutive bookings.
    pub break_minutes: u32,
    pub lunch: Option<LunchWindow>,
}

impl AvailabilityProfile {
    pub fn validate(&self) -> DomainResult<()> {
        if self.slot_minutes == 0 {
            return Err(DomainError::validation("slot duration must be positive"));
        }
        if self.start >= self.end {
            return Err(DomainError::validation(
                "working window start must be before end",
            ));
        }
        if let Some(lunch) = self.lunch {
            if lunch.start >= lunch.end {
                return Err(DomainError::validation(
                    "lunch window start must be before end",
                ));
            }
            if lunch.start < self.start || lunch.end > self.end {
                return Err(DomainError::validation(
                    "lunch window must fall within working hours",
                ));
            }
        }
        Ok(())
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.working_days.contains(&weekday)
    }
}

fn minutes_from_midnight(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

fn time_at(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// Generate the bookable slot start times for one staff member on one date.
///
/// Empty when the weekday is not a working day. Otherwise walks from the
/// window start in steps of `slot_minutes`, emitting each step's start time;
/// a step whose service window intersects the lunch window is skipped
/// entirely, not shortened.
pub fn generate_slots(profile: &AvailabilityProfile, date: NaiveDate) -> Vec<NaiveTime> {
    if profile.slot_minutes == 0 || !profile.works_on(date.weekday()) {
        return Vec::new();
    }

    let step = profile.slot_minutes;
    let day_start = minutes_from_midnight(profile.start);
    let day_end = minutes_from_midnight(profile.end);
    let lunch = profile
        .lunch
        .map(|l| (minutes_from_midnight(l.start), minutes_from_midnight(l.end)));

    let mut slots = Vec::new();
    let mut cursor = day_start;
    while cursor + step <= day_end {
        let overlaps_lunch = lunch
            .map(|(ls, le)| cursor < le && ls < cursor + step)
            .unwrap_or(false);
        if !overlaps_lunch {
            if let Some(t) = time_at(cursor) {
                slots.push(t);
            }
        }
        cursor += step;
    }
    slots
}

/// Combined slot legality check for a booking request.
///
/// A requested time is legal when it is one of the generated slots for the
/// date, and its service window keeps at least `break_minutes` of clearance
/// from every other pending/approved booking window for the same staff
/// member on that date. A booking at exactly the same start time is allowed:
/// double-booked slots are surfaced to staff for review rather than
/// hard-blocked.
pub fn check_slot(
    profile: &AvailabilityProfile,
    date: NaiveDate,
    requested: NaiveTime,
    booked: &[NaiveTime],
) -> DomainResult<()> {
    profile.validate()?;

    let slots = generate_slots(profile, date);
    if !slots.contains(&requested) {
        return Err(DomainError::slot_unavailable(format!(
            "{date} {requested} is not offered by the staff member's profile"
        )));
    }

    let duration = i64::from(profile.slot_minutes);
    let clearance = i64::from(profile.break_minutes);
    let requested_start = i64::from(minutes_from_midnight(requested));

    for &other in booked {
        if other == requested {
            // Same slot: permitted, resolved manually by staff.
            continue;
        }
        let other_start = i64::from(minutes_from_midnight(other));
        let gap = if other_start > requested_start {
            other_start - (requested_start + duration)
        } else {
            requested_start - (other_start + duration)
        };
        if gap < clearance {
            return Err(DomainError::slot_unavailable(format!(
                "{date} {requested} falls within the break window of an existing booking"
            )));
        }
    }

    Ok(())
}
