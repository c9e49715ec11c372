//! Staff availability domain module.
//!
//! This crate contains the bookable-slot rules, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod availability;

pub use availability::{AvailabilityProfile, LunchWindow, check_slot, generate_slots};
