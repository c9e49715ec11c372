//! End-to-end pipeline tests: commands through the dispatcher, projections
//! folded synchronously, queries answered from read models.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::Value as JsonValue;

use vetledger_access::{AccessContext, Role};
use vetledger_appointments::{
    AppointmentId, AppointmentStatus, BookingDetails, DeductionStatus, PaymentKind, PaymentMethod,
    PaymentStatus,
};
use vetledger_core::{AggregateId, StaffId};
use vetledger_events::{EventEnvelope, InMemoryEventBus};
use vetledger_inventory::{
    ForecastParams, InventoryItemId, RegisterItem, SetForecastParams, SetStockLevel,
};
use vetledger_reporting::{Bucket, ReportPeriod, StockHealth, recognized_revenue};
use vetledger_scheduling::AvailabilityProfile;

use crate::command_dispatcher::DispatchError;
use crate::event_store::InMemoryEventStore;
use crate::services::{
    AppointmentLedger, ConsumptionForecaster, InMemoryProfileStore, InventoryReconciler, Pipeline,
    ProfileStore,
};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Clinic {
    pipeline: Arc<Pipeline<Store, Bus>>,
    ledger: AppointmentLedger<Store, Bus, Arc<InMemoryProfileStore>>,
    reconciler: InventoryReconciler<Store, Bus>,
    forecaster: ConsumptionForecaster<Store, Bus>,
    profiles: Arc<InMemoryProfileStore>,
    staff_id: StaffId,
}

fn clinic() -> Clinic {
    vetledger_observability::init();

    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let pipeline = Arc::new(Pipeline::new(store, bus));
    let profiles = Arc::new(InMemoryProfileStore::new());

    let staff_id = StaffId::new();
    profiles.upsert(AvailabilityProfile {
        staff_id,
        working_days: vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ],
        start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        slot_minutes: 30,
        break_minutes: 0,
        lunch: None,
    });

    Clinic {
        ledger: AppointmentLedger::new(pipeline.clone(), profiles.clone()),
        reconciler: InventoryReconciler::new(pipeline.clone()),
        forecaster: ConsumptionForecaster::new(pipeline.clone()),
        pipeline,
        profiles,
        staff_id,
    }
}

fn monday() -> NaiveDate {
    // 2024-03-04 is a Monday.
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

fn booking(clinic: &Clinic, time: NaiveTime) -> BookingDetails {
    BookingDetails {
        pet_name: "Miso".to_string(),
        owner_name: "Dana Reyes".to_string(),
        owner_email: "dana@example.com".to_string(),
        owner_phone: "555-0141".to_string(),
        service: "Vaccination".to_string(),
        price: 1000,
        date: monday(),
        time,
        staff_id: clinic.staff_id,
    }
}

fn staff_ctx() -> AccessContext {
    AccessContext::new("frontdesk", Role::Staff)
}

fn approved_appointment(clinic: &Clinic, time: NaiveTime) -> AppointmentId {
    let ctx = staff_ctx();
    let id = clinic
        .ledger
        .request(&ctx, booking(clinic, time), at(monday(), 8))
        .unwrap();
    clinic.ledger.approve(&ctx, id, at(monday(), 8)).unwrap();
    id
}

fn registered_item(clinic: &Clinic, stock: i64) -> InventoryItemId {
    clinic
        .reconciler
        .register_item(RegisterItem {
            item_id: InventoryItemId::new(AggregateId::new()),
            name: "Rabies vaccine".to_string(),
            category: "Vaccines".to_string(),
            price: 250,
            expiry: None,
            initial_stock: stock,
            occurred_at: at(monday(), 7),
        })
        .unwrap()
}

fn nine_thirty() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap()
}

#[test]
fn weekday_profile_offers_sixteen_half_hour_slots() {
    let clinic = clinic();

    let slots = clinic
        .ledger
        .available_slots(clinic.staff_id, monday())
        .unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0], NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    assert_eq!(slots[15], NaiveTime::from_hms_opt(16, 30, 0).unwrap());

    // 2024-03-09 is a Saturday.
    let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    assert!(clinic
        .ledger
        .available_slots(clinic.staff_id, saturday)
        .unwrap()
        .is_empty());
}

#[test]
fn booking_lifecycle_from_request_to_settlement() {
    let clinic = clinic();
    let ctx = staff_ctx();

    let id = clinic
        .ledger
        .request(&ctx, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();
    assert_eq!(
        clinic.ledger.get(&ctx, id).unwrap().status,
        AppointmentStatus::Pending
    );

    clinic.ledger.approve(&ctx, id, at(monday(), 8)).unwrap();
    clinic
        .ledger
        .record_payment(
            &ctx,
            id,
            PaymentKind::FullPaymentConfirmed,
            PaymentMethod::Card,
            at(monday(), 10),
        )
        .unwrap();

    let row = clinic.ledger.get(&ctx, id).unwrap();
    assert_eq!(row.status, AppointmentStatus::Approved);
    assert_eq!(row.payment_status, Some(PaymentStatus::FullyPaid));
    assert!(row.is_settled());
    assert_eq!(row.settled_at(), Some(at(monday(), 10)));
}

#[test]
fn off_grid_request_is_rejected_and_double_booking_is_not() {
    let clinic = clinic();
    let ctx = staff_ctx();

    // 09:10 is not on the half-hour grid.
    let err = clinic
        .ledger
        .request(
            &ctx,
            booking(&clinic, NaiveTime::from_hms_opt(9, 10, 0).unwrap()),
            at(monday(), 8),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::SlotUnavailable(_)));

    // Two requests for the same slot are both accepted; staff resolve them.
    clinic
        .ledger
        .request(&ctx, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();
    clinic
        .ledger
        .request(&ctx, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();
}

#[test]
fn break_spacing_blocks_adjacent_bookings() {
    let clinic = clinic();
    let ctx = staff_ctx();
    // Tighten the profile: 30-minute slots with a 15-minute break.
    let mut profile = clinic.profiles.get(clinic.staff_id).unwrap();
    profile.break_minutes = 15;
    clinic.profiles.upsert(profile);

    clinic
        .ledger
        .request(&ctx, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();

    // 10:00 starts the instant the 09:30 window ends; the break is unmet.
    let err = clinic
        .ledger
        .request(
            &ctx,
            booking(&clinic, NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            at(monday(), 8),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::SlotUnavailable(_)));

    // 10:30 leaves a 30-minute gap and is fine.
    clinic
        .ledger
        .request(
            &ctx,
            booking(&clinic, NaiveTime::from_hms_opt(10, 30, 0).unwrap()),
            at(monday(), 8),
        )
        .unwrap();
}

#[test]
fn confirmed_consumption_deducts_stock_exactly_once() {
    let clinic = clinic();
    let item = registered_item(&clinic, 20);
    let appointment = approved_appointment(&clinic, nine_thirty());
    let approver = StaffId::new();

    let line = clinic
        .reconciler
        .log_usage(appointment, item, 5, at(monday(), 10))
        .unwrap();

    // Logging alone does not touch stock.
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 20);

    clinic
        .reconciler
        .confirm(appointment, line, approver, at(monday(), 11))
        .unwrap();
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 15);

    // A retried confirmation fails and deducts nothing further.
    let err = clinic
        .reconciler
        .confirm(appointment, line, approver, at(monday(), 11))
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition(_)));
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 15);
}

#[test]
fn rejected_consumption_never_touches_stock() {
    let clinic = clinic();
    let item = registered_item(&clinic, 20);
    let appointment = approved_appointment(&clinic, nine_thirty());

    let line = clinic
        .reconciler
        .log_usage(appointment, item, 5, at(monday(), 10))
        .unwrap();
    clinic
        .reconciler
        .reject(appointment, line, "wrong visit", at(monday(), 11))
        .unwrap();

    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 20);
    assert!(clinic.reconciler.pending_lines().is_empty());

    let ctx = staff_ctx();
    let row = clinic.ledger.get(&ctx, appointment).unwrap();
    assert_eq!(row.lines[0].status, DeductionStatus::Rejected);
}

#[test]
fn settled_revenue_lands_in_the_settlement_bucket() {
    let clinic = clinic();
    let ctx = staff_ctx();
    let id = approved_appointment(&clinic, nine_thirty());

    // Price 1000, full payment confirmed 2024-03-15.
    clinic
        .ledger
        .record_payment(
            &ctx,
            id,
            PaymentKind::FullPaymentConfirmed,
            PaymentMethod::Cash,
            at(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 12),
        )
        .unwrap();

    let rows = clinic.ledger.list(&ctx);
    let period = ReportPeriod::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    )
    .unwrap();
    let points = recognized_revenue(&rows, &period);

    assert_eq!(points.len(), 1);
    assert_eq!(
        points[0].bucket,
        Bucket::Month {
            year: 2024,
            month: 3
        }
    );
    assert_eq!(points[0].total, 1000);
}

#[test]
fn reorder_classification_follows_the_reorder_point() {
    let clinic = clinic();
    let params = ForecastParams {
        reorder_point: 10,
        target_level: 40,
        lead_time_days: 7,
        safety_stock: 5,
    };

    for (stock, expected) in [
        (8, StockHealth::ReorderNow),
        (11, StockHealth::Monitor),
        (20, StockHealth::Safe),
    ] {
        let item = registered_item(&clinic, stock);
        clinic
            .reconciler
            .set_forecast_params(SetForecastParams {
                item_id: item,
                params,
                occurred_at: at(monday(), 7),
            })
            .unwrap();
        assert_eq!(clinic.forecaster.health(item).unwrap(), expected);
    }
}

#[test]
fn daily_use_and_stockout_come_from_confirmed_lines_only() {
    let clinic = clinic();
    let item = registered_item(&clinic, 12);
    let approver = StaffId::new();

    let first = approved_appointment(&clinic, nine_thirty());
    let second = approved_appointment(&clinic, NaiveTime::from_hms_opt(11, 0, 0).unwrap());

    let confirmed = clinic
        .reconciler
        .log_usage(first, item, 4, at(monday(), 10))
        .unwrap();
    clinic
        .reconciler
        .confirm(first, confirmed, approver, at(monday(), 11))
        .unwrap();

    // A pending line contributes nothing to the burn rate.
    clinic
        .reconciler
        .log_usage(second, item, 9, at(monday(), 12))
        .unwrap();

    assert!((clinic.forecaster.daily_use(item) - 4.0).abs() < 1e-9);

    let projection = clinic.forecaster.stockout(item).unwrap();
    assert_eq!(projection.current_stock, 8);
    assert_eq!(projection.days_until_stockout, 2);
}

#[test]
fn stockout_without_history_is_insufficient_data() {
    let clinic = clinic();
    let item = registered_item(&clinic, 20);

    let err = clinic.forecaster.stockout(item).unwrap_err();
    assert!(matches!(err, DispatchError::InsufficientData(_)));
}

#[test]
fn reschedule_keeps_history_and_spawns_a_pending_replacement() {
    let clinic = clinic();
    let ctx = staff_ctx();
    let id = approved_appointment(&clinic, nine_thirty());

    let new_time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
    let replacement = clinic
        .ledger
        .reschedule(&ctx, id, monday(), new_time, at(monday(), 9))
        .unwrap();

    let old = clinic.ledger.get(&ctx, id).unwrap();
    assert_eq!(old.status, AppointmentStatus::Rescheduled);
    assert_eq!(old.replaced_by, Some(replacement));

    let new = clinic.ledger.get(&ctx, replacement).unwrap();
    assert_eq!(new.status, AppointmentStatus::Pending);
    assert_eq!(new.time, new_time);
    assert_eq!(new.price, old.price);
}

#[test]
fn reschedule_is_not_blocked_by_the_appointments_own_slot() {
    let clinic = clinic();
    let ctx = staff_ctx();
    // 30-minute slots with a 15-minute break between bookings.
    let mut profile = clinic.profiles.get(clinic.staff_id).unwrap();
    profile.break_minutes = 15;
    clinic.profiles.upsert(profile);

    let id = approved_appointment(&clinic, nine_thirty());

    // 10:00 is adjacent to the current 09:30 slot; moving there is fine
    // because the old slot frees when the original is marked rescheduled.
    let adjacent = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    let replacement = clinic
        .ledger
        .reschedule(&ctx, id, monday(), adjacent, at(monday(), 9))
        .unwrap();

    assert_eq!(
        clinic.ledger.get(&ctx, id).unwrap().status,
        AppointmentStatus::Rescheduled
    );
    assert_eq!(clinic.ledger.get(&ctx, replacement).unwrap().time, adjacent);
}

#[test]
fn owners_see_only_their_own_bookings() {
    let clinic = clinic();
    let ctx = staff_ctx();

    clinic
        .ledger
        .request(&ctx, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();

    let mut other = booking(&clinic, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    other.owner_name = "Sam Ortiz".to_string();
    other.owner_email = "sam@example.com".to_string();
    clinic.ledger.request(&ctx, other, at(monday(), 8)).unwrap();

    let dana = AccessContext::new("dana@example.com", Role::Owner);
    let rows = clinic.ledger.list(&dana);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].owner_email, "dana@example.com");

    assert_eq!(clinic.ledger.list(&staff_ctx()).len(), 2);
}

#[test]
fn owners_cannot_take_clinic_decisions_or_cancel_strangers_bookings() {
    let clinic = clinic();
    let staff = staff_ctx();

    let id = clinic
        .ledger
        .request(&staff, booking(&clinic, nine_thirty()), at(monday(), 8))
        .unwrap();

    let stranger = AccessContext::new("sam@example.com", Role::Owner);
    let err = clinic.ledger.approve(&stranger, id, at(monday(), 8)).unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    // The booking belongs to dana; sam cannot even see it, let alone cancel.
    let err = clinic.ledger.cancel(&stranger, id, at(monday(), 9)).unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));

    // The owner on record may cancel their own booking.
    let dana = AccessContext::new("dana@example.com", Role::Owner);
    clinic.ledger.cancel(&dana, id, at(monday(), 9)).unwrap();
    assert_eq!(
        clinic.ledger.get(&staff, id).unwrap().status,
        AppointmentStatus::Cancelled
    );
}

#[test]
fn projections_rebuild_to_the_same_state() {
    let clinic = clinic();
    let ctx = staff_ctx();
    let item = registered_item(&clinic, 20);
    let appointment = approved_appointment(&clinic, nine_thirty());
    let line = clinic
        .reconciler
        .log_usage(appointment, item, 5, at(monday(), 10))
        .unwrap();
    clinic
        .reconciler
        .confirm(appointment, line, StaffId::new(), at(monday(), 11))
        .unwrap();

    let rows_before = clinic.ledger.list(&ctx);
    let stock_before = clinic.reconciler.stock_level(item).unwrap();

    clinic.pipeline.rebuild_projections().unwrap();

    assert_eq!(clinic.ledger.list(&ctx), rows_before);
    assert_eq!(clinic.reconciler.stock_level(item).unwrap(), stock_before);
    assert_eq!(clinic.pipeline.consumption().facts().len(), 1);
}

#[test]
fn rebuild_preserves_an_override_recorded_after_a_confirmation() {
    let clinic = clinic();
    let item = registered_item(&clinic, 20);
    let appointment = approved_appointment(&clinic, nine_thirty());

    let line = clinic
        .reconciler
        .log_usage(appointment, item, 5, at(monday(), 10))
        .unwrap();
    clinic
        .reconciler
        .confirm(appointment, line, StaffId::new(), at(monday(), 11))
        .unwrap();
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 15);

    // A physical recount overrides the derived level after the deduction.
    clinic
        .reconciler
        .set_stock_level(SetStockLevel {
            item_id: item,
            quantity: 10,
            occurred_at: at(monday(), 12),
        })
        .unwrap();
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 10);

    // Override and deduction do not commute; replay must keep their order.
    clinic.pipeline.rebuild_projections().unwrap();
    assert_eq!(clinic.reconciler.stock_level(item).unwrap().on_hand, 10);
}

#[test]
fn usage_against_an_unknown_item_is_not_found() {
    let clinic = clinic();
    let appointment = approved_appointment(&clinic, nine_thirty());

    let err = clinic
        .reconciler
        .log_usage(
            appointment,
            InventoryItemId::new(AggregateId::new()),
            1,
            at(monday(), 10),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}
