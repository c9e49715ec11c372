//! Command execution pipeline.
//!
//! One consistent lifecycle for every aggregate command:
//!
//! ```text
//! load stream -> rehydrate aggregate -> handle command
//!   -> append with optimistic concurrency -> publish committed events
//! ```
//!
//! The dispatcher composes the `EventStore` and `EventBus` traits and
//! contains no IO itself. Events are persisted before publication; a failed
//! publish after a successful append surfaces as `DispatchError::Publish`
//! and republishing is safe (at-least-once, projections are idempotent).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use vetledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use vetledger_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Disallowed state transition (deterministic).
    InvalidTransition(String),
    /// Requested slot is not bookable.
    SlotUnavailable(String),
    /// Derivation lacks the history it needs.
    InsufficientData(String),
    /// Domain-level not found.
    NotFound,
    /// Historical payloads failed to deserialize into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidTransition(msg) => DispatchError::InvalidTransition(msg),
            DomainError::SlotUnavailable(msg) => DispatchError::SlotUnavailable(msg),
            DomainError::InsufficientData(msg) => DispatchError::InsufficientData(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests run fully in memory and a real
/// backend slots in without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` closure supplies a fresh instance for
    /// rehydration, keeping the dispatcher ignorant of aggregate
    /// construction. Returns the committed events with assigned sequence
    /// numbers; an empty vector means the command decided nothing.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: vetledger_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Guard against a buggy backend returning a foreign or unordered stream.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vetledger_appointments::{
        Appointment, AppointmentCommand, AppointmentId, ApproveAppointment, BookingDetails,
        RequestAppointment,
    };
    use vetledger_core::StaffId;
    use vetledger_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>>
    {
        CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new())
    }

    fn details() -> BookingDetails {
        BookingDetails {
            pet_name: "Miso".to_string(),
            owner_name: "Dana Reyes".to_string(),
            owner_email: "dana@example.com".to_string(),
            owner_phone: "555-0141".to_string(),
            service: "Vaccination".to_string(),
            price: 1000,
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            staff_id: StaffId::new(),
        }
    }

    #[test]
    fn dispatch_persists_and_publishes_in_order() {
        let d = dispatcher();
        let id = AppointmentId::new(AggregateId::new());
        let sub = d.bus.subscribe();

        let committed = d
            .dispatch(
                id.0,
                "appointments.appointment",
                AppointmentCommand::RequestAppointment(RequestAppointment {
                    appointment_id: id,
                    details: details(),
                    occurred_at: Utc::now(),
                }),
                |aid| Appointment::empty(AppointmentId::new(aid)),
            )
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "appointments.requested");

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.aggregate_id(), id.0);
    }

    #[test]
    fn dispatch_rehydrates_across_calls() {
        let d = dispatcher();
        let id = AppointmentId::new(AggregateId::new());

        d.dispatch(
            id.0,
            "appointments.appointment",
            AppointmentCommand::RequestAppointment(RequestAppointment {
                appointment_id: id,
                details: details(),
                occurred_at: Utc::now(),
            }),
            |aid| Appointment::empty(AppointmentId::new(aid)),
        )
        .unwrap();

        let committed = d
            .dispatch(
                id.0,
                "appointments.appointment",
                AppointmentCommand::ApproveAppointment(ApproveAppointment {
                    appointment_id: id,
                    occurred_at: Utc::now(),
                }),
                |aid| Appointment::empty(AppointmentId::new(aid)),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);
        assert_eq!(committed[0].event_type, "appointments.approved");
    }

    #[test]
    fn domain_failures_map_to_dispatch_errors() {
        let d = dispatcher();
        let id = AppointmentId::new(AggregateId::new());

        // Approving an appointment that was never requested.
        let err = d
            .dispatch(
                id.0,
                "appointments.appointment",
                AppointmentCommand::ApproveAppointment(ApproveAppointment {
                    appointment_id: id,
                    occurred_at: Utc::now(),
                }),
                |aid| Appointment::empty(AppointmentId::new(aid)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }
}
