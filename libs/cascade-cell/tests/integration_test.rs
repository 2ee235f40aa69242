use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use assert_matches::assert_matches;
use appointment_cell::{
    AppointmentLifecycleService, BookingService, ConflictDetectionService, SlotLockManager,
};
use availability_cell::{AvailabilityService, SlotGenerator};
use cascade_cell::{
    CascadeChoice, CascadeDisposition, CascadeResolution, DeclareEmergency,
    EmergencyCascadeService,
};
use shared_config::SchedulingPolicy;
use shared_models::{
    Actor, Appointment, AppointmentStatus, LeaveStatus, SchedulingError, TimeSlot,
    WorkingHoursTemplate,
};
use shared_storage::memory::{
    InMemoryAppointmentStore, InMemoryLockStore, InMemoryPractitionerDirectory,
    InMemoryScheduleStore, RecordingAuditSink, RecordingDispatcher,
};
use shared_storage::{AppointmentStore, ManualClock};

// 2025-03-10 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    monday().and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn appointment(practitioner_id: Uuid, start: DateTime<Utc>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        practitioner_id,
        patient_id: Uuid::new_v4(),
        appointment_type_id: "consult".to_string(),
        start,
        duration_minutes: 30,
        status: AppointmentStatus::Scheduled,
        confirmed_at: None,
        checked_in_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        no_show_at: None,
        last_actor: None,
        cancellation_reason: None,
        reschedule_reason: None,
        series_id: None,
        occurrence_index: None,
        created_at: start,
        updated_at: start,
    }
}

struct Harness {
    schedule: Arc<InMemoryScheduleStore>,
    appointments: Arc<InMemoryAppointmentStore>,
    directory: Arc<InMemoryPractitionerDirectory>,
    availability: Arc<AvailabilityService>,
    cascade: EmergencyCascadeService,
    practitioner: Uuid,
}

async fn harness() -> Harness {
    let policy = SchedulingPolicy::default();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let directory = Arc::new(InMemoryPractitionerDirectory::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let lock_store = Arc::new(InMemoryLockStore::new());
    let clock = Arc::new(ManualClock::new(at(8, 0)));

    let practitioner = Uuid::new_v4();
    // Open 09:00-17:00 every weekday.
    for day_of_week in 1..=5 {
        schedule
            .add_template(WorkingHoursTemplate {
                id: Uuid::new_v4(),
                practitioner_id: practitioner,
                day_of_week,
                start_time: t(9, 0),
                end_time: t(17, 0),
                updated_at: Utc::now(),
            })
            .await;
    }

    let availability = Arc::new(AvailabilityService::new(schedule.clone()));
    let slots = Arc::new(SlotGenerator::new(appointments.clone()));
    let conflicts = Arc::new(ConflictDetectionService::new(
        appointments.clone(),
        policy.clone(),
    ));
    let locks = Arc::new(SlotLockManager::new(
        lock_store,
        clock.clone(),
        audit.clone(),
        &policy,
    ));
    let lifecycle = Arc::new(AppointmentLifecycleService::new(
        appointments.clone(),
        audit.clone(),
        clock.clone(),
    ));
    let booking = Arc::new(BookingService::new(
        appointments.clone(),
        conflicts,
        locks,
        lifecycle,
        dispatcher,
        audit.clone(),
        clock.clone(),
    ));
    let cascade = EmergencyCascadeService::new(
        schedule.clone(),
        appointments.clone(),
        availability.clone(),
        slots,
        booking,
        directory.clone(),
        audit,
        clock,
        policy,
    );

    Harness {
        schedule,
        appointments,
        directory,
        availability,
        cascade,
        practitioner,
    }
}

#[tokio::test]
async fn test_declare_for_unknown_practitioner_is_not_found() {
    let h = harness().await;
    let result = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: Uuid::new_v4(),
            window: TimeSlot::new(at(9, 0), at(12, 0)),
            reason: None,
            actor: Actor::System,
        })
        .await;
    assert_matches!(result, Err(SchedulingError::NotFound(_)));
}

#[tokio::test]
async fn test_declare_blocks_the_window_and_lists_displaced() {
    let h = harness().await;
    let displaced = appointment(h.practitioner, at(10, 0));
    let untouched = appointment(h.practitioner, at(15, 0));
    h.appointments.insert(displaced.clone()).await.unwrap();
    h.appointments.insert(untouched.clone()).await.unwrap();

    let declaration = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window: TimeSlot::new(at(9, 0), at(12, 0)),
            reason: Some("sudden illness".to_string()),
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();

    assert_eq!(declaration.leave.status, LeaveStatus::Emergency);
    assert_eq!(declaration.affected.len(), 1);
    assert_eq!(declaration.affected[0].appointment.id, displaced.id);

    // The leave is persisted: the morning is no longer open.
    let open = h
        .availability
        .resolve_day(h.practitioner, monday())
        .await
        .unwrap();
    assert_eq!(open, vec![TimeSlot::new(at(12, 0), at(17, 0))]);
}

#[tokio::test]
async fn test_proposals_avoid_the_blocked_window() {
    let h = harness().await;
    h.appointments
        .insert(appointment(h.practitioner, at(10, 0)))
        .await
        .unwrap();

    let declaration = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window: TimeSlot::new(at(9, 0), at(12, 0)),
            reason: None,
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();

    let proposals = &declaration.affected[0].proposals;
    assert!(!proposals.is_empty());
    assert!(proposals.len() <= 3);
    for slot in proposals {
        assert!(slot.start >= at(12, 0));
        assert_eq!(slot.practitioner_id, h.practitioner);
    }
}

#[tokio::test]
async fn test_proposals_fall_back_to_other_practitioners() {
    let h = harness().await;
    let colleague = Uuid::new_v4();
    for day_of_week in 1..=5 {
        h.schedule
            .add_template(WorkingHoursTemplate {
                id: Uuid::new_v4(),
                practitioner_id: colleague,
                day_of_week,
                start_time: t(9, 0),
                end_time: t(17, 0),
                updated_at: Utc::now(),
            })
            .await;
    }
    h.directory
        .add_practitioner_for_type("consult", colleague)
        .await;

    h.appointments
        .insert(appointment(h.practitioner, at(10, 0)))
        .await
        .unwrap();

    // The whole fortnight is blocked for the original practitioner.
    let next_fortnight = monday()
        .checked_add_days(chrono::Days::new(14))
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let declaration = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window: TimeSlot::new(at(0, 0), next_fortnight),
            reason: None,
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();

    let proposals = &declaration.affected[0].proposals;
    assert!(!proposals.is_empty());
    assert!(proposals.iter().all(|s| s.practitioner_id == colleague));
}

#[tokio::test]
async fn test_affected_is_idempotent_after_resolution() {
    let h = harness().await;
    let displaced = appointment(h.practitioner, at(10, 0));
    h.appointments.insert(displaced.clone()).await.unwrap();

    let window = TimeSlot::new(at(9, 0), at(12, 0));
    let declaration = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window,
            reason: None,
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();
    assert_eq!(declaration.affected.len(), 1);

    let report = h
        .cascade
        .apply(
            h.practitioner,
            vec![CascadeChoice {
                appointment_id: displaced.id,
                resolution: CascadeResolution::Reschedule {
                    new_start: at(13, 0),
                    new_practitioner_id: None,
                },
            }],
            Actor::System,
        )
        .await;
    assert_eq!(report.resolved_count(), 1);

    // Everything in the window is resolved; a re-run finds nothing left.
    let remaining = h.cascade.affected(h.practitioner, window).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_apply_captures_failures_per_appointment() {
    let h = harness().await;
    let displaced = appointment(h.practitioner, at(10, 0));
    let occupant = appointment(h.practitioner, at(15, 0));
    h.appointments.insert(displaced.clone()).await.unwrap();
    h.appointments.insert(occupant.clone()).await.unwrap();

    h.cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window: TimeSlot::new(at(9, 0), at(12, 0)),
            reason: None,
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();

    let report = h
        .cascade
        .apply(
            h.practitioner,
            vec![
                // Lands on the 15:00 appointment and must fail.
                CascadeChoice {
                    appointment_id: displaced.id,
                    resolution: CascadeResolution::Reschedule {
                        new_start: at(15, 0),
                        new_practitioner_id: None,
                    },
                },
                CascadeChoice {
                    appointment_id: displaced.id,
                    resolution: CascadeResolution::Cancel {
                        reason: "no alternative".to_string(),
                    },
                },
            ],
            Actor::System,
        )
        .await;

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.resolved_count(), 1);
    assert_matches!(
        report.outcomes[0].disposition,
        CascadeDisposition::Failed {
            error: SchedulingError::Conflict
        }
    );
    assert_matches!(report.outcomes[1].disposition, CascadeDisposition::Cancelled);

    let stored = h.appointments.get(displaced.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_terminal_appointments_are_not_displaced() {
    let h = harness().await;
    let mut done = appointment(h.practitioner, at(10, 0));
    done.status = AppointmentStatus::Completed;
    h.appointments.insert(done).await.unwrap();

    let declaration = h
        .cascade
        .declare(DeclareEmergency {
            practitioner_id: h.practitioner,
            window: TimeSlot::new(at(9, 0), at(12, 0)),
            reason: None,
            actor: Actor::Practitioner,
        })
        .await
        .unwrap();
    assert!(declaration.affected.is_empty());
}
