use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use assert_matches::assert_matches;
use availability_cell::{AvailabilityService, SlotGenerator, SlotQuery};
use shared_models::{
    Appointment, AppointmentStatus, BreakTime, Leave, LeaveStatus, SchedulingError, SpecialDate,
    SpecialDateKind, TimeSlot, WorkingHoursTemplate,
};
use shared_storage::memory::{InMemoryAppointmentStore, InMemoryScheduleStore};
use shared_storage::{AppointmentStore, ScheduleStore};

// 2025-03-10 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn template(
    practitioner_id: Uuid,
    day_of_week: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> WorkingHoursTemplate {
    WorkingHoursTemplate {
        id: Uuid::new_v4(),
        practitioner_id,
        day_of_week,
        start_time,
        end_time,
        updated_at: Utc::now(),
    }
}

fn appointment(practitioner_id: Uuid, start: DateTime<Utc>, duration_minutes: i32) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        practitioner_id,
        patient_id: Uuid::new_v4(),
        appointment_type_id: "consult".to_string(),
        start,
        duration_minutes,
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

#[tokio::test]
async fn test_unknown_practitioner_is_not_found() {
    let schedule = Arc::new(InMemoryScheduleStore::new());
    let resolver = AvailabilityService::new(schedule);

    let result = resolver.resolve_day(Uuid::new_v4(), monday()).await;
    assert_matches!(result, Err(SchedulingError::NotFound(_)));
}

#[tokio::test]
async fn test_weekly_template_opens_the_day() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    let resolver = AvailabilityService::new(schedule);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(
        open,
        vec![TimeSlot::new(at(monday(), 9, 0), at(monday(), 17, 0))]
    );

    // No template for Tuesday, so it is closed but not an error.
    let tuesday = monday().succ_opt().unwrap();
    assert!(resolver.resolve_day(practitioner, tuesday).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_templates_resolve_to_most_recent() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());

    let mut stale = template(practitioner, 1, t(8, 0), t(12, 0));
    stale.updated_at = Utc::now() - chrono::Duration::days(30);
    schedule.add_template(stale).await;
    schedule
        .add_template(template(practitioner, 1, t(10, 0), t(16, 0)))
        .await;

    let resolver = AvailabilityService::new(schedule);
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(
        open,
        vec![TimeSlot::new(at(monday(), 10, 0), at(monday(), 16, 0))]
    );
}

#[tokio::test]
async fn test_closed_special_date_wins_over_template() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    schedule
        .add_special_date(SpecialDate {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            date: monday(),
            kind: SpecialDateKind::Closed,
            reason: Some("public holiday".to_string()),
        })
        .await;

    let resolver = AvailabilityService::new(schedule);
    assert!(resolver.resolve_day(practitioner, monday()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_override_special_date_replaces_template_wholesale() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    schedule
        .add_special_date(SpecialDate {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            date: monday(),
            kind: SpecialDateKind::Override {
                start_time: t(10, 0),
                end_time: t(12, 0),
            },
            reason: None,
        })
        .await;

    let resolver = AvailabilityService::new(schedule);
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(
        open,
        vec![TimeSlot::new(at(monday(), 10, 0), at(monday(), 12, 0))]
    );
}

#[tokio::test]
async fn test_breaks_split_the_open_interval() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    schedule
        .add_break(BreakTime {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            day_of_week: Some(1),
            start_time: t(12, 0),
            end_time: t(13, 0),
            active: true,
            effective_from: None,
        })
        .await;

    let resolver = AvailabilityService::new(schedule);
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(
        open,
        vec![
            TimeSlot::new(at(monday(), 9, 0), at(monday(), 12, 0)),
            TimeSlot::new(at(monday(), 13, 0), at(monday(), 17, 0)),
        ]
    );
}

#[tokio::test]
async fn test_inactive_break_is_ignored() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    schedule
        .add_break(BreakTime {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            day_of_week: Some(1),
            start_time: t(12, 0),
            end_time: t(13, 0),
            active: false,
            effective_from: None,
        })
        .await;

    let resolver = AvailabilityService::new(schedule);
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn test_leave_status_controls_subtraction() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;
    schedule
        .insert_leave(Leave {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            start_date: monday(),
            end_date: monday(),
            start_time: Some(t(13, 0)),
            end_time: Some(t(15, 0)),
            status: LeaveStatus::Pending,
            reason: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let resolver = AvailabilityService::new(schedule.clone());
    // Pending leave does not remove time.
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(open.len(), 1);

    schedule
        .insert_leave(Leave {
            id: Uuid::new_v4(),
            practitioner_id: practitioner,
            start_date: monday(),
            end_date: monday(),
            start_time: Some(t(13, 0)),
            end_time: Some(t(15, 0)),
            status: LeaveStatus::Approved,
            reason: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert_eq!(
        open,
        vec![
            TimeSlot::new(at(monday(), 9, 0), at(monday(), 13, 0)),
            TimeSlot::new(at(monday(), 15, 0), at(monday(), 17, 0)),
        ]
    );
}

#[tokio::test]
async fn test_range_resolution_reports_each_day() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(17, 0)))
        .await;

    let resolver = AvailabilityService::new(schedule);
    let friday = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
    let days = resolver
        .resolve_range(practitioner, monday(), friday)
        .await
        .unwrap();
    assert_eq!(days.len(), 5);
    assert_eq!(days[0].1.len(), 1);
    assert!(days[1].1.is_empty());

    assert!(!resolver.is_closed(practitioner, monday()).await.unwrap());
    assert!(resolver
        .is_closed(practitioner, monday().succ_opt().unwrap())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_malformed_template_degrades_to_closed() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(17, 0), t(9, 0)))
        .await;

    let resolver = AvailabilityService::new(schedule);
    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn test_slots_skip_booked_time() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(12, 0)))
        .await;
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    appointments
        .insert(appointment(practitioner, at(monday(), 10, 0), 30))
        .await
        .unwrap();

    let resolver = AvailabilityService::new(schedule);
    let generator = SlotGenerator::new(appointments);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    let slots = generator
        .slots_for_day(practitioner, &open, monday(), &SlotQuery::new(30))
        .await
        .unwrap();

    let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
    assert_eq!(
        starts,
        vec![
            at(monday(), 9, 0),
            at(monday(), 9, 30),
            at(monday(), 10, 30),
            at(monday(), 11, 0),
            at(monday(), 11, 30),
        ]
    );
}

#[tokio::test]
async fn test_no_partial_slot_at_interval_end() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(10, 15)))
        .await;
    let appointments = Arc::new(InMemoryAppointmentStore::new());

    let resolver = AvailabilityService::new(schedule);
    let generator = SlotGenerator::new(appointments);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    let slots = generator
        .slots_for_day(practitioner, &open, monday(), &SlotQuery::new(30))
        .await
        .unwrap();
    let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![at(monday(), 9, 0), at(monday(), 9, 30)]);
}

#[tokio::test]
async fn test_buffer_extends_booked_footprint() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(12, 0)))
        .await;
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    appointments
        .insert(appointment(practitioner, at(monday(), 10, 0), 30))
        .await
        .unwrap();

    let resolver = AvailabilityService::new(schedule);
    let generator = SlotGenerator::new(appointments);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    let slots = generator
        .slots_for_day(
            practitioner,
            &open,
            monday(),
            &SlotQuery::new(30).with_buffer(15),
        )
        .await
        .unwrap();

    // The 10:30 candidate collides with the buffered footprint ending 10:45.
    let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
    assert_eq!(
        starts,
        vec![
            at(monday(), 9, 0),
            at(monday(), 9, 30),
            at(monday(), 11, 0),
            at(monday(), 11, 30),
        ]
    );
}

#[tokio::test]
async fn test_stride_denser_than_duration() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(10, 0)))
        .await;
    let appointments = Arc::new(InMemoryAppointmentStore::new());

    let resolver = AvailabilityService::new(schedule);
    let generator = SlotGenerator::new(appointments);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    let slots = generator
        .slots_for_day(
            practitioner,
            &open,
            monday(),
            &SlotQuery::new(30).with_stride(15),
        )
        .await
        .unwrap();
    let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
    assert_eq!(
        starts,
        vec![at(monday(), 9, 0), at(monday(), 9, 15), at(monday(), 9, 30)]
    );
}

#[tokio::test]
async fn test_cancelled_appointments_free_their_slot() {
    let practitioner = Uuid::new_v4();
    let schedule = Arc::new(InMemoryScheduleStore::new());
    schedule
        .add_template(template(practitioner, 1, t(9, 0), t(10, 0)))
        .await;
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let mut cancelled = appointment(practitioner, at(monday(), 9, 0), 30);
    cancelled.status = AppointmentStatus::Cancelled;
    appointments.insert(cancelled).await.unwrap();

    let resolver = AvailabilityService::new(schedule);
    let generator = SlotGenerator::new(appointments);

    let open = resolver.resolve_day(practitioner, monday()).await.unwrap();
    let slots = generator
        .slots_for_day(practitioner, &open, monday(), &SlotQuery::new(30))
        .await
        .unwrap();
    assert_eq!(slots.len(), 2);
}
