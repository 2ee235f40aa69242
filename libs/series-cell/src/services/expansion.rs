use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::{AvailabilityService, SlotGenerator, SlotQuery};
use appointment_cell::services::booking::BookingService;
use appointment_cell::services::conflict::ConflictDetectionService;
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use shared_config::SchedulingPolicy;
use shared_models::{
    day_of_week, Actor, Appointment, AppointmentStatus, AuditAction, AuditEvent, EditScope,
    MonthlyAnchor, NotificationEvent, NotificationKind, RecurrenceFrequency, RecurrenceRule,
    RecurringSeries, RescheduleAppointment, SchedulingError, SeriesEnd, SeriesStatus,
    StatusTransition, TimeSlot,
};
use shared_storage::{
    AppointmentFilter, AppointmentStore, AuditSink, Clock, NotificationDispatcher, SeriesStore,
};

use crate::models::{
    CreateSeries, ExpansionReport, OccurrenceDisposition, OccurrenceOutcome, SeriesEdit,
};

/// Materializes recurring series: generates anchor dates from the rule,
/// validates each occurrence against availability and conflicts, and books
/// or records it. Scoped edits regenerate the affected tail.
pub struct SeriesExpansionService {
    availability: Arc<AvailabilityService>,
    slots: Arc<SlotGenerator>,
    conflicts: Arc<ConflictDetectionService>,
    lifecycle: Arc<AppointmentLifecycleService>,
    booking: Arc<BookingService>,
    appointments: Arc<dyn AppointmentStore>,
    series: Arc<dyn SeriesStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicy,
}

impl SeriesExpansionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        availability: Arc<AvailabilityService>,
        slots: Arc<SlotGenerator>,
        conflicts: Arc<ConflictDetectionService>,
        lifecycle: Arc<AppointmentLifecycleService>,
        booking: Arc<BookingService>,
        appointments: Arc<dyn AppointmentStore>,
        series: Arc<dyn SeriesStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: SchedulingPolicy,
    ) -> Self {
        Self {
            availability,
            slots,
            conflicts,
            lifecycle,
            booking,
            appointments,
            series,
            dispatcher,
            audit,
            clock,
            policy,
        }
    }

    /// Create and expand a series in one pass.
    pub async fn create(
        &self,
        command: CreateSeries,
    ) -> Result<(RecurringSeries, ExpansionReport), SchedulingError> {
        command.rule.validate()?;

        let series_id = Uuid::new_v4();
        let now = self.clock.now();
        let mut series = RecurringSeries {
            id: series_id,
            practitioner_id: command.practitioner_id,
            patient_id: command.patient_id,
            appointment_type_id: command.appointment_type_id,
            rule: command.rule,
            skip_holidays: command.skip_holidays,
            auto_reschedule: command.auto_reschedule,
            reschedule_window_days: command.reschedule_window_days,
            status: SeriesStatus::Active,
            appointment_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let not_before = series.rule.start_date;
        let (outcomes, partial) = self
            .fill_occurrences(&series, 0, not_before, command.actor)
            .await?;
        series.appointment_ids = booked_ids(&outcomes);
        self.series.insert(series.clone()).await?;
        info!(
            "Series {} expanded: {} occurrences, {} booked",
            series_id,
            outcomes.len(),
            series.appointment_ids.len()
        );
        self.audit
            .record(AuditEvent {
                occurred_at: now,
                action: AuditAction::SeriesExpanded,
                appointment_id: None,
                practitioner_id: Some(series.practitioner_id),
                actor: Some(command.actor),
                detail: Some(series_id.to_string()),
            })
            .await;

        let report = ExpansionReport {
            series_id,
            outcomes,
            partial,
        };
        Ok((series, report))
    }

    /// Move a single occurrence and detach it from the series, so later
    /// series-wide edits no longer touch it. The new interval is claimed
    /// through the regular booking path (hold, conflict re-check) after an
    /// availability containment check.
    pub async fn edit_occurrence(
        &self,
        series_id: Uuid,
        occurrence_index: u32,
        new_start: DateTime<Utc>,
        actor: Actor,
    ) -> Result<Appointment, SchedulingError> {
        let mut series = self.load(series_id).await?;
        let occurrence = self.occurrence(series_id, occurrence_index).await?;

        let slot = TimeSlot::from_start(new_start, occurrence.duration_minutes);
        let open = self
            .availability
            .resolve_day(occurrence.practitioner_id, new_start.date_naive())
            .await?;
        if !open.iter().any(|o| o.contains(&slot)) {
            return Err(SchedulingError::Conflict);
        }

        let confirmation = self
            .booking
            .reschedule(RescheduleAppointment {
                appointment_id: occurrence.id,
                new_start,
                new_duration_minutes: None,
                new_practitioner_id: None,
                reason: Some("occurrence moved out of series".to_string()),
                actor,
            })
            .await?;

        let mut appointment = confirmation.appointment;
        let now = self.clock.now();
        appointment.series_id = None;
        appointment.occurrence_index = None;
        appointment.updated_at = now;
        self.appointments.update(appointment.clone()).await?;

        series.appointment_ids.retain(|id| *id != appointment.id);
        series.updated_at = now;
        self.series.update(series).await?;
        Ok(appointment)
    }

    /// Re-run generation from one occurrence forward, leaving the past
    /// untouched.
    pub async fn update_from(
        &self,
        series_id: Uuid,
        occurrence_index: u32,
        edit: SeriesEdit,
        actor: Actor,
    ) -> Result<ExpansionReport, SchedulingError> {
        let mut series = self.load(series_id).await?;
        let from_date = self
            .occurrence(series_id, occurrence_index)
            .await?
            .start
            .date_naive();

        self.cancel_generated(&series, occurrence_index, actor, "series updated")
            .await?;
        apply_edit(&mut series.rule, &edit);

        let (outcomes, partial) = self
            .fill_occurrences(&series, occurrence_index, from_date, actor)
            .await?;

        series.appointment_ids.extend(booked_ids(&outcomes));
        series.updated_at = self.clock.now();
        self.series.update(series).await?;

        Ok(ExpansionReport {
            series_id,
            outcomes,
            partial,
        })
    }

    /// Regenerate the whole series, cancelling and rebooking occurrences
    /// that still validate.
    pub async fn update_all(
        &self,
        series_id: Uuid,
        edit: SeriesEdit,
        actor: Actor,
    ) -> Result<ExpansionReport, SchedulingError> {
        let mut series = self.load(series_id).await?;

        self.cancel_generated(&series, 0, actor, "series updated")
            .await?;
        apply_edit(&mut series.rule, &edit);

        let not_before = series.rule.start_date;
        let (outcomes, partial) = self
            .fill_occurrences(&series, 0, not_before, actor)
            .await?;

        series.appointment_ids.extend(booked_ids(&outcomes));
        series.updated_at = self.clock.now();
        self.series.update(series).await?;

        Ok(ExpansionReport {
            series_id,
            outcomes,
            partial,
        })
    }

    /// Cancel one occurrence; the rest of the series stays live.
    pub async fn cancel_occurrence(
        &self,
        series_id: Uuid,
        occurrence_index: u32,
        actor: Actor,
        reason: &str,
    ) -> Result<RecurringSeries, SchedulingError> {
        let mut series = self.load(series_id).await?;
        let appointment = self.occurrence(series_id, occurrence_index).await?;

        self.cancel_one(&appointment, actor, reason).await?;

        series.status = SeriesStatus::PartiallyCancelled;
        series.updated_at = self.clock.now();
        self.series.update(series.clone()).await?;
        Ok(series)
    }

    /// Cancel this occurrence and everything after it.
    pub async fn cancel_from(
        &self,
        series_id: Uuid,
        occurrence_index: u32,
        actor: Actor,
        reason: &str,
    ) -> Result<RecurringSeries, SchedulingError> {
        let mut series = self.load(series_id).await?;

        self.cancel_generated(&series, occurrence_index, actor, reason)
            .await?;

        series.status = if occurrence_index == 0 {
            SeriesStatus::Cancelled
        } else {
            SeriesStatus::PartiallyCancelled
        };
        series.updated_at = self.clock.now();
        self.series.update(series.clone()).await?;
        Ok(series)
    }

    pub async fn cancel_all(
        &self,
        series_id: Uuid,
        actor: Actor,
        reason: &str,
    ) -> Result<RecurringSeries, SchedulingError> {
        self.cancel_from(series_id, 0, actor, reason).await
    }

    /// Scope-dispatching entry point for cancellation requests.
    pub async fn cancel_scoped(
        &self,
        series_id: Uuid,
        scope: EditScope,
        occurrence_index: u32,
        actor: Actor,
        reason: &str,
    ) -> Result<RecurringSeries, SchedulingError> {
        match scope {
            EditScope::This => {
                self.cancel_occurrence(series_id, occurrence_index, actor, reason)
                    .await
            }
            EditScope::ThisAndFuture => {
                self.cancel_from(series_id, occurrence_index, actor, reason)
                    .await
            }
            EditScope::All => self.cancel_all(series_id, actor, reason).await,
        }
    }

    // ==========================================================================
    // INTERNALS
    // ==========================================================================

    /// Walk anchor dates and place each occurrence. Closed days skipped under
    /// `skip_holidays` do not consume an occurrence slot; the walk extends
    /// past the naive end until the count is met or anchors run out.
    async fn fill_occurrences(
        &self,
        series: &RecurringSeries,
        start_index: u32,
        not_before: NaiveDate,
        actor: Actor,
    ) -> Result<(Vec<OccurrenceOutcome>, bool), SchedulingError> {
        let rule = &series.rule;
        let target = match rule.end {
            SeriesEnd::Count(n) => Some(n.saturating_sub(start_index) as usize),
            SeriesEnd::Until(_) => None,
        };
        let mut outcomes: Vec<OccurrenceOutcome> = Vec::new();
        let mut skipped = 0usize;

        for anchor in anchor_dates(rule, self.policy.max_series_occurrences as usize) {
            if anchor < not_before {
                continue;
            }
            if let Some(t) = target {
                if outcomes.len() >= t {
                    break;
                }
            }

            let open = self
                .availability
                .resolve_day(series.practitioner_id, anchor)
                .await?;
            if open.is_empty() && series.skip_holidays {
                debug!("Series {}: {} is fully closed, skipping", series.id, anchor);
                skipped += 1;
                continue;
            }

            let index = start_index + outcomes.len() as u32;
            let preferred = TimeSlot::from_start(
                anchor.and_time(rule.time_of_day).and_utc(),
                rule.duration_minutes,
            );

            let mut placed = None;
            let mut reason = "outside practitioner availability";
            if open.iter().any(|o| o.contains(&preferred)) {
                let report = self
                    .conflicts
                    .check(series.practitioner_id, series.patient_id, preferred, None)
                    .await?;
                if report.blocking {
                    reason = "conflicts with an existing appointment";
                } else {
                    placed = Some(preferred);
                }
            }
            if placed.is_none() && series.auto_reschedule {
                placed = self.nearest_alternative(series, anchor).await?;
            }

            let disposition = match placed {
                Some(slot) => {
                    let appointment_id = self.book_occurrence(series, slot, index, actor).await?;
                    OccurrenceDisposition::Booked { appointment_id }
                }
                None => OccurrenceDisposition::Unscheduled {
                    reason: reason.to_string(),
                },
            };

            outcomes.push(OccurrenceOutcome {
                occurrence_index: index,
                anchor_date: anchor,
                disposition,
            });
        }

        // A count walk extends past skipped dates; an until-bounded walk
        // cannot, so its skips are occurrences lost for good.
        let partial = match target {
            Some(t) => outcomes.len() < t,
            None => skipped > 0,
        };
        if partial {
            warn!(
                "Series {} expansion is partial: {} occurrences placed, {} skipped",
                series.id,
                outcomes.len(),
                skipped
            );
        }
        Ok((outcomes, partial))
    }

    /// When an occurrence cannot take its preferred time, scan the reschedule
    /// window for the open slot closest to that time, nearest day first.
    async fn nearest_alternative(
        &self,
        series: &RecurringSeries,
        anchor: NaiveDate,
    ) -> Result<Option<TimeSlot>, SchedulingError> {
        let rule = &series.rule;
        for offset in 0..=series.reschedule_window_days.max(0) {
            let date = anchor + Duration::days(offset);
            let open = self
                .availability
                .resolve_day(series.practitioner_id, date)
                .await?;
            if open.is_empty() {
                continue;
            }
            let preferred_start = date.and_time(rule.time_of_day).and_utc();
            let query = SlotQuery::new(rule.duration_minutes);
            let mut candidates = self
                .slots
                .slots_for_day(series.practitioner_id, &open, date, &query)
                .await?;
            candidates
                .sort_by_key(|c| (c.start - preferred_start).num_minutes().abs());
            for candidate in candidates {
                let slot = TimeSlot::new(candidate.start, candidate.end);
                let report = self
                    .conflicts
                    .check(series.practitioner_id, series.patient_id, slot, None)
                    .await?;
                if !report.blocking {
                    debug!(
                        "Series {}: occurrence moved from {} to {}",
                        series.id, preferred_start, slot.start
                    );
                    return Ok(Some(slot));
                }
            }
        }
        Ok(None)
    }

    async fn book_occurrence(
        &self,
        series: &RecurringSeries,
        slot: TimeSlot,
        occurrence_index: u32,
        actor: Actor,
    ) -> Result<Uuid, SchedulingError> {
        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            practitioner_id: series.practitioner_id,
            patient_id: series.patient_id,
            appointment_type_id: series.appointment_type_id.clone(),
            start: slot.start,
            duration_minutes: slot.duration_minutes() as i32,
            status: AppointmentStatus::Scheduled,
            confirmed_at: None,
            checked_in_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            no_show_at: None,
            last_actor: Some(actor),
            cancellation_reason: None,
            reschedule_reason: None,
            series_id: Some(series.id),
            occurrence_index: Some(occurrence_index),
            created_at: now,
            updated_at: now,
        };
        self.appointments.insert(appointment.clone()).await?;
        self.dispatcher
            .dispatch(NotificationEvent {
                appointment_id: appointment.id,
                kind: NotificationKind::Booked,
                recipient: series.patient_id,
            })
            .await;
        Ok(appointment.id)
    }

    async fn load(&self, series_id: Uuid) -> Result<RecurringSeries, SchedulingError> {
        self.series
            .get(series_id)
            .await?
            .ok_or_else(|| SchedulingError::NotFound(format!("series {}", series_id)))
    }

    /// A regenerated index can be shared with an earlier cancelled record;
    /// the live occurrence wins, with a terminal fallback so lookups on a
    /// fully cancelled series still resolve.
    async fn occurrence(
        &self,
        series_id: Uuid,
        occurrence_index: u32,
    ) -> Result<Appointment, SchedulingError> {
        let filter = AppointmentFilter::new().in_series(series_id);
        let matches: Vec<Appointment> = self
            .appointments
            .find(&filter)
            .await?
            .into_iter()
            .filter(|a| a.occurrence_index == Some(occurrence_index))
            .collect();
        matches
            .iter()
            .find(|a| !a.status.is_terminal())
            .or_else(|| matches.first())
            .cloned()
            .ok_or_else(|| {
                SchedulingError::NotFound(format!(
                    "occurrence {} of series {}",
                    occurrence_index, series_id
                ))
            })
    }

    /// Cancel every still-generated, non-terminal occurrence at or past the
    /// given index.
    async fn cancel_generated(
        &self,
        series: &RecurringSeries,
        from_index: u32,
        actor: Actor,
        reason: &str,
    ) -> Result<(), SchedulingError> {
        let filter = AppointmentFilter::new().in_series(series.id);
        let generated = self.appointments.find(&filter).await?;

        for appointment in generated {
            let in_scope = appointment
                .occurrence_index
                .map_or(false, |idx| idx >= from_index);
            if !in_scope || appointment.status.is_terminal() {
                continue;
            }
            self.cancel_one(&appointment, actor, reason).await?;
        }
        Ok(())
    }

    async fn cancel_one(
        &self,
        appointment: &Appointment,
        actor: Actor,
        reason: &str,
    ) -> Result<(), SchedulingError> {
        self.lifecycle
            .apply(StatusTransition {
                appointment_id: appointment.id,
                to: AppointmentStatus::Cancelled,
                actor,
                reason: Some(reason.to_string()),
            })
            .await?;
        self.dispatcher
            .dispatch(NotificationEvent {
                appointment_id: appointment.id,
                kind: NotificationKind::Cancelled,
                recipient: appointment.patient_id,
            })
            .await;
        Ok(())
    }
}

fn apply_edit(rule: &mut RecurrenceRule, edit: &SeriesEdit) {
    if let Some(time_of_day) = edit.new_time_of_day {
        rule.time_of_day = time_of_day;
    }
    if let Some(duration) = edit.new_duration_minutes {
        rule.duration_minutes = duration;
    }
}

fn booked_ids(outcomes: &[OccurrenceOutcome]) -> Vec<Uuid> {
    outcomes
        .iter()
        .filter_map(|o| match o.disposition {
            OccurrenceDisposition::Booked { appointment_id } => Some(appointment_id),
            OccurrenceDisposition::Unscheduled { .. } => None,
        })
        .collect()
}

/// Successive anchor dates for a rule, bounded by the end date (for `Until`)
/// or by `cap` anchors. Deterministic for a given rule.
pub fn anchor_dates(rule: &RecurrenceRule, cap: usize) -> Vec<NaiveDate> {
    let until = match rule.end {
        SeriesEnd::Until(date) => Some(date),
        SeriesEnd::Count(_) => None,
    };
    let mut anchors = Vec::new();

    match &rule.frequency {
        RecurrenceFrequency::Weekly {
            interval_weeks,
            weekday,
        } => {
            let offset = ((*weekday - day_of_week(rule.start_date)) % 7 + 7) % 7;
            let mut date = rule.start_date + Duration::days(offset as i64);
            while anchors.len() < cap && until.map_or(true, |u| date <= u) {
                anchors.push(date);
                date += Duration::weeks(*interval_weeks as i64);
            }
        }
        RecurrenceFrequency::Monthly { anchor } => {
            let mut year = rule.start_date.year();
            let mut month = rule.start_date.month();
            let mut months_walked = 0usize;
            while anchors.len() < cap && months_walked <= cap * 12 {
                months_walked += 1;
                if let Some(month_start) = NaiveDate::from_ymd_opt(year, month, 1) {
                    if let Some(u) = until {
                        if month_start > u {
                            break;
                        }
                    }
                }
                if let Some(date) = anchor_in_month(anchor, year, month) {
                    if date >= rule.start_date && until.map_or(true, |u| date <= u) {
                        anchors.push(date);
                    }
                }
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
            }
        }
        RecurrenceFrequency::Custom { interval_days } => {
            let mut date = rule.start_date;
            while anchors.len() < cap && until.map_or(true, |u| date <= u) {
                anchors.push(date);
                date += Duration::days(*interval_days as i64);
            }
        }
    }

    anchors
}

fn anchor_in_month(anchor: &MonthlyAnchor, year: i32, month: u32) -> Option<NaiveDate> {
    match anchor {
        MonthlyAnchor::DayOfMonth(day) => NaiveDate::from_ymd_opt(year, month, *day),
        MonthlyAnchor::NthWeekday { nth, weekday } => {
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            let offset = ((*weekday - day_of_week(first)) % 7 + 7) % 7;
            let day = 1 + offset as u32 + (nth - 1) * 7;
            NaiveDate::from_ymd_opt(year, month, day)
        }
    }
}
