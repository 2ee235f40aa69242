pub mod appointment;
pub mod error;
pub mod events;
pub mod interval;
pub mod lock;
pub mod schedule;
pub mod series;

pub use appointment::{
    Actor, Appointment, AppointmentStatus, AppointmentTypeSettings, BookAppointment,
    CancelAppointment, RescheduleAppointment, StatusTransition, UpdateAppointmentType,
};
pub use error::SchedulingError;
pub use events::{AuditAction, AuditEvent, NotificationEvent, NotificationKind};
pub use interval::{coalesce, subtract_all, TimeSlot};
pub use lock::SlotLock;
pub use schedule::{
    day_of_week, BreakTime, Leave, LeaveStatus, SpecialDate, SpecialDateKind,
    WorkingHoursTemplate,
};
pub use series::{
    EditScope, MonthlyAnchor, RecurrenceFrequency, RecurrenceRule, RecurringSeries, SeriesEnd,
    SeriesStatus,
};
