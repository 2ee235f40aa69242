pub mod models;
pub mod services;

pub use models::{BookingConfirmation, ConflictReport};
pub use services::booking::BookingService;
pub use services::conflict::ConflictDetectionService;
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::locks::SlotLockManager;
