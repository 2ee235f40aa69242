pub mod models;
pub mod services;

pub use models::{AvailableSlot, SlotQuery};
pub use services::resolver::AvailabilityService;
pub use services::slots::SlotGenerator;
