pub mod models;
pub mod services;

pub use models::{
    AffectedAppointment, CascadeChoice, CascadeDisposition, CascadeOutcome, CascadeReport,
    CascadeResolution, DeclareEmergency, EmergencyDeclaration,
};
pub use services::planner::EmergencyCascadeService;
