pub mod models;
pub mod services;

pub use models::{CreateSeries, ExpansionReport, OccurrenceDisposition, OccurrenceOutcome, SeriesEdit};
pub use services::expansion::SeriesExpansionService;
