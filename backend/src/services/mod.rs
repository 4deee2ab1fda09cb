//! Business logic services for the Farm Surveillance Platform

pub mod auth;
pub mod boundary;
pub mod calculation;
pub mod catalog;
pub mod dashboard;
pub mod farm;
pub mod grower;
pub mod media;
pub mod record;
pub mod season;
pub mod survey;

pub use auth::AuthService;
pub use boundary::BoundaryService;
pub use calculation::CalculationService;
pub use catalog::CatalogService;
pub use dashboard::DashboardService;
pub use farm::FarmService;
pub use grower::GrowerService;
pub use media::MediaService;
pub use record::RecordService;
pub use season::SeasonService;
pub use survey::SurveyService;
