//! HTTP handlers, one module per route group

pub mod auth;
pub mod calculator;
pub mod catalog;
pub mod dashboard;
pub mod farm;
pub mod health;
pub mod mapping;
pub mod profile;
pub mod record;
pub mod season;
pub mod survey;

pub use auth::*;
pub use catalog::*;
pub use dashboard::*;
pub use farm::*;
pub use health::*;
pub use mapping::*;
pub use profile::*;
pub use record::*;
pub use season::*;
pub use survey::*;
