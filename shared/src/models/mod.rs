//! Domain models for the Farm Surveillance Platform

mod boundary;
mod farm;
mod season;
mod survey;

pub use boundary::*;
pub use farm::*;
pub use season::*;
pub use survey::*;
