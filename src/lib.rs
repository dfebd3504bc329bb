//! School enrollment data layer.
//!
//! Typed access to the hosted enrollment database and profile image storage,
//! and an explicit state container holding the snapshot the UI renders from.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod store;

pub use config::Config;
pub use errors::AppError;
pub use gateway::Gateway;
pub use store::EnrollmentStore;

#[cfg(test)]
mod tests;
