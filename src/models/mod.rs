//! Data models for the enrollment application.
//!
//! Field names match the backend column names, so rows deserialize directly from
//! the data API. Embedded relations use the related table's name as their key.

mod class;
mod enrollment;
mod guardian;
mod payment;
mod profile;
mod student;

pub use class::*;
pub use enrollment::*;
pub use guardian::*;
pub use payment::*;
pub use profile::*;
pub use student::*;
