//! EHR console core types and utilities

pub mod error;
pub mod reports;
pub mod routes;
pub mod status;
pub mod types;
pub mod validation;

#[cfg(feature = "tracing")]
pub mod tracing;

pub use error::{CoreError, CoreResult};
pub use routes::{AppRoute, GuardDecision, RouteGuard};
pub use status::AuthenticationStatus;
pub use types::{EhrFilter, ElectronicHealthRecord, JalaliDate, PatientType, ReceptionLookup};
pub use validation::ValidateConfig;
