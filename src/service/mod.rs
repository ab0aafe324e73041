//! Service layer: admission orchestration.
//!
//! [`AdmissionService`] is the entry point for every registration and
//! event-administration operation. It evaluates rules, drives the seat
//! ledger with bounded retries, and publishes domain events after commit.

pub mod admission_service;
pub mod validation;

pub use admission_service::AdmissionService;
pub use validation::{ContactValidator, ObjectContactValidator};
