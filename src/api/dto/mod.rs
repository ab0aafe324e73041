//! Data Transfer Objects for REST request/response serialization.
//!
//! Requests are mapped onto domain inputs here; responses reuse the domain
//! records wherever their serialized shape is already the wire shape.

pub mod common_dto;
pub mod event_dto;
pub mod registration_dto;

pub use common_dto::*;
pub use event_dto::*;
pub use registration_dto::*;
