//! # admission-gateway
//!
//! Event registration and capacity admission control. Attendees register
//! for events with a fixed number of seats; the service guarantees that the
//! number of held seats never exceeds capacity, that the registration
//! deadline is enforced, and that every registration follows a closed
//! lifecycle (`pending → confirmed → attended | no-show`, with cancellation
//! releasing the seat).
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Feed (ws/)
//!     │
//!     ├── AdmissionService (service/)
//!     ├── EventBus (domain/)  ──► audit log writer
//!     │
//!     ├── Eligibility rules + registration state machine (domain/)
//!     │
//!     └── AdmissionStore (persistence/)
//!           ├── MemoryStore   (per-event mutex)
//!           └── PostgresStore (conditional UPDATE in a transaction)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
