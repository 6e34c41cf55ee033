//! Poll-session engine for livepoll.
//!
//! Everything here is transport-agnostic: the api crate binds these services
//! to WebSocket events and REST endpoints.

pub mod services;

pub use services::*;
