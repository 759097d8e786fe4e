//! Core business logic for herald.
//!
//! The services here are constructed once by the server binary and shared
//! through `Arc`s; nothing in this crate holds process-global state.

pub mod services;

pub use services::*;
