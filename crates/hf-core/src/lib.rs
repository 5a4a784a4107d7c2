//! Configuration and in-memory session state for the hookfilter client.

pub mod config;
pub mod event_bus;
pub mod session;
