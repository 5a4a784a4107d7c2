//! Session-aware client for the hookfilter backend.
//!
//! [`ClientContext`] wires the pieces together: a [`transport::Transport`]
//! with an in-memory cookie jar, the shared [`hf_core::session::SessionStore`],
//! a single [`renewal::RenewalCoordinator`], and the request pipeline every
//! resource client goes through. [`stream::LiveFeed`] consumes the delivery
//! websocket independently of the HTTP side.

pub mod auth;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod event_buffer;
pub mod pipeline;
pub mod pipes;
pub mod renewal;
pub mod stream;
pub mod transport;

pub use context::ClientContext;
pub use error::{ApiError, RenewalError, StreamError};
