//! Observability for the hookfilter client.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: in-process counters, gauges and histograms with Prometheus
//!   and JSON export, fed by the request pipeline and the live stream
//! - **Tracing**: trace/span id generation used for `X-Request-Id` and
//!   per-request spans

pub mod logging;
pub mod metrics;
pub mod tracing_setup;
