use uuid::Uuid;

/// Header used to correlate a client call with backend logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// OpenTelemetry-compatible trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    // A simple-format UUID is exactly 128 bits of hex.
    Uuid::new_v4().as_simple().to_string()
}

/// Span ID (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// A named span for one logical operation plus its fresh trace ID.
pub fn create_operation_span(operation: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation = %operation,
    );
    (span, trace_id)
}

/// Span for one outbound API request. The returned trace ID is sent as
/// `X-Request-Id` so backend logs can be joined with ours.
pub fn create_request_span(method: &str, path: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::debug_span!(
        "api_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );
    (span, trace_id)
}

/// Child span under an existing trace ID.
pub fn create_child_span(trace_id: &str, operation: &str) -> tracing::Span {
    tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation = %operation,
    )
}
