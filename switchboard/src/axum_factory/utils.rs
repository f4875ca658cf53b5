//! Utilities used for [`super::make_axum_router`]

use std::time::Duration;

use http::StatusCode;
use tower_http::trace::MakeSpan;
use tower_http::trace::OnResponse;
use tracing::Span;

pub(crate) const REQUEST_SPAN_NAME: &str = "request";

/// Opens the `request` span every other span of a request nests under.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        tracing::info_span!(
            REQUEST_SPAN_NAME,
            "http.method" = %request.method(),
            "http.route" = %request.uri().path(),
            "http.response.status_code" = tracing::field::Empty,
            "duration_ms" = tracing::field::Empty,
        )
    }
}

/// Records the outcome on the `request` span.
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &http::Response<B>, latency: Duration, span: &Span) {
        span.record("http.response.status_code", response.status().as_u16());
        span.record("duration_ms", latency.as_millis() as u64);
        if response.status() >= StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(status = %response.status(), "request failed");
        } else {
            tracing::debug!(status = %response.status(), "request finished");
        }
    }
}
