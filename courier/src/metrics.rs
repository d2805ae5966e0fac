//! Metric names, registered with descriptions on first use.

use lazy_static::lazy_static;

lazy_static! {
    /// Track number of requests accepted by a queue.
    pub static ref REQUESTS_ENQUEUED: &'static str = {
        metrics::describe_counter!(
            "courier_requests_enqueued_total",
            "Total number of requests accepted by a dispatch queue."
        );
        "courier_requests_enqueued_total"
    };
    /// Track number of requests that joined an equal request in flight.
    pub static ref REQUESTS_DEDUPLICATED: &'static str = {
        metrics::describe_counter!(
            "courier_requests_deduplicated_total",
            "Total number of requests served by an equal request already in flight."
        );
        "courier_requests_deduplicated_total"
    };
    /// Track number of successful deliveries.
    pub static ref REQUESTS_DELIVERED: &'static str = {
        metrics::describe_counter!(
            "courier_requests_delivered_total",
            "Total number of responses delivered to requests."
        );
        "courier_requests_delivered_total"
    };
    /// Track number of error deliveries.
    pub static ref REQUESTS_FAILED: &'static str = {
        metrics::describe_counter!(
            "courier_requests_failed_total",
            "Total number of errors delivered to requests."
        );
        "courier_requests_failed_total"
    };
    /// Track number of cancelled requests.
    pub static ref REQUESTS_CANCELLED: &'static str = {
        metrics::describe_counter!(
            "courier_requests_cancelled_total",
            "Total number of requests cancelled before delivery."
        );
        "courier_requests_cancelled_total"
    };
    /// Track number of transport calls aborted by the timeout policy.
    pub static ref REQUESTS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "courier_requests_timeout_total",
            "Total number of transport calls aborted by the queue timeout."
        );
        "courier_requests_timeout_total"
    };
    /// Gauge of transport calls in progress or waiting for a slot.
    pub static ref REQUESTS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "courier_requests_active",
            "Number of transport calls in progress or waiting for a slot."
        );
        "courier_requests_active"
    };
    /// Histogram of transport call duration.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "courier_request_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of transport calls in seconds."
        );
        "courier_request_duration_seconds"
    };
}
