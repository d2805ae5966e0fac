use courier_core::ResponseData;

use crate::request::Request;

/// Callback notified when an envelope completes.
///
/// Exactly one of the two methods is called once per dispatched envelope.
/// Cancelled envelopes notify neither.
pub trait ResponseListener<R, E = ()>: Send + Sync {
    /// The response was received and decoded.
    fn on_response_received(&self, data: &ResponseData<R, E>, request: &Request<R, E>);

    /// The request failed. `data.error` holds the cause.
    fn on_error(&self, data: &ResponseData<R, E>, request: &Request<R, E>);
}

/// Adapts a pair of closures into a [`ResponseListener`].
pub struct FnListener<S, F> {
    on_success: S,
    on_failure: F,
}

impl<S, F> FnListener<S, F> {
    /// Creates a listener from success and failure callbacks.
    pub fn new(on_success: S, on_failure: F) -> Self {
        Self {
            on_success,
            on_failure,
        }
    }
}

impl<R, E, S, F> ResponseListener<R, E> for FnListener<S, F>
where
    S: Fn(&ResponseData<R, E>) + Send + Sync,
    F: Fn(&ResponseData<R, E>) + Send + Sync,
{
    fn on_response_received(&self, data: &ResponseData<R, E>, _request: &Request<R, E>) {
        (self.on_success)(data)
    }

    fn on_error(&self, data: &ResponseData<R, E>, _request: &Request<R, E>) {
        (self.on_failure)(data)
    }
}
