#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # courier
//!
//! Format-aware HTTP request envelopes with synchronous and asynchronous
//! dispatch.
//!
//! A [`Request`] describes one call and the types its response and error
//! bodies decode into. A [`RequestQueue`] runs envelopes against a
//! [`Transport`] and delivers each outcome exactly once: to a caller waiting
//! in [`Request::perform_request`], to a [`ResponseListener`], and to every
//! [`Pending`] handle obtained from [`Request::completion`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier::{QueueConfig, Request, RequestConfig, RequestQueue, Transport};
//! use courier_core::{RequestFormat, RequestMethod};
//!
//! async fn fetch<T: Transport>(transport: T) {
//!     let queue = RequestQueue::new(transport, QueueConfig::default());
//!     let request: Arc<Request<serde_json::Value>> = Arc::new(
//!         Request::new(
//!             RequestMethod::Get,
//!             "https://example.com/api/items",
//!             RequestConfig::new(RequestFormat::Json),
//!         )
//!         .unwrap(),
//!     );
//!
//!     if let Some(data) = request.perform_request(true, &queue).await {
//!         println!("{:?} {:?}", data.status_code, data.result);
//!     }
//! }
//! ```

/// Envelope completion primitives.
///
/// [`OneShot`](completion::OneShot) is completed at most once; any number of
/// [`Pending`](completion::Pending) handles observe it either by awaiting or
/// by blocking a thread.
pub mod completion;

/// Queue configuration and timeout policies.
pub mod config;

/// Completion callbacks.
pub mod listener;

/// Metrics collection for dispatch observability.
///
/// Available with the `metrics` feature. Counters cover enqueued,
/// deduplicated, delivered, failed, cancelled and timed out requests.
#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

/// The dispatch queue and the type-erased envelope it runs.
pub mod queue;

/// The request envelope and its configuration.
pub mod request;

/// The HTTP engine seam.
pub mod transport;

pub use completion::{OneShot, Outcome, Pending};
pub use config::{QueueConfig, QueueConfigBuilder, TimeoutPolicy};
pub use listener::{FnListener, ResponseListener};
pub use queue::{Dispatch, RequestQueue};
pub use request::{BodyObject, QueryValue, Request, RequestConfig, RequestState};
pub use transport::{OutgoingRequest, Transport};

pub use courier_core::{
    Charset, ConfigurationError, FormatError, FormatTag, FromPayload, NetworkResponse, Payload,
    RequestError, RequestFormat, RequestMethod, ResponseData, ResponseFormat, Tag,
    TransportError, TransportErrorKind, Typed,
};
pub use courier_format::{FormatHandler, FormatHandlerExt, FormatRegistry};
