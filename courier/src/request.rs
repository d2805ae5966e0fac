//! The request envelope.
//!
//! A [`Request`] carries everything needed to put one call on the wire and to
//! turn the answer into the caller's types: verb, URL, formats, headers,
//! parameters, an optional body object, a one-shot completion and an optional
//! listener. The response and error types are the type parameters `R` and `E`.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_core::{
    Charset, ConfigurationError, FormatError, FromPayload, NetworkResponse, Payload,
    RequestFormat, RequestMethod, ResponseData, ResponseFormat, TransportError,
};
use courier_format::{FormatHandler, FormatHandlerExt, FormatRegistry};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::completion::{OneShot, Outcome, Pending};
use crate::listener::ResponseListener;
use crate::queue::{Dispatch, RequestQueue};
use crate::transport::OutgoingRequest;

#[cfg(feature = "metrics")]
use crate::metrics::REQUESTS_CANCELLED;

const ACCEPT: &str = "Accept";
const CONTENT_TYPE: &str = "Content-Type";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Formats and comparison mode of an envelope.
///
/// ```
/// use courier::RequestConfig;
/// use courier_core::{RequestFormat, ResponseFormat};
///
/// let config = RequestConfig::new(RequestFormat::Multipart)
///     .response_format(ResponseFormat::Text)
///     .smart_comparison(true);
/// assert_eq!(config.response_format, Some(ResponseFormat::Text));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Format of the request body.
    pub request_format: RequestFormat,
    /// Format of the response body. Derived from the request format if unset.
    pub response_format: Option<ResponseFormat>,
    /// Charset used to encode the body. UTF-8 if unset.
    pub default_charset: Option<String>,
    /// Compare envelopes by value instead of identity.
    pub smart_comparison: bool,
}

impl RequestConfig {
    /// Config for the given request format.
    pub fn new(request_format: RequestFormat) -> Self {
        Self {
            request_format,
            ..Self::default()
        }
    }

    /// Overrides the response format.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Sets the body charset by name.
    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = Some(charset.into());
        self
    }

    /// Enables or disables value comparison.
    pub fn smart_comparison(mut self, enabled: bool) -> Self {
        self.smart_comparison = enabled;
        self
    }
}

/// Value of a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// Appends one empty entry and stops appending the parameters after it.
    Null,
    /// Appends one entry.
    Scalar(String),
    /// Appends one entry per item; `None` items append an empty entry.
    List(Vec<Option<String>>),
}

impl QueryValue {
    /// Scalar from anything printable.
    pub fn scalar(value: impl ToString) -> Self {
        QueryValue::Scalar(value.to_string())
    }

    /// List from printable items.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        QueryValue::List(items.into_iter().map(|item| Some(item.to_string())).collect())
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Scalar(value.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Scalar(value)
    }
}

macro_rules! scalar_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(value: $ty) -> Self {
                    QueryValue::scalar(value)
                }
            }
        )*
    };
}

scalar_from!(bool, i32, i64, u32, u64, usize, f64);

impl<T: ToString> From<Vec<T>> for QueryValue {
    fn from(items: Vec<T>) -> Self {
        QueryValue::list(items)
    }
}

/// Object serialized as the request body.
///
/// Implemented for every `Serialize + PartialEq + Debug` type, so any serde
/// model can be posted and compared by value.
pub trait BodyObject: erased_serde::Serialize + fmt::Debug + Send + Sync + 'static {
    /// Upcast for downcasting in comparisons.
    fn as_any(&self) -> &dyn Any;

    /// Value equality across erased body objects of the same type.
    fn eq_body(&self, other: &dyn BodyObject) -> bool;
}

impl<T> BodyObject for T
where
    T: Serialize + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_body(&self, other: &dyn BodyObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// Body object with its bytes, encoded when the object is set.
struct PreparedBody {
    object: Arc<dyn BodyObject>,
    encoded: Result<Bytes, Arc<FormatError>>,
}

impl PreparedBody {
    fn new(
        object: Arc<dyn BodyObject>,
        handler: &dyn FormatHandler,
        charset: Option<&str>,
    ) -> Self {
        let value: &dyn erased_serde::Serialize = &*object;
        let encoded = Charset::resolve(charset)
            .and_then(|charset| handler.serialize_body(value, charset))
            .map_err(Arc::new);
        Self { object, encoded }
    }
}

/// Lifecycle of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Built, not yet handed to a queue.
    Created,
    /// Accepted by a queue.
    Enqueued,
    /// A response was decoded and delivered.
    Delivered,
    /// An error was delivered.
    Failed,
    /// Cancelled before delivery.
    Cancelled,
}

impl RequestState {
    /// Whether no further transition can happen.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Delivered | RequestState::Failed | RequestState::Cancelled
        )
    }
}

struct Progress<R, E> {
    state: RequestState,
    response: ResponseData<R, E>,
}

/// One HTTP call with its serialization setup and completion.
///
/// Envelopes are configured through `&mut self` setters and dispatched as an
/// `Arc<Request>`, which the queue keeps until delivery. By default two
/// envelopes are equal only if they are the same instance. When both have
/// smart comparison enabled they compare by URL, parameters, body, headers,
/// charset, formats and result types.
///
/// ```
/// use courier::{Request, RequestConfig};
/// use courier_core::{RequestFormat, RequestMethod};
///
/// let mut request: Request = Request::new(
///     RequestMethod::Get,
///     "http://example.com/items",
///     RequestConfig::new(RequestFormat::Json),
/// )
/// .unwrap();
/// request.add_get_parameter("tag", Some(vec!["a", "b"]));
/// request.add_get_parameter("page", Some(2));
///
/// assert_eq!(request.get_url().query(), Some("tag=a&tag=b&page=2"));
/// assert_eq!(request.request_headers().get("Accept").map(String::as_str), Some("application/json"));
/// ```
pub struct Request<R = Payload, E = ()> {
    method: RequestMethod,
    url: Url,
    request_format: RequestFormat,
    response_format: ResponseFormat,
    default_charset: Option<String>,
    smart_comparison: bool,
    request_handler: Arc<dyn FormatHandler>,
    response_handler: Arc<dyn FormatHandler>,
    headers: IndexMap<String, String>,
    post_parameters: Option<IndexMap<String, String>>,
    get_parameters: IndexMap<String, QueryValue>,
    body: Option<PreparedBody>,
    listener: Option<Arc<dyn ResponseListener<R, E>>>,
    progress: Mutex<Progress<R, E>>,
    completion: OneShot<Outcome<R, E>>,
}

impl<R, E> Request<R, E>
where
    R: FromPayload,
    E: FromPayload,
{
    /// Builds an envelope with handlers from the shared registry.
    ///
    /// Fails if the URL does not parse or a format has no registered handler.
    pub fn new(
        method: RequestMethod,
        url: &str,
        config: RequestConfig,
    ) -> Result<Self, ConfigurationError> {
        Self::with_registry(method, url, config, FormatRegistry::global())
    }

    /// Builds an envelope with handlers from `registry`.
    pub fn with_registry(
        method: RequestMethod,
        url: &str,
        config: RequestConfig,
        registry: &FormatRegistry,
    ) -> Result<Self, ConfigurationError> {
        let parsed = Url::parse(url).map_err(|error| ConfigurationError::InvalidUrl {
            url: url.to_owned(),
            reason: error.to_string(),
        })?;

        let request_format = config.request_format;
        let response_format = config
            .response_format
            .unwrap_or_else(|| request_format.default_response());
        let request_handler = registry.resolve(request_format.tag())?;
        let response_handler = registry.resolve(response_format.tag())?;

        let mut headers = IndexMap::new();
        if let Some(accept) = response_handler.accept_value().filter(|value| !value.is_empty()) {
            headers.insert(ACCEPT.to_owned(), accept.to_owned());
        }

        Ok(Self {
            method,
            url: parsed,
            request_format,
            response_format,
            default_charset: config.default_charset,
            smart_comparison: config.smart_comparison,
            request_handler,
            response_handler,
            headers,
            post_parameters: None,
            get_parameters: IndexMap::new(),
            body: None,
            listener: None,
            progress: Mutex::new(Progress {
                state: RequestState::Created,
                response: ResponseData::default(),
            }),
            completion: OneShot::new(),
        })
    }

    // Dispatch

    /// Enqueues the envelope on `queue`.
    ///
    /// In synchronous mode waits for completion and returns the delivered
    /// data, or `None` if the envelope was cancelled. An interrupted wait
    /// (queue `sync_wait_timeout` expiry) is logged and returns whatever
    /// data is currently held. In asynchronous mode returns the current data
    /// immediately; the result arrives through the listener or
    /// [`completion`](Self::completion).
    pub async fn perform_request(
        self: &Arc<Self>,
        synchronous: bool,
        queue: &RequestQueue,
    ) -> Option<ResponseData<R, E>> {
        let pending = self.completion();
        queue.add(Arc::clone(self) as Arc<dyn Dispatch>);
        if !synchronous {
            return Some(self.response_data());
        }
        self.await_completion(pending, queue.config().sync_wait_timeout)
            .await
    }

    /// Synchronous [`perform_request`](Self::perform_request) for threads
    /// outside the queue's runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context.
    pub fn perform_request_blocking(self: &Arc<Self>, queue: &RequestQueue) -> Option<ResponseData<R, E>> {
        let pending = self.completion();
        queue.add(Arc::clone(self) as Arc<dyn Dispatch>);
        let timeout = queue.config().sync_wait_timeout;
        queue
            .runtime()
            .block_on(self.await_completion(pending, timeout))
    }

    async fn await_completion(
        &self,
        mut pending: Pending<Outcome<R, E>>,
        timeout: Option<Duration>,
    ) -> Option<ResponseData<R, E>> {
        let outcome = match timeout {
            Some(timeout) => pending.wait_timeout(timeout).await,
            None => pending.wait().await,
        };
        match outcome {
            Some(outcome) => outcome.into_data(),
            None => {
                warn!(
                    method = %self.method,
                    url = %self.url,
                    "Wait for request completion was interrupted, returning current data"
                );
                Some(self.response_data())
            }
        }
    }

    /// Copy of the data currently held.
    pub fn response_data(&self) -> ResponseData<R, E> {
        self.progress.lock().response.clone()
    }

    fn finish(&self, outcome: Outcome<R, E>) {
        let (state, data) = match &outcome {
            Outcome::Response(data) => (RequestState::Delivered, data.clone()),
            Outcome::Error(data) => (RequestState::Failed, data.clone()),
            Outcome::Cancelled => return self.cancel(),
        };
        {
            let mut progress = self.progress.lock();
            if progress.state.is_terminal() {
                debug!(state = ?progress.state, url = %self.url, "Dropping delivery for completed request");
                return;
            }
            progress.state = state;
            progress.response = data.clone();
            self.completion.complete(outcome);
        }

        if let Some(listener) = &self.listener {
            match state {
                RequestState::Delivered => listener.on_response_received(&data, self),
                _ => listener.on_error(&data, self),
            }
        }
    }
}

impl<R, E> Request<R, E> {
    /// Handle resolving once the envelope is delivered, fails or is cancelled.
    pub fn completion(&self) -> Pending<Outcome<R, E>> {
        self.completion.subscribe()
    }

    /// Completes the envelope with a `None` result and marks it cancelled.
    ///
    /// Waiting callers are released immediately; a transport call already in
    /// progress is not aborted, but its result is not delivered. No-op once
    /// the envelope has completed.
    pub fn cancel(&self) {
        let mut progress = self.progress.lock();
        if progress.state.is_terminal() {
            return;
        }
        self.completion.complete(Outcome::Cancelled);
        progress.state = RequestState::Cancelled;
        debug!(method = %self.method, url = %self.url, "Request cancelled");
        #[cfg(feature = "metrics")]
        metrics::counter!(*REQUESTS_CANCELLED, "method" => self.method.as_str()).increment(1);
    }

    /// Whether [`cancel`](Self::cancel) took effect.
    pub fn is_cancelled(&self) -> bool {
        self.state() == RequestState::Cancelled
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        self.progress.lock().state
    }

    /// Registers the completion listener.
    pub fn set_response_listener<L>(&mut self, listener: L)
    where
        L: ResponseListener<R, E> + 'static,
    {
        self.listener = Some(Arc::new(listener));
    }

    /// The completion listener, if any.
    pub fn response_listener(&self) -> Option<&Arc<dyn ResponseListener<R, E>>> {
        self.listener.as_ref()
    }

    /// HTTP verb.
    pub fn method(&self) -> RequestMethod {
        self.method
    }

    /// URL as given at construction, without get-parameters.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request body format.
    pub fn request_format(&self) -> RequestFormat {
        self.request_format
    }

    /// Response body format.
    pub fn response_format(&self) -> ResponseFormat {
        self.response_format
    }

    /// Body charset name.
    pub fn default_charset(&self) -> Option<&str> {
        self.default_charset.as_deref()
    }

    /// Changes the body charset, re-encoding the body object if one is set.
    pub fn set_default_charset(&mut self, charset: Option<String>) {
        self.default_charset = charset;
        if let Some(body) = self.body.take() {
            self.body = Some(PreparedBody::new(
                body.object,
                self.request_handler.as_ref(),
                self.default_charset.as_deref(),
            ));
        }
    }

    /// Whether value comparison is enabled.
    pub fn is_smart_comparison_enabled(&self) -> bool {
        self.smart_comparison
    }

    /// Enables or disables value comparison.
    pub fn set_smart_comparison(&mut self, enabled: bool) {
        self.smart_comparison = enabled;
    }

    // Headers

    /// Headers set on this envelope, `Accept` included.
    pub fn request_headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Adds or replaces a header.
    pub fn add_request_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Adds or replaces several headers.
    pub fn add_request_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(key, value)| (key.into(), value.into())));
    }

    /// Replaces all headers, the `Accept` header included.
    pub fn set_request_headers(&mut self, headers: IndexMap<String, String>) {
        self.headers = headers;
    }

    /// Headers sent on the wire: the envelope headers plus `Content-Type`
    /// when a body is sent and the caller did not set one.
    pub fn headers(&self) -> IndexMap<String, String> {
        let mut headers = self.headers.clone();
        let has_content_type = headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case(CONTENT_TYPE));
        if !has_content_type && self.method.allows_body() && self.get_body().is_some() {
            headers.insert(CONTENT_TYPE.to_owned(), self.body_content_type());
        }
        headers
    }

    // Post parameters

    /// Form parameters, if any were set.
    pub fn post_parameters(&self) -> Option<&IndexMap<String, String>> {
        self.post_parameters.as_ref()
    }

    /// Replaces the form parameters.
    ///
    /// Once form parameters are set the body object is no longer sent.
    pub fn set_post_parameters(&mut self, parameters: IndexMap<String, String>) {
        self.post_parameters = Some(parameters);
    }

    /// Merges form parameters into the current ones.
    pub fn add_post_parameters<I, K, V>(&mut self, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.post_parameters
            .get_or_insert_with(IndexMap::new)
            .extend(parameters.into_iter().map(|(key, value)| (key.into(), value.into())));
    }

    /// Sets one form parameter. `None` removes it.
    pub fn add_post_parameter(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        let parameters = self.post_parameters.get_or_insert_with(IndexMap::new);
        let key = key.into();
        match value {
            Some(value) => {
                parameters.insert(key, value.into());
            }
            None => {
                parameters.shift_remove(&key);
            }
        }
    }

    // Get parameters

    /// Query parameters in insertion order.
    pub fn get_parameters(&self) -> &IndexMap<String, QueryValue> {
        &self.get_parameters
    }

    /// Replaces the query parameters.
    pub fn set_get_parameters(&mut self, parameters: IndexMap<String, QueryValue>) {
        self.get_parameters = parameters;
    }

    /// Merges query parameters into the current ones.
    pub fn add_get_parameters<I, K, V>(&mut self, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryValue>,
    {
        self.get_parameters
            .extend(parameters.into_iter().map(|(key, value)| (key.into(), value.into())));
    }

    /// Sets one query parameter. `None` removes it.
    pub fn add_get_parameter<V>(&mut self, key: impl Into<String>, value: Option<V>)
    where
        V: Into<QueryValue>,
    {
        let key = key.into();
        match value {
            Some(value) => {
                self.get_parameters.insert(key, value.into());
            }
            None => {
                self.get_parameters.shift_remove(&key);
            }
        }
    }

    /// URL with the query parameters appended.
    ///
    /// Lists append one entry per item. A [`QueryValue::Null`] appends one
    /// empty entry and no parameter after it is appended.
    pub fn get_url(&self) -> Url {
        if self.get_parameters.is_empty() {
            return self.url.clone();
        }
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.get_parameters {
                match value {
                    QueryValue::Null => {
                        query.append_pair(key, "");
                        break;
                    }
                    QueryValue::Scalar(value) => {
                        query.append_pair(key, value);
                    }
                    QueryValue::List(items) => {
                        for item in items {
                            query.append_pair(key, item.as_deref().unwrap_or_default());
                        }
                    }
                }
            }
        }
        url
    }

    // Body

    /// Sets the body object and encodes it right away.
    pub fn set_object_to_post<T: BodyObject>(&mut self, object: T) {
        self.set_shared_object_to_post(Arc::new(object));
    }

    /// Sets an already shared body object.
    pub fn set_shared_object_to_post(&mut self, object: Arc<dyn BodyObject>) {
        self.body = Some(PreparedBody::new(
            object,
            self.request_handler.as_ref(),
            self.default_charset.as_deref(),
        ));
    }

    /// The body object, if any.
    pub fn object_to_post(&self) -> Option<&dyn BodyObject> {
        self.body.as_ref().map(|body| &*body.object)
    }

    /// `Content-Type` of the body returned by [`get_body`](Self::get_body).
    pub fn body_content_type(&self) -> String {
        match &self.body {
            Some(_) if self.post_parameters.is_none() => {
                let charset = Charset::resolve(self.default_charset.as_deref()).unwrap_or_default();
                self.request_handler.content_type(charset)
            }
            _ => FORM_CONTENT_TYPE.to_owned(),
        }
    }

    /// Bytes to send as the body.
    ///
    /// The encoded body object when one is set and no form parameters are,
    /// otherwise the url-encoded form parameters, otherwise `None`. A body
    /// object that failed to encode yields an empty body.
    pub fn get_body(&self) -> Option<Bytes> {
        if let Some(body) = &self.body
            && self.post_parameters.is_none()
        {
            return Some(match &body.encoded {
                Ok(bytes) => bytes.clone(),
                Err(error) => {
                    warn!(
                        %error,
                        format = %self.request_format,
                        "Failed to encode request body, sending an empty body"
                    );
                    Bytes::new()
                }
            });
        }

        let parameters = self.post_parameters.as_ref().filter(|params| !params.is_empty())?;
        match serde_urlencoded::to_string(parameters) {
            Ok(encoded) => Some(Bytes::from(encoded)),
            Err(error) => {
                warn!(%error, "Failed to encode form parameters, sending an empty body");
                Some(Bytes::new())
            }
        }
    }

    fn smart_eq(&self, other: &Self) -> bool {
        let same_body = match (&self.body, &other.body) {
            (None, None) => true,
            (Some(this), Some(that)) => this.object.eq_body(&*that.object),
            _ => false,
        };
        self.url == other.url
            && self.get_parameters == other.get_parameters
            && same_body
            && self.post_parameters == other.post_parameters
            && self.headers == other.headers
            && self.default_charset == other.default_charset
            && self.request_format == other.request_format
            && self.response_format == other.response_format
    }
}

impl<R, E> PartialEq for Request<R, E> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.smart_comparison && other.smart_comparison && self.smart_eq(other)
    }
}

impl<R, E> Eq for Request<R, E> {}

impl<R: 'static, E: 'static> Hash for Request<R, E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if !self.smart_comparison {
            return std::ptr::hash(self, state);
        }
        self.url.as_str().hash(state);
        self.request_format.hash(state);
        self.response_format.hash(state);
        type_name::<R>().hash(state);
        type_name::<E>().hash(state);
        self.default_charset.hash(state);
        self.headers.len().hash(state);
        self.post_parameters.as_ref().map(IndexMap::len).hash(state);
        self.get_parameters.len().hash(state);
    }
}

impl<R, E> fmt::Debug for Request<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("request_format", &self.request_format)
            .field("response_format", &self.response_format)
            .field("result_type", &type_name::<R>())
            .field("error_type", &type_name::<E>())
            .field("default_charset", &self.default_charset)
            .field("headers", &self.headers)
            .field("post_parameters", &self.post_parameters)
            .field("get_parameters", &self.get_parameters)
            .field("object_to_post", &self.body.as_ref().map(|body| &body.object))
            .field("has_listener", &self.listener.is_some())
            .field("state", &self.progress.lock().state)
            .finish()
    }
}

impl<R, E> Dispatch for Request<R, E>
where
    R: FromPayload,
    E: FromPayload,
{
    fn outgoing(&self) -> OutgoingRequest {
        OutgoingRequest {
            method: self.method,
            url: self.get_url(),
            headers: self.headers(),
            body: self.get_body().filter(|_| self.method.allows_body()),
            timeout: None,
        }
    }

    fn mark_enqueued(&self) -> bool {
        let mut progress = self.progress.lock();
        match progress.state {
            RequestState::Created => {
                progress.state = RequestState::Enqueued;
                true
            }
            RequestState::Enqueued => true,
            _ => false,
        }
    }

    fn is_cancelled(&self) -> bool {
        Request::is_cancelled(self)
    }

    fn deliver_response(&self, response: &NetworkResponse) {
        let mut data = ResponseData::from_response(response);
        let decoded = if R::DECODES {
            self.response_handler
                .deserialize_into::<R>(&response.body, response.status, &response.headers)
        } else {
            Ok(None)
        };
        match decoded {
            Ok(result) => {
                data.result = result;
                self.finish(Outcome::Response(data));
            }
            Err(error) => {
                debug!(%error, url = %self.url, "Failed to decode response body");
                data.error = Some(error.into());
                self.finish(Outcome::Error(data));
            }
        }
    }

    fn deliver_error(&self, error: &TransportError) {
        let mut data = match error.response() {
            Some(response) => {
                let mut data = ResponseData::from_response(response);
                if E::DECODES {
                    match self.response_handler.deserialize_into::<E>(
                        &response.body,
                        response.status,
                        &response.headers,
                    ) {
                        Ok(parsed) => data.parsed_error = parsed,
                        Err(parse_error) => {
                            debug!(error = %parse_error, url = %self.url, "Failed to decode error body");
                        }
                    }
                }
                data
            }
            None => ResponseData::default(),
        };
        data.error = Some(error.clone().into());
        self.finish(Outcome::Error(data));
    }

    fn dedup_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.method.hash(&mut hasher);
        self.hash(&mut hasher);
        hasher.finish()
    }

    // Smart equality ignores the method; a flight never mixes verbs.
    fn same_request(&self, other: &dyn Dispatch) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.method == other.method && self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
