//! Data types shared by the transformers, the adapter and the middleware.
//!
//! The central types are [`RequestContext`], the read-only view of one inbound request, and
//! [`LogRecord`], the ordered field map every hook produces. Each record carries exactly one
//! [`LogTag`] under the `log_tag` key.

use axum::http::{header::HeaderName, HeaderMap, HeaderValue, Request};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::SystemTime;

/// A structured log record.
///
/// Insertion order is preserved, and inserting an existing key replaces the value in place, so
/// building a record by successive inserts behaves like an object merge where later fields win.
/// Values that are unknown for a given event are stored as `null` rather than omitted, which
/// keeps the key set of each record shape stable.
pub type LogRecord = Map<String, Value>;

/// Classification tag attached to every record under [`LogTag::FIELD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTag {
    InboundRequest,
    InboundRequestHealth,
    OutboundResponse,
    OutboundResponseHealth,
    OutboundRequest,
    InboundResponse,
    UnexpectedError,
}

impl LogTag {
    /// Record key holding the tag.
    pub const FIELD: &'static str = "log_tag";

    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::InboundRequest => "inbound_request",
            LogTag::InboundRequestHealth => "inbound_request_health",
            LogTag::OutboundResponse => "outbound_response",
            LogTag::OutboundResponseHealth => "outbound_response_health",
            LogTag::OutboundRequest => "outbound_request",
            LogTag::InboundResponse => "inbound_response",
            LogTag::UnexpectedError => "unexpected_error",
        }
    }

    /// Whether this is one of the health-probe variants.
    pub fn is_health(&self) -> bool {
        matches!(
            self,
            LogTag::InboundRequestHealth | LogTag::OutboundResponseHealth
        )
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogTag> for Value {
    fn from(tag: LogTag) -> Self {
        Value::String(tag.as_str().to_owned())
    }
}

/// A route treated as a liveness/readiness probe.
///
/// Requests matching a health route are logged with the `_health` tag variants and never have
/// headers or body fields selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRoute {
    /// Exact, case-sensitive request path
    pub path: String,
    /// HTTP method, compared case-insensitively
    pub method: String,
}

impl HealthRoute {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }

    /// Shorthand for a `GET` probe.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, "GET")
    }
}

/// Read-only view of an inbound request, as supplied by the hosting framework.
///
/// `log_ctx` is filled once per request by the adapter's enrichment step and `status` once the
/// response is ready; everything else is set when the request arrives.
///
/// # Examples
///
/// ```rust
/// use logtap::RequestContext;
///
/// let ctx = RequestContext::new("get", "/users?page=2")
///     .with_header("x-request-id", "abc");
///
/// assert_eq!(ctx.url_path(), Some("/users"));
/// assert_eq!(ctx.url_query(), Some("page=2"));
/// assert_eq!(ctx.header("x-request-id").as_deref(), Some("abc"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP method as received, any case
    pub method: String,
    /// Transport protocol (`http`, `https`), when known
    pub protocol: Option<String>,
    /// Raw request target (path and query) as seen on the wire
    pub url: Option<String>,
    /// Path resolved by the framework, preferred over `url` for health matching
    pub path: Option<String>,
    /// Raw query string of the request
    pub query: Option<String>,
    /// Request headers, if the framework exposes them
    pub headers: Option<HeaderMap>,
    /// Parsed request body; only captured for POST requests with a body allow-list
    pub body: Option<Value>,
    /// When the request arrived
    pub started_at: Option<SystemTime>,
    /// Caller-enriched fields, computed once per request
    pub log_ctx: LogRecord,
    /// Response status, once the response is ready
    pub status: Option<u16>,
}

impl RequestContext {
    /// Create a context for `method` and the raw request target `url`.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Build a context from an HTTP request's head, stamping `started_at` with the current time.
    ///
    /// Servers see origin-form targets with no scheme, so the protocol falls back to the first
    /// `x-forwarded-proto` value and then to `http`.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let uri = request.uri();
        let protocol = uri
            .scheme_str()
            .map(str::to_owned)
            .or_else(|| forwarded_proto(request.headers()))
            .unwrap_or_else(|| "http".to_owned());

        Self {
            method: request.method().as_str().to_owned(),
            protocol: Some(protocol),
            url: Some(
                uri.path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or_else(|| uri.path())
                    .to_owned(),
            ),
            path: Some(uri.path().to_owned()),
            query: uri.query().map(str::to_owned),
            headers: Some(request.headers().clone()),
            started_at: Some(SystemTime::now()),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Add a header. Names or values that are not valid HTTP tokens are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers
                .get_or_insert_with(HeaderMap::new)
                .append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_started_at(mut self, started_at: SystemTime) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// First value of header `name`, decoded lossily.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .as_ref()?
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    /// Path component of the raw request target.
    pub fn url_path(&self) -> Option<&str> {
        self.url.as_deref().map(|url| split_target(url).0)
    }

    /// Query component of the raw request target, `None` when there is no `?`.
    pub fn url_query(&self) -> Option<&str> {
        self.url.as_deref().and_then(|url| split_target(url).1)
    }
}

fn forwarded_proto(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-proto")?.to_str().ok()?;
    let proto = value.split(',').next()?.trim();
    (!proto.is_empty()).then(|| proto.to_ascii_lowercase())
}

fn split_target(url: &str) -> (&str, Option<&str>) {
    let url = url.split_once('#').map_or(url, |(before, _)| before);
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

/// Convert an optional string into a record value, `null` when absent.
pub(crate) fn opt_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_owned()))
}
