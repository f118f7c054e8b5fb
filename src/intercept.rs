//! Outbound-call interception.
//!
//! [`wrap_dispatcher`] decorates any dispatcher `Fn(A) -> H` (the function a service uses to
//! call downstream systems) so that every call logs an `outbound_request` record when it is
//! dispatched and an `inbound_response` record when it settles. The argument and the returned
//! handle pass through untouched.
//!
//! The argument describes its target through [`DescribeCall`]; the handle reports settlement
//! through [`ResponseEvents`]. For `tower` HTTP clients see [`crate::outbound::OutboundLayer`].
//!
//! # Examples
//!
//! ```rust
//! use logtap::intercept::{wrap_dispatcher, InterceptConfig, OutboundRequest, ResponseEvents, Settlement, TargetUrl};
//! use logtap::TracingLogger;
//! use tracing::Level;
//!
//! struct Pending;
//!
//! impl ResponseEvents for Pending {
//!     type Payload = Settlement;
//!
//!     fn once_response<F>(&mut self, listener: F)
//!     where
//!         F: FnOnce(Option<&Settlement>) + Send + 'static,
//!     {
//!         listener(Some(&Settlement { status_code: Some(200) }));
//!     }
//! }
//!
//! let config = InterceptConfig::new(TracingLogger)
//!     .with_level(Level::INFO)
//!     .with_trace_header("x-request-id");
//! let send = wrap_dispatcher(Some(config), |_request: OutboundRequest| Pending);
//!
//! let _handle = send(OutboundRequest::new("GET").with_url(TargetUrl {
//!     protocol: Some("http:".into()),
//!     host: Some("users".into()),
//!     pathname: Some("/v1/users".into()),
//!     query: None,
//! }));
//! ```

use axum::http::{Request, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, Level};

use crate::clock::{duration_value, elapsed_ms, Clock, SystemClock};
use crate::logger::Logger;
use crate::types::{opt_value, LogRecord, LogTag};

/// Transform applied to each record right before it is emitted.
pub type SerializeFn = Arc<dyn Fn(LogRecord) -> LogRecord + Send + Sync>;

/// Configuration of the interception wrapper.
///
/// Every field is optional. Records are only emitted when both `logger` and `level` are set;
/// without a trace header name `requestId` is always `null`.
#[derive(Clone, Default)]
pub struct InterceptConfig {
    pub logger: Option<Arc<dyn Logger>>,
    pub serialize: Option<SerializeFn>,
    pub trace_header_name: Option<String>,
    pub level: Option<Level>,
    /// Time source for durations, the system clock when unset
    pub clock: Option<Arc<dyn Clock>>,
}

impl InterceptConfig {
    /// Config logging to `logger`. No level is set yet, so nothing is emitted until
    /// [`with_level`](Self::with_level) is called.
    pub fn new<L: Logger>(logger: L) -> Self {
        Self {
            logger: Some(Arc::new(logger)),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_trace_header(mut self, name: impl Into<String>) -> Self {
        self.trace_header_name = Some(name.into());
        self
    }

    pub fn with_serializer<F>(mut self, serialize: F) -> Self
    where
        F: Fn(LogRecord) -> LogRecord + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub(crate) fn emitter(&self) -> Option<Emitter> {
        Some(Emitter {
            logger: self.logger.clone()?,
            level: self.level?,
            serialize: self.serialize.clone(),
        })
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock))
    }

    /// Start tracking a call, if logging is configured and the argument describes a target.
    pub(crate) fn arm<A: DescribeCall + ?Sized>(&self, arg: &A) -> Option<ArmedCall> {
        let emitter = self.emitter()?;
        let clock = self.clock();
        let call = CallRecord::new(arg, self.trace_header_name.as_deref(), clock.now())?;
        Some(ArmedCall {
            emitter,
            call,
            clock,
        })
    }
}

impl fmt::Debug for InterceptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptConfig")
            .field("logger", &self.logger.is_some())
            .field("serialize", &self.serialize.is_some())
            .field("trace_header_name", &self.trace_header_name)
            .field("level", &self.level)
            .field("clock", &self.clock.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct Emitter {
    logger: Arc<dyn Logger>,
    level: Level,
    serialize: Option<SerializeFn>,
}

impl Emitter {
    pub(crate) fn emit(&self, record: LogRecord) {
        let record = match &self.serialize {
            Some(serialize) => serialize(record),
            None => record,
        };
        self.logger.log(self.level, record);
    }
}

/// Everything a settlement listener needs, captured by value at dispatch time.
pub(crate) struct ArmedCall {
    emitter: Emitter,
    call: CallRecord,
    clock: Arc<dyn Clock>,
}

impl ArmedCall {
    pub(crate) fn dispatched(&self) {
        debug!(
            method = ?self.call.target.method,
            host = ?self.call.target.host,
            path = ?self.call.target.path,
            "Outbound call dispatched"
        );
        self.emitter.emit(self.call.outbound_request());
    }

    pub(crate) fn settled(self, status: Option<u16>) {
        let record = self.call.inbound_response(status, self.clock.now());
        self.emitter.emit(record);
    }
}

/// Target of an outbound call, as described by the dispatcher argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTarget {
    pub method: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    /// Full URL, when the argument exposes one
    pub href: Option<String>,
}

/// A dispatcher argument that can describe the call it requests.
pub trait DescribeCall {
    /// The call target, or `None` when the argument cannot be described (no logging happens).
    fn describe(&self) -> Option<CallTarget>;

    /// Value of request header `name`, if the argument carries headers.
    fn header(&self, name: &str) -> Option<String>;
}

impl<T: DescribeCall + ?Sized> DescribeCall for &T {
    fn describe(&self) -> Option<CallTarget> {
        (**self).describe()
    }

    fn header(&self, name: &str) -> Option<String> {
        (**self).header(name)
    }
}

impl<T: DescribeCall> DescribeCall for Option<T> {
    fn describe(&self) -> Option<CallTarget> {
        self.as_ref()?.describe()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.as_ref()?.header(name)
    }
}

impl<B> DescribeCall for Request<B> {
    fn describe(&self) -> Option<CallTarget> {
        let uri = self.uri();
        Some(CallTarget {
            method: Some(self.method().as_str().to_owned()),
            protocol: uri.scheme_str().map(str::to_owned),
            host: uri.host().map(str::to_owned),
            port: uri.port_u16().map(|port| port.to_string()),
            path: Some(uri.path().to_owned()),
            query: uri.query().map(str::to_owned),
            href: uri.authority().map(|_| uri.to_string()),
        })
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }
}

/// Parsed URL of an [`OutboundRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUrl {
    pub protocol: Option<String>,
    pub pathname: Option<String>,
    pub query: Option<String>,
    pub host: Option<String>,
}

/// Options-style dispatcher argument.
///
/// The target is read from `url` when present, otherwise from the flat `protocol`, `path` and
/// `host` fields. Header lookup is exact-case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: Option<String>,
    pub port: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub url: Option<TargetUrl>,
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub host: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: TargetUrl) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

impl DescribeCall for OutboundRequest {
    fn describe(&self) -> Option<CallTarget> {
        let target = match &self.url {
            Some(url) => CallTarget {
                protocol: url.protocol.clone(),
                host: url.host.clone(),
                path: url.pathname.clone(),
                query: url.query.clone(),
                ..Default::default()
            },
            None => CallTarget {
                protocol: self.protocol.clone(),
                host: self.host.clone(),
                path: self.path.clone(),
                ..Default::default()
            },
        };

        Some(CallTarget {
            method: self.method.clone(),
            port: self.port.clone(),
            ..target
        })
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.as_ref()?.get(name).cloned()
    }
}

/// Per-call state kept between dispatch and settlement.
#[derive(Debug, Clone)]
pub struct CallRecord {
    target: CallTarget,
    request_id: Option<String>,
    started_at: SystemTime,
}

impl CallRecord {
    /// Describe `arg`, normalizing the protocol (`http:` becomes `http`) and reading the request
    /// id from `trace_header`.
    pub fn new<A: DescribeCall + ?Sized>(
        arg: &A,
        trace_header: Option<&str>,
        started_at: SystemTime,
    ) -> Option<Self> {
        let mut target = arg.describe()?;
        target.protocol = target.protocol.map(|protocol| match protocol.strip_suffix(':') {
            Some(stripped) => stripped.to_owned(),
            None => protocol,
        });
        let request_id = trace_header.and_then(|name| arg.header(name));

        Some(Self {
            target,
            request_id,
            started_at,
        })
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Record emitted when the call is dispatched.
    pub fn outbound_request(&self) -> LogRecord {
        let t = &self.target;
        let mut record = LogRecord::new();
        record.insert("method".into(), opt_value(t.method.as_deref()));
        record.insert("protocol".into(), opt_value(t.protocol.as_deref()));
        record.insert("host".into(), opt_value(t.host.as_deref()));
        record.insert("port".into(), opt_value(t.port.as_deref()));
        record.insert("path".into(), opt_value(t.path.as_deref()));
        record.insert("query".into(), opt_value(t.query.as_deref()));
        record.insert("href".into(), opt_value(t.href.as_deref()));
        record.insert("requestId".into(), opt_value(self.request_id.as_deref()));
        record.insert(LogTag::FIELD.into(), LogTag::OutboundRequest.into());
        record
    }

    /// Record emitted when the call settles with a response.
    pub fn inbound_response(&self, status: Option<u16>, now: SystemTime) -> LogRecord {
        let t = &self.target;
        let mut record = LogRecord::new();
        record.insert("method".into(), opt_value(t.method.as_deref()));
        record.insert("path".into(), opt_value(t.path.as_deref()));
        record.insert("host".into(), opt_value(t.host.as_deref()));
        record.insert(
            "duration".into(),
            duration_value(elapsed_ms(Some(self.started_at), now)),
        );
        record.insert("query".into(), opt_value(t.query.as_deref()));
        record.insert("status".into(), status.map_or(Value::Null, Value::from));
        record.insert("protocol".into(), opt_value(t.protocol.as_deref()));
        record.insert("requestId".into(), opt_value(self.request_id.as_deref()));
        record.insert(LogTag::FIELD.into(), LogTag::InboundResponse.into());
        record
    }
}

/// Settlement payload that may carry a status code.
pub trait StatusCarrier {
    fn status_code(&self) -> Option<u16>;
}

/// Minimal settlement payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    pub status_code: Option<u16>,
}

impl StatusCarrier for Settlement {
    fn status_code(&self) -> Option<u16> {
        self.status_code
    }
}

impl StatusCarrier for u16 {
    fn status_code(&self) -> Option<u16> {
        Some(*self)
    }
}

impl StatusCarrier for StatusCode {
    fn status_code(&self) -> Option<u16> {
        Some(self.as_u16())
    }
}

impl<B> StatusCarrier for Response<B> {
    fn status_code(&self) -> Option<u16> {
        Some(self.status().as_u16())
    }
}

/// Handle returned by a dispatcher, able to report when the call settles.
pub trait ResponseEvents {
    type Payload: StatusCarrier;

    /// Register a listener fired once when the call settles: with the payload on a response,
    /// with `None` when there is nothing to report.
    fn once_response<F>(&mut self, listener: F)
    where
        F: FnOnce(Option<&Self::Payload>) + Send + 'static;
}

/// A dispatcher wrapped with call logging.
///
/// Calling [`Intercepted::call`] behaves exactly like calling the wrapped dispatcher.
#[derive(Clone)]
pub struct Intercepted<D> {
    config: Option<InterceptConfig>,
    dispatcher: D,
}

impl<D> Intercepted<D> {
    /// Wrap `dispatcher`. With no config the wrapper is a plain passthrough.
    pub fn new(config: Option<InterceptConfig>, dispatcher: D) -> Self {
        Self { config, dispatcher }
    }

    /// The wrapped dispatcher.
    pub fn inner(&self) -> &D {
        &self.dispatcher
    }

    pub fn call<A, H>(&self, arg: A) -> H
    where
        D: Fn(A) -> H,
        A: DescribeCall,
        H: ResponseEvents,
    {
        let armed = self.config.as_ref().and_then(|config| config.arm(&arg));
        if let Some(armed) = &armed {
            armed.dispatched();
        }

        let mut handle = (self.dispatcher)(arg);

        if let Some(armed) = armed {
            handle.once_response(move |payload| {
                if let Some(payload) = payload {
                    armed.settled(payload.status_code());
                }
            });
        }
        handle
    }
}

/// Wrap `dispatcher` so every call is logged; returns a function of the same shape.
pub fn wrap_dispatcher<A, H, D>(config: Option<InterceptConfig>, dispatcher: D) -> impl Fn(A) -> H
where
    D: Fn(A) -> H,
    A: DescribeCall,
    H: ResponseEvents,
{
    let intercepted = Intercepted::new(config, dispatcher);
    move |arg: A| intercepted.call(arg)
}
