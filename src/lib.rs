//! # Logtap
//!
//! Structured request/response logging for Axum services and their outbound calls.
//!
//! Every inbound request produces an `inbound_request` record and an `outbound_response`
//! record; failures produce an `unexpected_error` record. Calls made to downstream systems
//! produce `outbound_request` and `inbound_response` records. Records are ordered JSON maps
//! ([`LogRecord`]) handed to a [`Logger`] sink.
//!
//! ## Features
//!
//! - **Health-aware**: probe routes are tagged separately and skip field selection
//! - **Field selection**: allow-listed headers and POST body keys are copied as flattened
//!   `headers.*` / `body.*` fields
//! - **Caller enrichment**: a context function adds fields to every record of a request
//! - **Outbound interception**: wrap any dispatcher, or layer a `tower` HTTP client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use logtap::{AccessLogLayer, Adapter, AdapterConfig, BackgroundLogger, TracingLogger};
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().init();
//!
//!     let config = AdapterConfig::from_env().expect("valid LOGTAP_* settings");
//!     let adapter = Adapter::new(config, BackgroundLogger::spawn(TracingLogger));
//!
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(AccessLogLayer::new(adapter));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom Hooks
//!
//! [`AccessLogLayer`] drives any [`LifecycleHooks`] implementation, not just [`Adapter`]:
//!
//! ```rust
//! use logtap::{LifecycleHooks, RequestContext};
//! use std::error::Error;
//!
//! struct PrintHooks;
//!
//! impl LifecycleHooks for PrintHooks {
//!     fn on_inbound_request(&self, ctx: &mut RequestContext) {
//!         println!("--> {} {:?}", ctx.method, ctx.url);
//!     }
//!
//!     fn on_outbound_response(&self, ctx: &RequestContext) {
//!         println!("<-- {:?}", ctx.status);
//!     }
//!
//!     fn on_error(&self, _ctx: &RequestContext, error: &(dyn Error + 'static)) {
//!         println!("!!! {error}");
//!     }
//! }
//! ```

use axum::{extract::Request, response::Response};
use std::{
    error::Error,
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod adapter;
pub mod background;
pub mod body;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod intercept;
pub mod logger;
pub mod multi_logger;
pub mod outbound;
pub mod select;
pub mod transform;
pub mod types;

pub use adapter::Adapter;
pub use background::BackgroundLogger;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AdapterConfig, InboundConfig, OutboundConfig};
pub use error::ConfigError;
pub use intercept::{wrap_dispatcher, InterceptConfig};
pub use logger::{Logger, TracingLogger};
pub use multi_logger::MultiLogger;
pub use outbound::OutboundLayer;
pub use types::{HealthRoute, LogRecord, LogTag, RequestContext};

use body::capture_json;

/// Per-request lifecycle hooks invoked by the hosting framework.
///
/// For one request the order is `on_inbound_request`, then `on_outbound_response` or
/// `on_error`. Hooks run inline and must not block.
pub trait LifecycleHooks: Send + Sync + 'static {
    /// The request has arrived. Implementations may store derived state on `ctx`.
    fn on_inbound_request(&self, ctx: &mut RequestContext);

    /// The response is about to be sent; `ctx.status` is set.
    fn on_outbound_response(&self, ctx: &RequestContext);

    /// Handling the request failed.
    fn on_error(&self, ctx: &RequestContext, error: &(dyn Error + 'static));

    /// Interception config for outbound calls, `None` when outbound logging is off.
    fn request_proxy(&self) -> Option<InterceptConfig> {
        None
    }

    /// Whether the request body should be parsed and put on `ctx.body` for `method`.
    fn captures_body(&self, _method: &str) -> bool {
        false
    }
}

/// Turns an inner-service error into the response sent to the client.
pub type ErrorResponder = Arc<dyn Fn(&RequestContext, &(dyn Error + 'static)) -> Response + Send + Sync>;

/// Tower layer driving [`LifecycleHooks`] around every request.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
/// use logtap::{AccessLogLayer, Adapter, AdapterConfig, TracingLogger};
///
/// # async fn hello() -> &'static str { "Hello" }
/// let adapter = Adapter::new(AdapterConfig::default(), TracingLogger);
/// let layer = AccessLogLayer::new(adapter)
///     .with_error_responder(|_ctx, _err| StatusCode::INTERNAL_SERVER_ERROR.into_response());
///
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(layer);
/// ```
pub struct AccessLogLayer<H> {
    hooks: Arc<H>,
    responder: Option<ErrorResponder>,
}

impl<H: LifecycleHooks> AccessLogLayer<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks: Arc::new(hooks),
            responder: None,
        }
    }

    /// Answer inner-service errors with a response instead of propagating them. The response
    /// gets an `outbound_response` record after the `unexpected_error` one.
    pub fn with_error_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RequestContext, &(dyn Error + 'static)) -> Response + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }
}

impl<H> Clone for AccessLogLayer<H> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            responder: self.responder.clone(),
        }
    }
}

impl<H> fmt::Debug for AccessLogLayer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogLayer")
            .field("responder", &self.responder.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, H> Layer<S> for AccessLogLayer<H> {
    type Service = AccessLogService<S, H>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            hooks: self.hooks.clone(),
            responder: self.responder.clone(),
        }
    }
}

/// Service produced by [`AccessLogLayer`].
pub struct AccessLogService<S, H> {
    inner: S,
    hooks: Arc<H>,
    responder: Option<ErrorResponder>,
}

impl<S: Clone, H> Clone for AccessLogService<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hooks: self.hooks.clone(),
            responder: self.responder.clone(),
        }
    }
}

impl<S, H> Service<Request> for AccessLogService<S, H>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Error + Send + Sync + 'static,
    H: LifecycleHooks,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        let mut ctx = RequestContext::from_request(&request);
        debug!(method = %ctx.method, url = ?ctx.url, "Extracted request metadata");

        let capture_body = self.hooks.captures_body(&ctx.method);
        let hooks = self.hooks.clone();
        let responder = self.responder.clone();

        // the ready service takes this request; a fresh clone waits for the next poll_ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let request = if capture_body {
                debug!("Capturing request body");
                let (request, body) = capture_json(request).await;
                ctx.body = body;
                request
            } else {
                request
            };

            hooks.on_inbound_request(&mut ctx);

            match inner.call(request).await {
                Ok(response) => {
                    ctx.status = Some(response.status().as_u16());
                    hooks.on_outbound_response(&ctx);
                    Ok(response)
                }
                Err(err) => {
                    hooks.on_error(&ctx, &err);
                    let Some(responder) = responder else {
                        return Err(err);
                    };
                    let response = responder(&ctx, &err);
                    ctx.status = Some(response.status().as_u16());
                    hooks.on_outbound_response(&ctx);
                    Ok(response)
                }
            }
        })
    }
}
