//! Tower middleware logging outbound HTTP calls.
//!
//! [`OutboundLayer`] is the interception wrapper for `tower` clients: the wrapped service is the
//! dispatcher, the request describes the call and the response future is the settlement.
//! A call that fails without a response logs only its `outbound_request` record.

use axum::http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::instrument;

use crate::intercept::InterceptConfig;

/// Layer adding outbound call logging to an HTTP client service.
///
/// # Examples
///
/// ```rust
/// use logtap::intercept::InterceptConfig;
/// use logtap::{OutboundLayer, TracingLogger};
/// use tower::ServiceBuilder;
/// use tracing::Level;
///
/// let config = InterceptConfig::new(TracingLogger).with_level(Level::INFO);
/// let client = ServiceBuilder::new()
///     .layer(OutboundLayer::new(Some(config)))
///     .service_fn(|_req: axum::http::Request<()>| async {
///         Ok::<_, std::convert::Infallible>(axum::http::Response::new(()))
///     });
/// # let _ = client;
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutboundLayer {
    config: Option<InterceptConfig>,
}

impl OutboundLayer {
    /// With no config the layer passes calls through untouched.
    pub fn new(config: Option<InterceptConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for OutboundLayer {
    type Service = OutboundService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OutboundService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Service produced by [`OutboundLayer`].
#[derive(Debug, Clone)]
pub struct OutboundService<S> {
    inner: S,
    config: Option<InterceptConfig>,
}

impl<S, B, R> Service<Request<B>> for OutboundService<S>
where
    S: Service<Request<B>, Response = Response<R>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    R: Send + 'static,
{
    type Response = Response<R>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request<B>) -> Self::Future {
        let armed = self.config.as_ref().and_then(|config| config.arm(&request));
        if let Some(armed) = &armed {
            armed.dispatched();
        }

        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;
            if let (Some(armed), Ok(response)) = (armed, &result) {
                armed.settled(Some(response.status().as_u16()));
            }
            result
        })
    }
}
