//! The adapter facade.
//!
//! [`Adapter`] binds an [`AdapterConfig`] and a [`Logger`] into the set of lifecycle hooks a
//! hosting framework invokes per request (see [`LifecycleHooks`]), plus the outbound
//! interception config handed to dispatcher wrappers.

use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, Level};

use crate::clock::{Clock, SystemClock};
use crate::config::AdapterConfig;
use crate::intercept::{InterceptConfig, Intercepted, SerializeFn};
use crate::logger::Logger;
use crate::outbound::OutboundLayer;
use crate::transform;
use crate::types::{opt_value, LogRecord, RequestContext};
use crate::LifecycleHooks;

const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Caller-supplied extraction of extra log fields from a request.
pub type ContextFn = Arc<dyn Fn(&RequestContext) -> LogRecord + Send + Sync>;

/// Request/response logging adapter.
///
/// Cloning is cheap; clones share configuration and sinks.
///
/// # Examples
///
/// ```rust
/// use logtap::{Adapter, AdapterConfig, HealthRoute, LogRecord, TracingLogger};
/// use serde_json::json;
///
/// let config = AdapterConfig {
///     health: vec![HealthRoute::get("/health")],
///     trace_header_name: Some("x-request-id".into()),
///     ..Default::default()
/// };
///
/// let adapter = Adapter::new(config, TracingLogger).with_context(|ctx| {
///     let mut fields = LogRecord::new();
///     fields.insert("userId".into(), json!(ctx.header("x-user-id")));
///     fields
/// });
/// # let _ = adapter;
/// ```
#[derive(Clone)]
pub struct Adapter {
    config: Arc<AdapterConfig>,
    logger: Arc<dyn Logger>,
    context: Option<ContextFn>,
    serialize: Option<SerializeFn>,
    clock: Arc<dyn Clock>,
}

impl Adapter {
    pub fn new<L: Logger>(config: AdapterConfig, logger: L) -> Self {
        Self {
            config: Arc::new(config),
            logger: Arc::new(logger),
            context: None,
            serialize: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Extract extra fields from each request. They come first in every record and keep their
    /// own order; the standard fields are merged on top.
    pub fn with_context<F>(mut self, context: F) -> Self
    where
        F: Fn(&RequestContext) -> LogRecord + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(context));
        self
    }

    /// Transform every record right before it is emitted, including outbound call records.
    pub fn with_serializer<F>(mut self, serialize: F) -> Self
    where
        F: Fn(LogRecord) -> LogRecord + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Compute the request's log context and store it on `ctx`.
    pub fn enrich(&self, ctx: &mut RequestContext) {
        ctx.log_ctx = self.log_context(ctx);
    }

    fn log_context(&self, ctx: &RequestContext) -> LogRecord {
        let mut record = match &self.context {
            Some(context) => context(ctx),
            None => LogRecord::new(),
        };

        record.insert("protocol".into(), opt_value(ctx.protocol.as_deref()));
        record.insert("method".into(), Value::String(ctx.method.to_uppercase()));
        record.insert("path".into(), opt_value(ctx.url_path()));
        record.insert("query".into(), opt_value(ctx.url_query()));

        if let Some(request_id) = self
            .config
            .trace_header_name
            .as_deref()
            .and_then(|name| ctx.header(name))
        {
            record.insert("requestId".into(), Value::String(request_id));
        }
        record
    }

    fn emit(&self, level: Level, record: LogRecord) {
        let record = match &self.serialize {
            Some(serialize) => serialize(record),
            None => record,
        };
        self.logger.log(level, record);
    }

    /// Tower layer logging calls made through an HTTP client service.
    pub fn outbound_layer(&self) -> OutboundLayer {
        OutboundLayer::new(self.request_proxy())
    }

    /// Wrap a dispatcher so its calls are logged with this adapter's settings.
    pub fn wrap_dispatcher<D>(&self, dispatcher: D) -> Intercepted<D> {
        Intercepted::new(self.request_proxy(), dispatcher)
    }
}

impl LifecycleHooks for Adapter {
    fn on_inbound_request(&self, ctx: &mut RequestContext) {
        self.enrich(ctx);
        let record = transform::inbound_request(
            ctx,
            &self.config.health,
            self.config.body_keys.as_deref(),
            self.config.headers_regex.as_ref(),
        );
        self.emit(self.config.inbound.level, record);
    }

    fn on_outbound_response(&self, ctx: &RequestContext) {
        let record = transform::outbound_response(ctx, &self.config.health, self.clock.now());
        self.emit(self.config.inbound.level, record);
    }

    fn on_error(&self, ctx: &RequestContext, error: &(dyn Error + 'static)) {
        debug!(error = %error, "Logging unexpected error");
        self.emit(Level::ERROR, transform::error(ctx, error));
    }

    fn request_proxy(&self) -> Option<InterceptConfig> {
        if !self.config.outbound.enabled {
            return None;
        }
        Some(InterceptConfig {
            logger: Some(self.logger.clone()),
            serialize: self.serialize.clone(),
            trace_header_name: self.config.trace_header_name.clone(),
            level: self.config.outbound.level,
            clock: Some(self.clock.clone()),
        })
    }

    /// Bodies of POST, PUT and PATCH requests are captured so error records can carry them;
    /// `metaBody` selection stays limited to POST with an allow-list.
    fn captures_body(&self, method: &str) -> bool {
        BODY_METHODS
            .iter()
            .any(|body_method| method.eq_ignore_ascii_case(body_method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::intercept::{OutboundRequest, ResponseEvents, Settlement, TargetUrl};
    use crate::logger::testing::CapturingLogger;
    use crate::types::HealthRoute;
    use regex::Regex;
    use serde_json::json;

    const TRACE_ID: &str = "cff07fc2-4ef6-42b6-9a74-ba3abf8b31a2";

    fn config() -> AdapterConfig {
        AdapterConfig {
            health: vec![HealthRoute::get("/"), HealthRoute::get("/health")],
            trace_header_name: Some("x-request-id".into()),
            ..Default::default()
        }
    }

    fn adapter(config: AdapterConfig, logger: &CapturingLogger) -> Adapter {
        Adapter::new(config, logger.clone())
            .with_context(|ctx| {
                let mut fields = LogRecord::new();
                fields.insert("userId".into(), opt_value(ctx.header("test_user_id_header").as_deref()));
                fields
            })
            .with_clock(FixedClock::at_millis(1_000))
    }

    fn request(method: &str, url: &str) -> RequestContext {
        RequestContext::new(method, url)
            .with_protocol("http")
            .with_header("test_user_id_header", "u-42")
            .with_header("x-request-id", TRACE_ID)
            .with_header("xx-something", "true")
            .with_started_at(FixedClock::at_millis(960).now())
    }

    #[test]
    fn test_log_context_order_and_fields() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        let mut ctx = request("get", "/test?page=2");

        adapter.enrich(&mut ctx);
        assert_eq!(
            Value::Object(ctx.log_ctx.clone()),
            json!({
                "userId": "u-42",
                "protocol": "http",
                "method": "GET",
                "path": "/test",
                "query": "page=2",
                "requestId": TRACE_ID
            })
        );
        let keys: Vec<&str> = ctx.log_ctx.keys().map(String::as_str).collect();
        assert_eq!(keys, ["userId", "protocol", "method", "path", "query", "requestId"]);
    }

    #[test]
    fn test_request_id_absent_without_header() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        let mut ctx = RequestContext::new("GET", "/test");

        adapter.enrich(&mut ctx);
        assert!(ctx.log_ctx.get("requestId").is_none());
        assert_eq!(ctx.log_ctx["userId"], Value::Null);
        assert_eq!(ctx.log_ctx["query"], Value::Null);
    }

    #[test]
    fn test_inbound_without_header_pattern() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        let mut ctx = request("GET", "/test");

        adapter.on_inbound_request(&mut ctx);
        let records = logger.at(Level::INFO);
        assert_eq!(records.len(), 1);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({
                "userId": "u-42",
                "protocol": "http",
                "method": "GET",
                "path": "/test",
                "query": null,
                "requestId": TRACE_ID,
                "metaHeaders": {},
                "log_tag": "inbound_request"
            })
        );
    }

    #[test]
    fn test_inbound_post_with_selection() {
        let logger = CapturingLogger::default();
        let adapter = adapter(
            AdapterConfig {
                body_keys: Some(vec!["testKeyA".into()]),
                headers_regex: Some(Regex::new("^xx-").unwrap()),
                ..config()
            },
            &logger,
        );
        let mut ctx = request("POST", "/test").with_body(json!({"testKeyA": true, "secret": "x"}));

        adapter.on_inbound_request(&mut ctx);
        let record = &logger.at(Level::INFO)[0];
        assert_eq!(record["metaHeaders"], json!({"headers.xx-something": "true"}));
        assert_eq!(record["metaBody"], json!({"body.testKeyA": true}));
        assert_eq!(record["log_tag"], json!("inbound_request"));
    }

    #[test]
    fn test_health_pair() {
        let logger = CapturingLogger::default();
        let adapter = adapter(
            AdapterConfig {
                headers_regex: Some(Regex::new(".*").unwrap()),
                ..config()
            },
            &logger,
        );
        let mut ctx = request("GET", "/health").with_path("/health");

        adapter.on_inbound_request(&mut ctx);
        ctx.status = Some(200);
        adapter.on_outbound_response(&ctx);

        let records = logger.at(Level::INFO);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["log_tag"], json!("inbound_request_health"));
        assert!(records[0].get("metaHeaders").is_none());
        assert_eq!(records[1]["log_tag"], json!("outbound_response_health"));
        assert_eq!(records[1]["status"], json!(200));
        assert_eq!(records[1]["duration"], json!(40));
    }

    #[test]
    fn test_outbound_response() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        let mut ctx = request("GET", "/test");
        adapter.enrich(&mut ctx);
        ctx.status = Some(418);

        adapter.on_outbound_response(&ctx);
        let record = &logger.at(Level::INFO)[0];
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["status", "duration", "userId", "protocol", "method", "path", "query", "requestId", "log_tag"]
        );
        assert_eq!(record["status"], json!(418));
        assert_eq!(record["duration"], json!(40));
        assert_eq!(record["log_tag"], json!("outbound_response"));
    }

    #[test]
    fn test_error_goes_to_error_level() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        let mut ctx = request("POST", "/test?retry=1").with_query("retry=1");
        adapter.enrich(&mut ctx);

        adapter.on_error(&ctx, &std::io::Error::other("db unavailable"));
        let records = logger.at(Level::ERROR);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["message"], json!("db unavailable"));
        assert_eq!(records[0]["context"]["requestId"], json!(TRACE_ID));
        assert_eq!(
            records[0]["params"],
            json!({"query": "retry=1", "body": null, "log_tag": "unexpected_error"})
        );
    }

    #[test]
    fn test_custom_levels() {
        let logger = CapturingLogger::default();
        let mut config = config();
        config.inbound.level = Level::DEBUG;
        let adapter = adapter(config, &logger);

        adapter.on_inbound_request(&mut request("GET", "/test"));
        assert_eq!(logger.at(Level::DEBUG).len(), 1);
        assert!(logger.at(Level::INFO).is_empty());
    }

    #[test]
    fn test_serializer_applies_to_hooks() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger).with_serializer(|mut record| {
            record.remove("userId");
            record
        });

        adapter.on_inbound_request(&mut request("GET", "/test"));
        assert!(logger.records()[0].1.get("userId").is_none());
    }

    #[test]
    fn test_captures_body_for_body_methods() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger);
        assert!(adapter.config().body_keys.is_none());

        for method in ["POST", "post", "PUT", "Patch"] {
            assert!(adapter.captures_body(method), "{method} should capture");
        }
        for method in ["GET", "HEAD", "DELETE", "OPTIONS"] {
            assert!(!adapter.captures_body(method), "{method} should not capture");
        }
    }

    #[test]
    fn test_put_body_reaches_error_but_not_meta_body() {
        let logger = CapturingLogger::default();
        let adapter = adapter(
            AdapterConfig {
                body_keys: Some(vec!["testKeyA".into()]),
                ..config()
            },
            &logger,
        );
        let mut ctx = request("PUT", "/test").with_body(json!({"testKeyA": 1}));

        adapter.on_inbound_request(&mut ctx);
        adapter.on_error(&ctx, &std::io::Error::other("conflict"));

        assert!(logger.at(Level::INFO)[0].get("metaBody").is_none());
        assert_eq!(logger.at(Level::ERROR)[0]["params"]["body"], json!({"testKeyA": 1}));
    }

    #[test]
    fn test_request_proxy() {
        let logger = CapturingLogger::default();
        let mut config = config();
        config.outbound.level = Some(Level::WARN);
        let proxy = adapter(config.clone(), &logger).request_proxy().unwrap();
        assert_eq!(proxy.level, Some(Level::WARN));
        assert_eq!(proxy.trace_header_name.as_deref(), Some("x-request-id"));

        config.outbound.enabled = false;
        assert!(adapter(config, &logger).request_proxy().is_none());
    }

    struct Call(Option<Box<dyn FnOnce(Option<&Settlement>) + Send>>);

    impl ResponseEvents for Call {
        type Payload = Settlement;

        fn once_response<F>(&mut self, listener: F)
        where
            F: FnOnce(Option<&Settlement>) + Send + 'static,
        {
            self.0 = Some(Box::new(listener));
        }
    }

    #[test]
    fn test_wrapped_dispatcher_logs_outbound_call() {
        let logger = CapturingLogger::default();
        let adapter = adapter(config(), &logger).with_serializer(|mut record| {
            record.insert("app".into(), json!("api"));
            record
        });
        let client = adapter.wrap_dispatcher(|_: OutboundRequest| Call(None));

        let mut call = client.call(
            OutboundRequest::new("GET")
                .with_header("x-request-id", TRACE_ID)
                .with_url(TargetUrl {
                    protocol: Some("http:".into()),
                    host: Some("users".into()),
                    pathname: Some("/v1".into()),
                    query: None,
                }),
        );
        if let Some(listener) = call.0.take() {
            listener(Some(&Settlement {
                status_code: Some(200),
            }));
        }

        let records = logger.at(Level::INFO);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["log_tag"], json!("outbound_request"));
        assert_eq!(records[0]["requestId"], json!(TRACE_ID));
        assert_eq!(records[1]["log_tag"], json!("inbound_response"));
        assert_eq!(records[1]["duration"], json!(0));
        assert!(records.iter().all(|r| r["app"] == json!("api")));
    }
}
