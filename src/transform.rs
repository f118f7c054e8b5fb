//! Event-to-record transformers for the inbound request, the outbound response and unexpected
//! errors.
//!
//! These are pure functions of the request context and configuration; emitting the record is
//! the caller's job (see [`crate::Adapter`]).

use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::time::SystemTime;

use crate::clock::{duration_value, elapsed_ms};
use crate::health::is_health;
use crate::select::{select_body, select_headers};
use crate::types::{opt_value, HealthRoute, LogRecord, LogTag, RequestContext};

/// Key of the selected-headers group.
pub const META_HEADERS: &str = "metaHeaders";
/// Key of the selected-body group.
pub const META_BODY: &str = "metaBody";

/// Record for an incoming request.
///
/// Health probes get `{..log_ctx, log_tag}` with no field selection. Every other request gets
/// `metaHeaders` (possibly empty) and, for POST bodies with at least one allow-listed key,
/// `metaBody`.
pub fn inbound_request(
    ctx: &RequestContext,
    health: &[HealthRoute],
    body_keys: Option<&[String]>,
    headers_regex: Option<&Regex>,
) -> LogRecord {
    let mut record = ctx.log_ctx.clone();

    if is_health(ctx, health) {
        record.insert(LogTag::FIELD.into(), LogTag::InboundRequestHealth.into());
        return record;
    }

    let meta_headers = select_headers(ctx.headers.as_ref(), headers_regex);
    record.insert(META_HEADERS.into(), Value::Object(meta_headers));

    if let Some(meta_body) = select_body(&ctx.method, ctx.body.as_ref(), body_keys) {
        record.insert(META_BODY.into(), Value::Object(meta_body));
    }

    record.insert(LogTag::FIELD.into(), LogTag::InboundRequest.into());
    record
}

/// Record for the response about to be sent, with `duration` measured up to `now`.
///
/// For regular requests `status` and `duration` come first so that caller-enriched fields win
/// on collision; health probes append them after the tag instead.
pub fn outbound_response(ctx: &RequestContext, health: &[HealthRoute], now: SystemTime) -> LogRecord {
    let status = ctx.status.map_or(Value::Null, Value::from);
    let duration = duration_value(elapsed_ms(ctx.started_at, now));

    if is_health(ctx, health) {
        let mut record = ctx.log_ctx.clone();
        record.insert(LogTag::FIELD.into(), LogTag::OutboundResponseHealth.into());
        record.insert("status".into(), status);
        record.insert("duration".into(), duration);
        return record;
    }

    let mut record = LogRecord::new();
    record.insert("status".into(), status);
    record.insert("duration".into(), duration);
    record.extend(ctx.log_ctx.clone());
    record.insert(LogTag::FIELD.into(), LogTag::OutboundResponse.into());
    record
}

/// Record for an unexpected error raised while handling `ctx`.
///
/// Stable identity fields go under `context`, variable request payload under `params`.
pub fn error(ctx: &RequestContext, err: &(dyn Error + 'static)) -> LogRecord {
    let mut params = LogRecord::new();
    params.insert("query".into(), opt_value(ctx.query.as_deref()));
    params.insert("body".into(), ctx.body.clone().unwrap_or(Value::Null));
    params.insert(LogTag::FIELD.into(), LogTag::UnexpectedError.into());

    let mut record = LogRecord::new();
    record.insert("message".into(), Value::String(err.to_string()));
    record.insert("context".into(), Value::Object(ctx.log_ctx.clone()));
    record.insert("params".into(), Value::Object(params));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use serde_json::json;

    fn health() -> Vec<HealthRoute> {
        vec![HealthRoute::get("/"), HealthRoute::get("/health")]
    }

    fn log_ctx(fields: Value) -> LogRecord {
        match fields {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn keys(record: &LogRecord) -> Vec<&str> {
        record.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_inbound_without_pattern_has_empty_meta_headers() {
        let mut ctx = RequestContext::new("GET", "/test").with_header("test_user_id_header", "u1");
        ctx.log_ctx = log_ctx(json!({"userId": "u1", "method": "GET"}));

        let record = inbound_request(&ctx, &health(), None, None);
        assert_eq!(
            Value::Object(record.clone()),
            json!({"userId": "u1", "method": "GET", "metaHeaders": {}, "log_tag": "inbound_request"})
        );
        assert_eq!(keys(&record), ["userId", "method", "metaHeaders", "log_tag"]);
    }

    #[test]
    fn test_inbound_selects_headers_and_body() {
        let ctx = RequestContext::new("post", "/test")
            .with_header("xx-something", "true")
            .with_header("other", "true")
            .with_body(json!({"testKeyA": true, "hidden": 1}));
        let pattern = Regex::new("^xx-").unwrap();
        let body_keys = vec!["testKeyA".to_string()];

        let record = inbound_request(&ctx, &health(), Some(&body_keys), Some(&pattern));
        assert_eq!(record[META_HEADERS], json!({"headers.xx-something": "true"}));
        assert_eq!(record[META_BODY], json!({"body.testKeyA": true}));
        assert_eq!(keys(&record), ["metaHeaders", "metaBody", "log_tag"]);
    }

    #[test]
    fn test_inbound_omits_meta_body_when_nothing_picked() {
        let ctx = RequestContext::new("POST", "/test").with_body(json!({"other": "ok"}));
        let body_keys = vec!["skills".to_string()];

        let record = inbound_request(&ctx, &health(), Some(&body_keys), None);
        assert!(record.get(META_BODY).is_none());
        assert_eq!(record[LogTag::FIELD], json!("inbound_request"));
    }

    #[test]
    fn test_inbound_health_skips_selection() {
        let mut ctx = RequestContext::new("GET", "/test")
            .with_path("/health")
            .with_header("xx-something", "1")
            .with_body(json!({"testKeyA": true}));
        ctx.log_ctx = log_ctx(json!({"userId": "u1"}));
        let pattern = Regex::new(".*").unwrap();
        let body_keys = vec!["testKeyA".to_string()];

        let record = inbound_request(&ctx, &health(), Some(&body_keys), Some(&pattern));
        assert_eq!(
            Value::Object(record),
            json!({"userId": "u1", "log_tag": "inbound_request_health"})
        );
    }

    #[test]
    fn test_outbound_response_order_and_duration() {
        let clock = FixedClock::at_millis(10_000);
        let mut ctx = RequestContext::new("GET", "/test")
            .with_started_at(FixedClock::at_millis(9_960).now());
        ctx.status = Some(201);
        ctx.log_ctx = log_ctx(json!({"userId": "u1", "duration": "caller"}));

        let record = outbound_response(&ctx, &health(), clock.now());
        assert_eq!(keys(&record), ["status", "duration", "userId", "log_tag"]);
        assert_eq!(record["status"], json!(201));
        // caller-enriched fields win on collision
        assert_eq!(record["duration"], json!("caller"));
        assert_eq!(record[LogTag::FIELD], json!("outbound_response"));

        ctx.log_ctx = log_ctx(json!({"userId": "u1"}));
        let record = outbound_response(&ctx, &health(), clock.now());
        assert_eq!(record["duration"], json!(40));
    }

    #[test]
    fn test_outbound_response_missing_start() {
        let ctx = RequestContext::new("POST", "/test");
        let record = outbound_response(&ctx, &health(), FixedClock::at_millis(1).now());
        assert_eq!(record["status"], Value::Null);
        assert_eq!(record["duration"], Value::Null);
    }

    #[test]
    fn test_outbound_response_health_shape() {
        let mut ctx = RequestContext::new("GET", "/health");
        ctx.status = Some(200);
        ctx.log_ctx = log_ctx(json!({"userId": "u1", "path": "/health"}));

        let record = outbound_response(&ctx, &health(), SystemTime::now());
        assert_eq!(keys(&record), ["userId", "path", "log_tag", "status", "duration"]);
        assert_eq!(record[LogTag::FIELD], json!("outbound_response_health"));
        assert_eq!(record["status"], json!(200));
    }

    #[test]
    fn test_error_record() {
        let mut ctx = RequestContext::new("POST", "/test").with_body(json!({"a": 1}));
        ctx.log_ctx = log_ctx(json!({"userId": "u1", "method": "POST", "query": null}));
        let err = std::io::Error::other("something bad");

        let record = error(&ctx, &err);
        assert_eq!(record["message"], json!("something bad"));
        assert_eq!(
            record["context"],
            json!({"userId": "u1", "method": "POST", "query": null})
        );
        assert_eq!(
            record["params"],
            json!({"query": null, "body": {"a": 1}, "log_tag": "unexpected_error"})
        );
    }
}
