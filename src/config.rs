//! Adapter configuration.
//!
//! [`AdapterConfig`] is a plain struct with defaults; [`AdapterConfig::from_env`] fills it from
//! `LOGTAP_*` environment variables for services configured through their environment.
//!
//! | Variable | Format | Default |
//! |----------|--------|---------|
//! | `LOGTAP_HEALTH` | comma-separated `METHOD /path` (method optional, `GET`) | `GET /health,GET /` |
//! | `LOGTAP_BODY_KEYS` | comma-separated body keys | unset |
//! | `LOGTAP_HEADERS_REGEX` | regular expression over header names, case-insensitive | unset |
//! | `LOGTAP_TRACE_HEADER` | header name | unset |
//! | `LOGTAP_INBOUND_LEVEL` | `error`, `warn`, `info`, `debug`, `trace` | `info` |
//! | `LOGTAP_OUTBOUND_LEVEL` | a level, or `off` | `info` |
//! | `LOGTAP_OUTBOUND_ENABLED` | `true`/`false`/`1`/`0`/`yes`/`no`/`on` | `true` |

use regex::{Regex, RegexBuilder};
use std::env;
use tracing::Level;

use crate::error::ConfigError;
use crate::types::HealthRoute;

/// Inbound hook settings.
#[derive(Debug, Clone)]
pub struct InboundConfig {
    /// Level of `inbound_request` and `outbound_response` records
    pub level: Level,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

/// Outbound interception settings.
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    /// Level of `outbound_request` and `inbound_response` records; `None` disables emission
    pub level: Option<Level>,
    /// Whether the adapter hands out an interception config at all
    pub enabled: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            level: Some(Level::INFO),
            enabled: true,
        }
    }
}

/// Adapter configuration.
///
/// # Examples
///
/// ```rust
/// use logtap::{AdapterConfig, HealthRoute};
/// use regex::Regex;
///
/// let config = AdapterConfig {
///     health: vec![HealthRoute::get("/healthz")],
///     body_keys: Some(vec!["userId".into()]),
///     headers_regex: Some(Regex::new("^x-").unwrap()),
///     trace_header_name: Some("x-request-id".into()),
///     ..Default::default()
/// };
/// # let _ = config;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Health-probe routes
    pub health: Vec<HealthRoute>,
    /// Top-level POST body keys copied into `metaBody`
    pub body_keys: Option<Vec<String>>,
    /// Allow-list over header names, copied into `metaHeaders`. Names are matched in their
    /// lowercase form; build the pattern with [`parse_header_pattern`] to ignore case.
    pub headers_regex: Option<Regex>,
    /// Header carrying the request id
    pub trace_header_name: Option<String>,
    pub inbound: InboundConfig,
    pub outbound: OutboundConfig,
}

impl AdapterConfig {
    /// Load configuration from `LOGTAP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let health = parse_health_routes(&env_or("LOGTAP_HEALTH", "GET /health,GET /"))?;

        let body_keys = env_opt("LOGTAP_BODY_KEYS").map(|keys| parse_list(&keys));

        let headers_regex = env_opt("LOGTAP_HEADERS_REGEX")
            .map(|pattern| parse_header_pattern(&pattern))
            .transpose()?;

        let inbound_level = parse_level(
            "LOGTAP_INBOUND_LEVEL",
            &env_or("LOGTAP_INBOUND_LEVEL", "info"),
        )?;

        let outbound_level = match env_or("LOGTAP_OUTBOUND_LEVEL", "info").as_str() {
            "off" | "none" => None,
            level => Some(parse_level("LOGTAP_OUTBOUND_LEVEL", level)?),
        };

        Ok(Self {
            health,
            body_keys,
            headers_regex,
            trace_header_name: env_opt("LOGTAP_TRACE_HEADER"),
            inbound: InboundConfig {
                level: inbound_level,
            },
            outbound: OutboundConfig {
                level: outbound_level,
                enabled: env_bool("LOGTAP_OUTBOUND_ENABLED", true),
            },
        })
    }
}

/// Parse a comma-separated list of `METHOD /path` entries. A bare path means `GET`.
pub fn parse_health_routes(value: &str) -> Result<Vec<HealthRoute>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split_whitespace().collect();
            match parts.as_slice() {
                [path] => Ok(HealthRoute::get(*path)),
                [method, path] => Ok(HealthRoute::new(*path, method.to_uppercase())),
                _ => Err(ConfigError::invalid(
                    "LOGTAP_HEALTH",
                    format!("expected `METHOD /path`, got `{}`", entry),
                )),
            }
        })
        .collect()
}

/// Compile a header allow-list pattern that ignores case, so `^X-Tenant` matches the
/// lowercase `x-tenant` a `HeaderMap` stores.
pub fn parse_header_pattern(value: &str) -> Result<Regex, ConfigError> {
    Ok(RegexBuilder::new(value).case_insensitive(true).build()?)
}

/// Split a comma-separated list, dropping empty entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse a level name, case-insensitively.
pub fn parse_level(key: &str, value: &str) -> Result<Level, ConfigError> {
    value
        .trim()
        .parse::<Level>()
        .map_err(|_| ConfigError::invalid(key, format!("unknown level `{}`", value)))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
