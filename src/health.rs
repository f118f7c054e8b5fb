//! Health-probe classification.

use crate::types::{HealthRoute, RequestContext};

/// Whether `ctx` is a request to one of the configured health routes.
///
/// The request path is taken from [`RequestContext::path`], falling back to the raw
/// [`RequestContext::url`]. Paths are compared exactly, methods case-insensitively.
pub fn is_health(ctx: &RequestContext, routes: &[HealthRoute]) -> bool {
    let Some(path) = ctx.path.as_deref().or(ctx.url.as_deref()) else {
        return false;
    };

    routes
        .iter()
        .any(|route| route.path == path && route.method.eq_ignore_ascii_case(&ctx.method))
}
