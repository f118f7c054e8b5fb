//! Request body capture.
//!
//! Field selection needs the parsed body before the handler runs, so the body is buffered,
//! parsed as JSON and handed back to the handler as an equivalent body.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use http_body_util::BodyExt;
use serde_json::Value;
use tracing::{debug, error};

/// Buffer the body of `request` and parse it as JSON.
///
/// Returns the request with a replayable body, plus the parsed value when the body is valid
/// JSON. A body that fails mid-stream is handed back as a body yielding the chunks received so
/// far and then the same error.
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use logtap::body::capture_json;
///
/// # async fn example() {
/// let request = axum::http::Request::post("/users")
///     .body(Body::from(r#"{"userId":"u1"}"#))
///     .unwrap();
/// let (request, parsed) = capture_json(request).await;
/// assert_eq!(parsed.unwrap()["userId"], "u1");
/// # let _ = request;
/// # }
/// ```
pub async fn capture_json(request: Request) -> (Request, Option<Value>) {
    let (parts, mut body) = request.into_parts();
    let mut chunks: Vec<Bytes> = Vec::new();

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    chunks.push(data);
                }
            }
            Err(e) => {
                error!(error = %e, "Stream error during body capture");
                let replay = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(Ok::<Bytes, axum::Error>)
                        .chain(std::iter::once(Err(e))),
                );
                return (Request::from_parts(parts, Body::from_stream(replay)), None);
            }
        }
    }

    let bytes = Bytes::from(chunks.concat());
    let parsed = if bytes.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Request body is not JSON");
                None
            }
        }
    };
    (Request::from_parts(parts, Body::from(bytes)), parsed)
}
