use axum::{
    extract::State,
    http::{self, StatusCode},
    routing::{get, post},
    Json, Router,
};
use logtap::{
    AccessLogLayer, Adapter, AdapterConfig, BackgroundLogger, HealthRoute, LogRecord,
    TracingLogger,
};
use regex::Regex;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::net::TcpListener;
use tower::{service_fn, util::BoxCloneSyncService, ServiceBuilder, ServiceExt};
use tracing::info;

/// Client for a pretend downstream inventory service, logged through the adapter.
type InventoryClient = BoxCloneSyncService<http::Request<()>, http::Response<Value>, Infallible>;

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_order(
    State(inventory): State<InventoryClient>,
    Json(order): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let sku = order["sku"].as_str().unwrap_or("unknown");
    let request = http::Request::builder()
        .uri(format!("http://inventory.local/v1/stock/{sku}?reserve=1"))
        .body(())
        .unwrap_or_default();

    match inventory.oneshot(request).await {
        Ok(stock) => (
            StatusCode::CREATED,
            Json(json!({ "order": order, "stock": stock.into_body() })),
        ),
        Err(never) => match never {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("logtap=info,demo=info")
        .init();

    let mut config = AdapterConfig::from_env()?;
    if config.health.is_empty() {
        config.health.push(HealthRoute::get("/health"));
    }
    if config.body_keys.is_none() {
        config.body_keys = Some(vec!["sku".into(), "quantity".into()]);
    }
    if config.headers_regex.is_none() {
        config.headers_regex = Some(Regex::new("^x-(tenant|client)-")?);
    }
    if config.trace_header_name.is_none() {
        config.trace_header_name = Some("x-request-id".into());
    }

    let adapter = Adapter::new(config, BackgroundLogger::spawn(TracingLogger)).with_context(|ctx| {
        let mut fields = LogRecord::new();
        fields.insert("service".into(), json!("orders"));
        fields.insert("userAgent".into(), json!(ctx.header("user-agent")));
        fields
    });

    let inventory = ServiceBuilder::new()
        .layer(adapter.outbound_layer())
        .service(service_fn(|request: http::Request<()>| async move {
            let sku = request.uri().path().rsplit('/').next().unwrap_or_default().to_owned();
            Ok::<_, Infallible>(http::Response::new(json!({ "sku": sku, "available": 12 })))
        }));

    let app = Router::new()
        .route("/health", get(health))
        .route("/orders", post(create_order))
        .with_state(BoxCloneSyncService::new(inventory))
        .layer(AccessLogLayer::new(adapter));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    info!("Listening on http://127.0.0.1:3000");
    info!("Try: curl -X POST localhost:3000/orders -H 'content-type: application/json' -H 'x-request-id: demo-1' -d '{{\"sku\":\"A-1\",\"quantity\":2}}'");

    axum::serve(listener, app).await?;
    Ok(())
}
