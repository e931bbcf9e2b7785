//! The deprecated health-check endpoint.
//!
//! Kept for existing deployments; new ones should prefer an uptime probe
//! against the API mount. Body resolution order: configured producer, then
//! static data, then the default `{"status":"pass","timestamp":...}` payload.
//! A panicking producer is an unguarded fault of that request; containment
//! here would change observable behaviour existing callers rely on.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::config::{HealthCheckOptions, HealthCheckSetting, HealthProducer};

/// Default route path for the health check.
pub const DEFAULT_HEALTH_PATH: &str = "/_healthcheck";

/// Build the diagnostics router, or `None` when the feature is disabled.
pub fn router(setting: Option<&HealthCheckSetting>) -> Option<Router> {
    let options = match setting {
        None | Some(HealthCheckSetting::Flag(false)) => return None,
        Some(HealthCheckSetting::Flag(true)) => HealthCheckOptions::default(),
        Some(HealthCheckSetting::Options(options)) => options.clone(),
    };

    let path = options
        .path
        .clone()
        .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_owned());
    let data = options.data;
    let producer = options.producer;

    let handler = move || {
        let data = data.clone();
        let producer = producer.clone();
        async move { Json(resolve_body(producer.as_ref(), data.as_ref())) }
    };

    Some(Router::new().route(&path, get(handler)))
}

fn resolve_body(producer: Option<&HealthProducer>, data: Option<&Value>) -> Value {
    if let Some(producer) = producer {
        return producer();
    }
    if let Some(data) = data {
        return data.clone();
    }
    json!({ "status": "pass", "timestamp": epoch_millis() })
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
