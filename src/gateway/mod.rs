//! Push gateway client boundary.
//!
//! A gateway client accepts one notification and attempts delivery. The
//! contract is "returns whether delivery succeeded": transport errors are
//! converted to a failure return by the client itself, never propagated.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Error, Result};

pub use http::HttpPushGateway;

/// The dispatched view of one message event, together with the pusher
/// identity fields the gateway needs to route it to a device.
#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    pub content: serde_json::Value,
    pub app_id: String,
    pub pushkey: String,
    pub app_display_name: String,
    pub device_display_name: String,
}

/// Settings shared by gateway client constructors.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Timeout for a single dispatch attempt.
    pub http_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for one push gateway.
#[async_trait]
pub trait PushGatewayClient: Send + Sync {
    /// Attempt delivery of one notification.
    ///
    /// Never errors: any underlying transport failure is a `false` return.
    async fn dispatch(&self, notification: &PushNotification) -> bool;
}

/// Resolve the gateway client for a registration's `kind`.
///
/// `data` is the registration's opaque configuration blob; only the selected
/// implementation interprets its shape. An unknown `kind` is a configuration
/// error, not silently ignored.
pub fn gateway_for_kind(
    kind: &str,
    data: &serde_json::Value,
    settings: &GatewaySettings,
) -> Result<Arc<dyn PushGatewayClient>> {
    match kind {
        "http" => Ok(Arc::new(HttpPushGateway::new(data, settings)?)),
        other => Err(Error::pusher_config(format!(
            "Unknown pusher kind: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_kind_resolves() {
        let data = serde_json::json!({"url": "https://push.example.org/notify"});
        let client = gateway_for_kind("http", &data, &GatewaySettings::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let data = serde_json::json!({});
        let result = gateway_for_kind("carrier-pigeon", &data, &GatewaySettings::default());
        assert!(matches!(result, Err(Error::PusherConfig(_))));
    }
}
