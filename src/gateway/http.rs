//! HTTP push gateway client.
//!
//! Delivers notifications with a JSON POST to the gateway URL carried in
//! the registration's `data` blob.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{GatewaySettings, PushGatewayClient, PushNotification};
use crate::{Error, Result};

/// HTTP push gateway client.
pub struct HttpPushGateway {
    url: String,
    client: Client,
}

impl HttpPushGateway {
    /// Build a client from the registration's `data` blob.
    ///
    /// The blob must carry a string `url` field; anything else is a
    /// configuration error surfaced at pusher construction.
    pub fn new(data: &serde_json::Value, settings: &GatewaySettings) -> Result<Self> {
        let url = data
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::pusher_config("'url' required in data for an http pusher")
            })?;

        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .unwrap_or_default();

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    fn build_payload(&self, notification: &PushNotification) -> serde_json::Value {
        json!({
            "notification": {
                "event_id": notification.event_id,
                "room_id": notification.room_id,
                "sender": notification.sender,
                "content": notification.content,
                "devices": [{
                    "app_id": notification.app_id,
                    "pushkey": notification.pushkey,
                    "app_display_name": notification.app_display_name,
                    "device_display_name": notification.device_display_name,
                }],
            }
        })
    }
}

#[async_trait]
impl PushGatewayClient for HttpPushGateway {
    async fn dispatch(&self, notification: &PushNotification) -> bool {
        let payload = self.build_payload(notification);

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    "Pushed event {} to gateway {}",
                    notification.event_id, self.url
                );
                true
            }
            Ok(response) => {
                warn!(
                    "Push gateway {} returned {} for event {}",
                    self.url,
                    response.status(),
                    notification.event_id
                );
                false
            }
            Err(e) => {
                warn!("Push gateway request to {} failed: {}", self.url, e);
                false
            }
        }
    }
}
