//! Pusher database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Pusher registration database model.
///
/// A row describes one push target: an installation of an app on a device,
/// identified by `(app_id, pushkey)`, together with the delivery cursor and
/// failure-tracking state its delivery loop persists as it runs.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PusherDbModel {
    pub app_id: String,
    /// Gateway-assigned delivery address for the device.
    pub pushkey: String,
    /// Owning account.
    pub user_id: String,
    /// Selects the push gateway client implementation ("http" is built in).
    pub kind: String,
    pub app_display_name: String,
    pub device_display_name: String,
    /// Opaque kind-specific configuration, JSON text. The engine passes it
    /// through unexamined; only the selected gateway client interprets it.
    pub data: String,
    /// Cursor of the last event successfully processed. NULL until the
    /// delivery loop bootstraps its start position.
    pub last_stream_token: Option<i64>,
    /// Timestamp (ms) of the last successful dispatch. Audit metadata only.
    pub last_success_ts: Option<i64>,
    /// Timestamp (ms) marking the start of a contiguous failure streak.
    /// NULL if and only if the pusher is not currently failing.
    pub failing_since_ts: Option<i64>,
}

impl PusherDbModel {
    /// The composite key used for pool deduplication.
    pub fn fullid(&self) -> String {
        format!("{}:{}", self.app_id, self.pushkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullid() {
        let model = PusherDbModel {
            app_id: "com.example.app".to_string(),
            pushkey: "abc123".to_string(),
            user_id: "@alice:example.org".to_string(),
            kind: "http".to_string(),
            app_display_name: "Example".to_string(),
            device_display_name: "Phone".to_string(),
            data: r#"{"url":"https://push.example.org/notify"}"#.to_string(),
            last_stream_token: None,
            last_success_ts: None,
            failing_since_ts: None,
        };
        assert_eq!(model.fullid(), "com.example.app:abc123");
    }
}
