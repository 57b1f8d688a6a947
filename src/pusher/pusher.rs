//! Per-registration delivery loop.
//!
//! A Pusher owns a single loop: pull the next relevant event at its cursor,
//! attempt dispatch through the gateway client bound at construction, apply
//! the backoff/give-up policy, and persist progress after every transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::database::models::PusherDbModel;
use crate::database::repositories::PusherRepository;
use crate::gateway::{GatewaySettings, PushGatewayClient, PushNotification, gateway_for_kind};
use crate::stream::{EventStreamSource, MessageEvent, StreamEvent, StreamToken};
use crate::Result;

/// First retry delay after a dispatch failure.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Retry delay cap (1 hour).
pub const MAX_BACKOFF_MS: u64 = 3_600_000;

/// Length of a failure streak after which the notification is abandoned
/// (24 hours).
pub const GIVE_UP_AFTER_MS: i64 = 86_400_000;

/// Effectively unbounded long-poll wait.
const LONG_POLL_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The live delivery-loop object for one registered push target.
pub struct Pusher {
    user_id: String,
    app_id: String,
    pushkey: String,
    app_display_name: String,
    device_display_name: String,
    gateway: Arc<dyn PushGatewayClient>,
    store: Arc<dyn PusherRepository>,
    stream: Arc<dyn EventStreamSource>,
    last_token: Option<StreamToken>,
    failing_since: Option<i64>,
    backoff_delay_ms: u64,
    alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Pusher {
    /// Construct a Pusher from a registration snapshot.
    ///
    /// Resolves the gateway client for the registration's `kind` up front:
    /// an unknown kind or malformed `data` fails here with a config error,
    /// and the caller must not retain or start the instance.
    pub fn new(
        model: &PusherDbModel,
        data: &serde_json::Value,
        store: Arc<dyn PusherRepository>,
        stream: Arc<dyn EventStreamSource>,
        settings: &GatewaySettings,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let gateway = gateway_for_kind(&model.kind, data, settings)?;

        Ok(Self {
            user_id: model.user_id.clone(),
            app_id: model.app_id.clone(),
            pushkey: model.pushkey.clone(),
            app_display_name: model.app_display_name.clone(),
            device_display_name: model.device_display_name.clone(),
            gateway,
            store,
            stream,
            last_token: model.last_stream_token.map(StreamToken),
            failing_since: model.failing_since_ts,
            backoff_delay_ms: INITIAL_BACKOFF_MS,
            alive: Arc::new(AtomicBool::new(true)),
            shutdown,
        })
    }

    /// Shared flag for advisory stop: setting it false makes the loop exit
    /// at its next `alive` check, without interrupting an in-flight wait.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }

    /// Run the delivery loop until stopped or the process shuts down.
    pub async fn run(mut self) {
        if let Err(e) = self.deliver_loop().await {
            // Persistence errors are fatal to the pusher, never folded into
            // the dispatch-failure accounting.
            error!(
                "Pusher {}:{} for user {} stopped: {}",
                self.app_id, self.pushkey, self.user_id, e
            );
        }
    }

    async fn deliver_loop(&mut self) -> Result<()> {
        if self.last_token.is_none() {
            // First-time setup: take the current end of stream as the start
            // position, and persist it before polling so a restart resumes
            // from the same place instead of skipping or duplicating.
            let chunk = self
                .stream
                .fetch(&self.user_id, None, Duration::ZERO)
                .await?;
            self.last_token = Some(chunk.end);
            self.store
                .update_pusher_last_token(&self.app_id, &self.pushkey, chunk.end)
                .await?;
            info!(
                "Pusher {} for user {} starting from token {}",
                self.pushkey, self.user_id, chunk.end
            );
        }

        while self.alive.load(Ordering::SeqCst) {
            let chunk = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                chunk = self.stream.fetch(&self.user_id, self.last_token, LONG_POLL_WAIT) => chunk?,
            };

            // A poll may return mixed event types; pick out the one worth
            // a notification, and re-poll from the same cursor if there is
            // none.
            let Some(event) = chunk.events.iter().find_map(StreamEvent::as_message) else {
                continue;
            };

            if !self.alive.load(Ordering::SeqCst) {
                continue;
            }

            let notification = self.notification_for(event);
            if self.gateway.dispatch(&notification).await {
                self.backoff_delay_ms = INITIAL_BACKOFF_MS;
                self.last_token = Some(chunk.end);
                self.store
                    .update_pusher_last_token_and_success(
                        &self.app_id,
                        &self.pushkey,
                        chunk.end,
                        Utc::now().timestamp_millis(),
                    )
                    .await?;
                if self.failing_since.is_some() {
                    self.failing_since = None;
                    self.store
                        .update_pusher_failing_since(&self.app_id, &self.pushkey, None)
                        .await?;
                }
            } else {
                let now = Utc::now().timestamp_millis();
                let failing_since = match self.failing_since {
                    Some(ts) => ts,
                    None => {
                        self.failing_since = Some(now);
                        self.store
                            .update_pusher_failing_since(&self.app_id, &self.pushkey, Some(now))
                            .await?;
                        now
                    }
                };

                if now - failing_since >= GIVE_UP_AFTER_MS {
                    // Skip the unreachable notification permanently so a
                    // recovered gateway isn't flooded with the backlog.
                    warn!(
                        "Giving up on a notification to user {}, pushkey {}",
                        self.user_id, self.pushkey
                    );
                    self.backoff_delay_ms = INITIAL_BACKOFF_MS;
                    self.last_token = Some(chunk.end);
                    self.store
                        .update_pusher_last_token(&self.app_id, &self.pushkey, chunk.end)
                        .await?;
                    self.failing_since = None;
                    self.store
                        .update_pusher_failing_since(&self.app_id, &self.pushkey, None)
                        .await?;
                } else {
                    warn!(
                        "Failed to dispatch push for user {} (failing for {}ms), trying again in {}ms",
                        self.user_id,
                        now - failing_since,
                        self.backoff_delay_ms
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(()),
                        _ = sleep(Duration::from_millis(self.backoff_delay_ms)) => {}
                    }
                    self.backoff_delay_ms = (self.backoff_delay_ms * 2).min(MAX_BACKOFF_MS);
                }
            }
        }

        Ok(())
    }

    fn notification_for(&self, event: &MessageEvent) -> PushNotification {
        PushNotification {
            event_id: event.event_id.clone(),
            room_id: event.room_id.clone(),
            sender: event.sender.clone(),
            content: event.content.clone(),
            app_id: self.app_id.clone(),
            pushkey: self.pushkey.clone(),
            app_display_name: self.app_display_name.clone(),
            device_display_name: self.device_display_name.clone(),
        }
    }
}
