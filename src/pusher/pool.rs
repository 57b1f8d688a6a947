//! Pusher registry.
//!
//! The pool owns the map from `(app_id, pushkey)` to the running delivery
//! loop for that registration, and keeps it consistent with the store: at
//! most one live loop per registration, started from the canonical row.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::models::PusherDbModel;
use crate::database::repositories::PusherRepository;
use crate::gateway::{GatewaySettings, gateway_for_kind};
use crate::pusher::Pusher;
use crate::stream::EventStreamSource;
use crate::Result;

/// A new registration as submitted by a client, before it has a stored row.
#[derive(Debug, Clone)]
pub struct NewPusher {
    pub user_id: String,
    pub kind: String,
    pub app_id: String,
    pub app_display_name: String,
    pub device_display_name: String,
    pub pushkey: String,
    pub data: serde_json::Value,
}

impl NewPusher {
    fn into_db_model(self) -> Result<PusherDbModel> {
        Ok(PusherDbModel {
            app_id: self.app_id,
            pushkey: self.pushkey,
            user_id: self.user_id,
            kind: self.kind,
            app_display_name: self.app_display_name,
            device_display_name: self.device_display_name,
            data: serde_json::to_string(&self.data)?,
            last_stream_token: None,
            last_success_ts: None,
            failing_since_ts: None,
        })
    }
}

struct PusherHandle {
    alive: Arc<AtomicBool>,
}

impl PusherHandle {
    fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Registry of running pushers.
pub struct PusherPool {
    pushers: Mutex<HashMap<String, PusherHandle>>,
    store: Arc<dyn PusherRepository>,
    stream: Arc<dyn EventStreamSource>,
    gateway_settings: GatewaySettings,
    shutdown: CancellationToken,
}

impl PusherPool {
    pub fn new(
        store: Arc<dyn PusherRepository>,
        stream: Arc<dyn EventStreamSource>,
        gateway_settings: GatewaySettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pushers: Mutex::new(HashMap::new()),
            store,
            stream,
            gateway_settings,
            shutdown,
        }
    }

    /// Start a delivery loop for every stored registration.
    ///
    /// A row that no longer constructs (unknown kind, malformed data) is
    /// logged and skipped; it must not prevent the rest from starting.
    pub async fn start(&self) -> Result<()> {
        let rows = self.store.get_all_pushers().await?;
        let mut started = 0usize;
        for row in &rows {
            match self.start_pusher(row) {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!("Skipping pusher {}: {}", row.fullid(), e);
                }
            }
        }
        info!("Started {} pushers", started);
        Ok(())
    }

    /// Validate and persist a new registration, then (re)start its loop.
    ///
    /// Validation happens before the store write, so a bad registration
    /// errors out without leaving a row behind.
    pub async fn add_pusher(&self, new_pusher: NewPusher) -> Result<()> {
        gateway_for_kind(&new_pusher.kind, &new_pusher.data, &self.gateway_settings)?;

        let app_id = new_pusher.app_id.clone();
        let pushkey = new_pusher.pushkey.clone();
        let model = new_pusher.into_db_model()?;
        self.store.add_pusher(&model).await?;

        self.refresh_pusher(&app_id, &pushkey).await
    }

    /// Restart the loop for one registration from its canonical stored row.
    pub async fn refresh_pusher(&self, app_id: &str, pushkey: &str) -> Result<()> {
        let row = self
            .store
            .get_pusher_by_app_id_and_pushkey(app_id, pushkey)
            .await?;
        self.start_pusher(&row)
    }

    /// Stop the loop for one registration and delete its row.
    pub async fn remove_pusher(&self, app_id: &str, pushkey: &str) -> Result<()> {
        let fullid = format!("{}:{}", app_id, pushkey);
        if let Some(old) = self.pushers.lock().remove(&fullid) {
            old.stop();
        }
        self.store.delete_pusher(app_id, pushkey).await
    }

    pub fn pusher_count(&self) -> usize {
        self.pushers.lock().len()
    }

    /// Cancel all in-flight waits and stop every loop.
    pub fn stop(&self) {
        info!("Stopping pusher pool");
        self.shutdown.cancel();
        let mut pushers = self.pushers.lock();
        for (_, handle) in pushers.drain() {
            handle.stop();
        }
    }

    fn start_pusher(&self, row: &PusherDbModel) -> Result<()> {
        let data: serde_json::Value = serde_json::from_str(&row.data)?;
        let pusher = Pusher::new(
            row,
            &data,
            self.store.clone(),
            self.stream.clone(),
            &self.gateway_settings,
            self.shutdown.clone(),
        )?;

        let fullid = row.fullid();
        let handle = PusherHandle {
            alive: pusher.stop_handle(),
        };

        // Stop-then-insert under one lock hold keeps the invariant of at
        // most one live loop per registration.
        let mut pushers = self.pushers.lock();
        if let Some(old) = pushers.remove(&fullid) {
            debug!("Replacing running pusher {}", fullid);
            old.stop();
        }
        tokio::spawn(pusher.run());
        pushers.insert(fullid, handle);
        Ok(())
    }
}
