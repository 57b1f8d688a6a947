//! Push-notification dispatch engine.
//!
//! One [`Pusher`] delivery loop per registered (app, device) push target,
//! managed by the [`PusherPool`] registry.

pub mod pool;
pub mod pusher;

pub use pool::{NewPusher, PusherPool};
pub use pusher::Pusher;
