//! pushbeam library crate.
//!
//! Push-notification dispatch engine: one delivery loop per registered
//! (app, device) push target, with durable cursors into the event stream
//! and a bounded-retry backoff policy.

pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod pusher;
pub mod stream;

pub use error::{Error, Result};
