//! Database repositories.

pub mod pusher;

pub use pusher::{PusherRepository, SqlxPusherRepository};
