//! Database models.

pub mod pusher;

pub use pusher::PusherDbModel;
