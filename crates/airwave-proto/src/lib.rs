//! Types shared by the airwave station daemon: configuration, catalog,
//! playback order and the on-air state snapshot.

pub mod catalog;
pub mod config;
pub mod order;
pub mod platform;
pub mod protocol;
pub mod state;
