//! Braid Server
//!
//! HTTP query entrypoint and shared wiring for the `braid-server` and `braid`
//! binaries.

pub mod api;
pub mod telemetry;
