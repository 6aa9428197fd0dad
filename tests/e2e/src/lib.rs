//! Braid end-to-end test harness
//!
//! - `harness`: isolated pipelines and seeded indexes
//! - `mocks`: scripted adapters, call-counting backends, test data

pub mod harness;
pub mod mocks;
