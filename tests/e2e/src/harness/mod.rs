//! Test harness

mod index_manager;
mod pipeline;

pub use index_manager::TestIndexManager;
pub use pipeline::{TestPipeline, TEST_DIMENSIONS, TEST_TIMEOUT_MS};
