#![allow(dead_code)]

pub use goalwork_test_utils::builders::{JobConfigBuilder, PlanFileBuilder};
pub use goalwork_test_utils::manual::ManualHandle;
pub use goalwork_test_utils::recorder::Recorder;
pub use goalwork_test_utils::{eventually, init_tracing, with_timeout};

use std::time::Duration;

/// Default step used by plan tests.
pub const STEP: &str = "5ms";

pub async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
