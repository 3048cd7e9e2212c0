//! Push-based observability: **outbound data only**, no HTTP server, no
//! incoming requests. Metrics are pushed via structured JSON log lines on an
//! interval, mirroring the teacher's `infrastructure::observability` module.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::{MetricsReporter, RuntimeSnapshot};
