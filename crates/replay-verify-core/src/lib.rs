//! Replay-Verify Core
//!
//! Planning half of a backup replay verification run:
//! - per-environment runner range tables
//! - runner range resolution against the backup's latest version
//! - partitioning into contiguous units of work
//! - run configuration, artifacts, logging and counters

pub mod artifacts;
pub mod config;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod oracle;
pub mod partition;
pub mod ranges;
pub mod resolver;
pub mod telemetry;

pub use artifacts::{clear_artifacts, prepare_partition_dir, PartitionDirs, METADATA_CACHE_DIR};
pub use config::{parse_skip_list, parse_toggle, RetrySettings, VerifyConfig, WorkerSettings};
pub use error::{Result, VerifyError};
pub use metrics::METRICS;
pub use oracle::{DebuggerOracle, FixedOracle, LatestVersionOracle};
pub use partition::{partition, PartitionSpec};
pub use ranges::{Environment, RangeTable, TableRange, VersionRange};
pub use resolver::{resolve, RunnerSelector};
pub use telemetry::init_tracing;
