//! Global runtime settings
//!
//! Defaults for every pipeline; a pipeline section may override
//! `workers` and `buffer_capacity`.

use std::time::Duration;

use serde::Deserialize;

/// Runtime settings shared by all pipelines
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Processor workers per pipeline
    /// Default: number of CPU cores
    pub workers: usize,

    /// Wait per worker loop iteration for a batch
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Batches held by each pipeline buffer
    /// Default: 512
    pub buffer_capacity: usize,

    /// Bound on one buffer write before the writer retries or fails
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Total time a writer retries a full buffer before the condition is
    /// escalated as fatal
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub buffer_full_timeout: Duration,

    /// Lifetime of an acknowledgement set before it is discarded
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub acknowledgement_expiry: Duration,

    /// How often expired acknowledgement sets are swept
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub expiry_sweep_interval: Duration,

    /// Time workers get to drain the buffer during stop
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Extra time for processors to report ready during stop
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub processor_shutdown_timeout: Duration,

    /// Time given to sink readiness and to sink close
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub sink_shutdown_timeout: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            read_timeout: Duration::from_millis(100),
            buffer_capacity: 512,
            write_timeout: Duration::from_secs(5),
            buffer_full_timeout: Duration::from_secs(60),
            acknowledgement_expiry: Duration::from_secs(30),
            expiry_sweep_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(10),
            processor_shutdown_timeout: Duration::from_secs(10),
            sink_shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
