use serde::{Deserialize, Serialize};

use crate::config::{LatencyTunerBackend, LatencyTunerProfile};

/// Diagnostics snapshot of a [`crate::tuner::LatencyTuner`].
///
/// Latencies are in milliseconds; fields are `None` until the corresponding
/// measurement has been observed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub backend: LatencyTunerBackend,
    pub profile: LatencyTunerProfile,
    /// Stream position in samples.
    pub stream_pos: u64,
    pub niq_latency_ms: Option<f64>,
    pub niq_stalling_ms: Option<f64>,
    pub e2e_latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub target_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Current scaling, `0.0` when none was computed yet.
    pub scaling: f32,
}
