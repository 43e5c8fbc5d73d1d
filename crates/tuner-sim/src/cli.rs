use std::time::Duration;

use clap::Parser;
use latency_tuner::{
    LatencyConfig, LatencySetting, LatencyTunerBackend, LatencyTunerProfile, SampleSpec, TunerRole,
};

use crate::sim::{SimParams, StallWindow};

#[derive(Parser, Debug)]
#[command(name = "tuner-sim", version)]
pub struct Args {
    /// Side running the tuner: receiver or sender
    #[arg(long, default_value = "receiver")]
    pub role: TunerRole,

    /// Latency to tune: default, niq, e2e
    #[arg(long, default_value = "default")]
    pub backend: LatencyTunerBackend,

    /// Tuning profile: default, intact, responsive, gradual
    #[arg(long, default_value = "default")]
    pub profile: LatencyTunerProfile,

    /// Target latency in ms (negative => default, 0 => tuning disabled)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub target_latency_ms: i64,

    /// Target latency used when --target-latency-ms is negative
    #[arg(long, default_value_t = 200)]
    pub default_target_latency_ms: u64,

    /// Maximum deviation from target in ms (negative => default, 0 => no bounds checks)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub latency_tolerance_ms: i64,

    /// Stalling threshold in ms (negative => default, 0 => never stalling)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub stale_tolerance_ms: i64,

    /// Scaling update interval in ms
    #[arg(long, default_value_t = 5)]
    pub scaling_interval_ms: u64,

    /// Maximum deviation of scaling from 1.0
    #[arg(long, default_value_t = 0.005)]
    pub scaling_tolerance: f32,

    /// Diagnostics interval in ms (0 => off)
    #[arg(long, default_value_t = 5000)]
    pub report_interval_ms: u64,

    /// Stream sample rate in Hz
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,

    /// Stream channel count
    #[arg(long, default_value_t = 2)]
    pub channels: u16,

    /// Frames per processed block
    #[arg(long, default_value_t = 480)]
    pub block_frames: usize,

    /// Simulated session length in seconds
    #[arg(long, default_value_t = 60.0)]
    pub duration_secs: f64,

    /// Sender clock drift in ppm (positive => sender runs fast)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub drift_ppm: f64,

    /// Queue latency at start in ms (defaults to the resolved target)
    #[arg(long)]
    pub initial_latency_ms: Option<u64>,

    /// Queue monitor measurement interval in ms (0 => every block)
    #[arg(long, default_value_t = 10)]
    pub metrics_interval_ms: u64,

    /// Playback device latency added to form end-to-end latency, in ms
    #[arg(long, default_value_t = 20)]
    pub device_latency_ms: u64,

    /// Reported interarrival jitter in ms
    #[arg(long, default_value_t = 1)]
    pub jitter_ms: u64,

    /// Start of a network stall, in seconds from session start
    #[arg(long)]
    pub stall_at_secs: Option<f64>,

    /// Length of the network stall in ms
    #[arg(long, default_value_t = 100)]
    pub stall_ms: u64,

    /// Delay of latency reports back to a sender, in ms
    #[arg(long, default_value_t = 50)]
    pub feedback_delay_ms: u64,

    /// Run one session per drift value (comma separated ppm) in parallel
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub sweep_ppm: Option<Vec<f64>>,

    /// Print outcomes as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Args {
    pub fn default_target_latency(&self) -> Duration {
        Duration::from_millis(self.default_target_latency_ms)
    }

    pub fn latency_config(&self) -> LatencyConfig {
        LatencyConfig {
            tuner_backend: self.backend,
            tuner_profile: self.profile,
            target_latency: LatencySetting::from_millis(self.target_latency_ms),
            latency_tolerance: LatencySetting::from_millis(self.latency_tolerance_ms),
            stale_tolerance: LatencySetting::from_millis(self.stale_tolerance_ms),
            scaling_interval: Duration::from_millis(self.scaling_interval_ms),
            scaling_tolerance: self.scaling_tolerance,
            report_interval: Duration::from_millis(self.report_interval_ms),
        }
    }

    /// Simulation parameters; `target` is the resolved target latency.
    pub fn sim_params(&self, target: Duration) -> SimParams {
        let initial_latency = match self.initial_latency_ms {
            Some(ms) => Duration::from_millis(ms),
            None if !target.is_zero() => target,
            None => self.default_target_latency(),
        };
        SimParams {
            sample_spec: SampleSpec::new(self.sample_rate, self.channels),
            block_frames: self.block_frames,
            duration: Duration::from_secs_f64(self.duration_secs.max(0.0)),
            drift_ppm: self.drift_ppm,
            initial_latency,
            metrics_interval: Duration::from_millis(self.metrics_interval_ms),
            device_latency: Duration::from_millis(self.device_latency_ms),
            jitter: Duration::from_millis(self.jitter_ms),
            stall: self.stall_at_secs.map(|at| StallWindow {
                start: Duration::from_secs_f64(at.max(0.0)),
                length: Duration::from_millis(self.stall_ms),
            }),
            feedback_delay: Duration::from_millis(self.feedback_delay_ms),
        }
    }
}
