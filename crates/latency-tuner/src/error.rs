//! Error types for tuner setup.
//!
//! Nothing here crosses [`crate::tuner::LatencyTuner`]'s runtime API: setup
//! failures mark the tuner invalid and runtime failures are reported as `false`
//! from `advance_stream`. These types exist for logging and for callers that
//! want to tell setup failures apart.

use thiserror::Error;

use crate::config::{LatencyTunerBackend, LatencyTunerProfile, TunerRole};

/// Failure to parse a backend, profile, or role name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseSettingError {
    #[error("unknown latency tuner backend: {0:?} (expected default, niq, e2e)")]
    Backend(String),
    #[error("unknown latency tuner profile: {0:?} (expected default, intact, responsive, gradual)")]
    Profile(String),
    #[error("unknown tuner role: {0:?} (expected receiver, sender)")]
    Role(String),
}

/// Rejected frequency estimator settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FreqEstimatorError {
    #[error("no frequency estimator for profile {0}")]
    UnsupportedProfile(LatencyTunerProfile),
    #[error("frequency estimator gains must be finite (p={p}, i={i})")]
    NonFiniteGain { p: f64, i: f64 },
    #[error("decimation factor {factor} exceeds maximum {max}")]
    DecimationFactor { factor: usize, max: usize },
}

/// Reason a [`crate::tuner::LatencyTuner`] was constructed invalid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TunerError {
    #[error("invalid sample spec: rate={sample_rate} channels={channels}")]
    InvalidSampleSpec { sample_rate: u32, channels: u16 },
    #[error("latency tuner backend was not resolved")]
    UnresolvedBackend,
    #[error("latency tuner profile was not resolved")]
    UnresolvedProfile,
    #[error("latency tuner backend {backend} is not supported on {role}")]
    UnsupportedBackend {
        backend: LatencyTunerBackend,
        role: TunerRole,
    },
    #[error("{field} is not representable in samples")]
    Unrepresentable { field: &'static str },
    #[error("scaling interval must be at least one sample")]
    ScalingInterval,
    #[error("scaling tolerance must be in (0, 1), got {0}")]
    ScalingTolerance(f32),
    #[error("frequency estimator: {0}")]
    FreqEstimator(#[from] FreqEstimatorError),
}
