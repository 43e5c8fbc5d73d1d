//! Frequency estimator: turns a latency error into a rate correction.
//!
//! The error (actual minus target latency, in samples) is smoothed by up to two
//! cascaded decimation stages and then fed to a PI controller. The controller
//! output is held between decimated samples, so the coefficient changes at most
//! once per `factor1 * factor2` updates.

use crate::config::LatencyTunerProfile;
use crate::error::FreqEstimatorError;

/// Largest accepted decimation factor per stage.
pub const MAX_DECIMATION_FACTOR: usize = 20;

/// Controller gains and smoothing for one profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreqEstimatorConfig {
    /// Proportional gain, per sample of error.
    pub p: f64,
    /// Integral gain, per sample of accumulated error.
    pub i: f64,
    /// First decimation stage; 0 or 1 disables it.
    pub decimation_factor1: usize,
    /// Second decimation stage; 0 or 1 disables it.
    pub decimation_factor2: usize,
}

impl FreqEstimatorConfig {
    /// Gains for a tuning profile. `Intact` and `Default` have no estimator.
    pub fn for_profile(profile: LatencyTunerProfile) -> Result<Self, FreqEstimatorError> {
        match profile {
            LatencyTunerProfile::Responsive => Ok(Self {
                p: 1e-6,
                i: 1e-10,
                decimation_factor1: 10,
                decimation_factor2: 0,
            }),
            LatencyTunerProfile::Gradual => Ok(Self {
                p: 1e-6,
                i: 5e-9,
                decimation_factor1: MAX_DECIMATION_FACTOR,
                decimation_factor2: MAX_DECIMATION_FACTOR,
            }),
            other => Err(FreqEstimatorError::UnsupportedProfile(other)),
        }
    }
}

/// Block-averaging decimator: emits the mean of every `factor` inputs.
#[derive(Debug)]
struct Decimator {
    factor: usize,
    sum: f64,
    count: usize,
}

impl Decimator {
    fn new(factor: usize) -> Self {
        Self {
            factor,
            sum: 0.0,
            count: 0,
        }
    }

    fn push(&mut self, value: f64) -> Option<f64> {
        if self.factor <= 1 {
            return Some(value);
        }
        self.sum += value;
        self.count += 1;
        if self.count < self.factor {
            return None;
        }
        let mean = self.sum / self.factor as f64;
        self.sum = 0.0;
        self.count = 0;
        Some(mean)
    }
}

/// PI controller over a decimated latency error.
#[derive(Debug)]
pub struct FreqEstimator {
    config: FreqEstimatorConfig,
    stage1: Decimator,
    stage2: Decimator,
    accum: f64,
    coeff: f64,
}

impl FreqEstimator {
    pub fn new(config: FreqEstimatorConfig) -> Result<Self, FreqEstimatorError> {
        if !config.p.is_finite() || !config.i.is_finite() {
            return Err(FreqEstimatorError::NonFiniteGain {
                p: config.p,
                i: config.i,
            });
        }
        for factor in [config.decimation_factor1, config.decimation_factor2] {
            if factor > MAX_DECIMATION_FACTOR {
                return Err(FreqEstimatorError::DecimationFactor {
                    factor,
                    max: MAX_DECIMATION_FACTOR,
                });
            }
        }
        Ok(Self {
            config,
            stage1: Decimator::new(config.decimation_factor1),
            stage2: Decimator::new(config.decimation_factor2),
            accum: 0.0,
            coeff: 1.0,
        })
    }

    pub fn for_profile(profile: LatencyTunerProfile) -> Result<Self, FreqEstimatorError> {
        Self::new(FreqEstimatorConfig::for_profile(profile)?)
    }

    /// Feed one latency error (samples) and return the current coefficient.
    ///
    /// Positive errors (latency above target) push the coefficient above 1.0.
    pub fn update(&mut self, error: i64) -> f32 {
        let filtered = self
            .stage1
            .push(error as f64)
            .and_then(|v| self.stage2.push(v));
        if let Some(err) = filtered {
            self.accum += err;
            self.coeff = 1.0 + self.config.p * err + self.config.i * self.accum;
        }
        self.coeff as f32
    }
}
