//! Latency tuner.
//!
//! On a receiver, the queue monitor measures latency locally; on a sender, the
//! feedback monitor receives latency reported by the peer. Either way the
//! measurements reach [`LatencyTuner::write_metrics`], and the audio loop calls
//! [`LatencyTuner::advance_stream`] once per block. The tuner:
//! - selects which latency to watch, depending on the backend
//! - terminates the session (returns `false`) when latency leaves the bounds
//! - computes a scaling factor for the resampler, assuming the difference
//!   between actual and target latency comes from clock drift
//!
//! All positions and latencies are kept in per-channel samples.

use crate::config::{LatencyTunerBackend, LatencyTunerProfile, ResolvedLatencyConfig};
use crate::error::TunerError;
use crate::freq_estimator::FreqEstimator;
use crate::metrics::LatencyMetrics;
use crate::report::LatencyReport;
use crate::sample_spec::SampleSpec;

/// Settings converted to the sample domain.
#[derive(Debug, Default)]
struct Bounds {
    target_latency: i64,
    min_latency: i64,
    max_latency: i64,
    /// Zero when stalling detection is disabled.
    max_stalling: i64,
    update_interval: u64,
    /// Zero when diagnostics are disabled.
    report_interval: u64,
}

/// Feedback controller keeping a stream's latency near its target.
#[derive(Debug)]
pub struct LatencyTuner {
    fe: Option<FreqEstimator>,

    stream_pos: u64,
    update_pos: u64,
    report_pos: u64,

    freq_coeff: f32,
    min_coeff: f32,
    max_coeff: f32,

    backend: LatencyTunerBackend,
    profile: LatencyTunerProfile,

    enable_checking: bool,
    enable_tuning: bool,

    has_niq_latency: bool,
    niq_latency: i64,
    niq_stalling: i64,

    has_e2e_latency: bool,
    e2e_latency: i64,

    has_jitter: bool,
    jitter: i64,

    bounds: Bounds,

    update_count: u64,
    report_count: u64,

    sample_spec: SampleSpec,
    init_error: Option<TunerError>,
}

impl LatencyTuner {
    /// Build a tuner for one session.
    ///
    /// Construction never fails outright; check [`LatencyTuner::is_valid`] before
    /// starting the session.
    pub fn new(config: &ResolvedLatencyConfig, sample_spec: &SampleSpec) -> Self {
        let (bounds, fe, init_error) = match setup(config, sample_spec) {
            Ok((bounds, fe)) => (bounds, fe, None),
            Err(err) => {
                tracing::error!(
                    backend = %config.backend,
                    profile = %config.profile,
                    role = %config.role,
                    "latency tuner: invalid config: {err}"
                );
                (Bounds::default(), None, Some(err))
            }
        };
        let valid = init_error.is_none();

        let enable_checking = valid && config.checking_enabled();
        let enable_tuning = valid && fe.is_some();

        if valid {
            tracing::debug!(
                backend = %config.backend,
                profile = %config.profile,
                role = %config.role,
                target_ms = sample_spec.samples_to_millis(bounds.target_latency),
                min_ms = sample_spec.samples_to_millis(bounds.min_latency),
                max_ms = sample_spec.samples_to_millis(bounds.max_latency),
                stale_ms = sample_spec.samples_to_millis(bounds.max_stalling),
                update_interval = bounds.update_interval,
                scaling_tolerance = config.scaling_tolerance,
                checking = enable_checking,
                tuning = enable_tuning,
                "latency tuner initialized"
            );
        }

        Self {
            fe,
            stream_pos: 0,
            update_pos: 0,
            report_pos: 0,
            freq_coeff: 0.0,
            min_coeff: 1.0 - config.scaling_tolerance,
            max_coeff: 1.0 + config.scaling_tolerance,
            backend: config.backend,
            profile: config.profile,
            enable_checking,
            enable_tuning,
            has_niq_latency: false,
            niq_latency: 0,
            niq_stalling: 0,
            has_e2e_latency: false,
            e2e_latency: 0,
            has_jitter: false,
            jitter: 0,
            bounds,
            update_count: 0,
            report_count: 0,
            sample_spec: *sample_spec,
            init_error,
        }
    }

    /// Whether construction succeeded. An invalid tuner must not drive a session.
    pub fn is_valid(&self) -> bool {
        self.init_error.is_none()
    }

    /// Why construction failed, if it did.
    pub fn init_error(&self) -> Option<&TunerError> {
        self.init_error.as_ref()
    }

    /// Store new metrics for the next update.
    ///
    /// A measurement is taken into account once it has been non-zero at least
    /// once; after that every write replaces it, zeros included.
    pub fn write_metrics(&mut self, metrics: &LatencyMetrics) {
        let spec = self.sample_spec;

        if self.has_niq_latency || !metrics.niq_latency.is_zero() || !metrics.niq_stalling.is_zero()
        {
            self.niq_latency = spec.duration_to_samples_saturating(metrics.niq_latency);
            self.niq_stalling = spec.duration_to_samples_saturating(metrics.niq_stalling);
            self.has_niq_latency = true;
        }

        if self.has_e2e_latency || !metrics.e2e_latency.is_zero() {
            self.e2e_latency = spec.duration_to_samples_saturating(metrics.e2e_latency);
            self.has_e2e_latency = true;
        }

        if self.has_jitter || !metrics.jitter.is_zero() {
            self.jitter = spec.duration_to_samples_saturating(metrics.jitter);
            self.has_jitter = true;
        }
    }

    /// Advance the stream by `n_samples` per-channel samples.
    ///
    /// Runs the update step every scaling interval and the diagnostics report
    /// every report interval. Returns `false` when latency went out of bounds
    /// and the session should be terminated, or when the tuner is invalid.
    pub fn advance_stream(&mut self, n_samples: usize) -> bool {
        if self.init_error.is_some() {
            return false;
        }

        self.stream_pos = self.stream_pos.wrapping_add(n_samples as u64);

        let mut ok = true;

        if self.stream_pos.wrapping_sub(self.update_pos) >= self.bounds.update_interval {
            ok = self.update();
            self.update_pos = self.stream_pos;
        }

        if self.bounds.report_interval != 0
            && self.stream_pos.wrapping_sub(self.report_pos) >= self.bounds.report_interval
        {
            self.emit_report();
            self.report_pos = self.stream_pos;
        }

        ok
    }

    /// Scaling factor for the resampler, close to 1.0.
    ///
    /// Above 1.0 means latency is above target and the consumer should drain
    /// faster. Returns 0.0 until the first scaling was computed; treat that
    /// as "no correction".
    pub fn scaling(&self) -> f32 {
        self.freq_coeff
    }

    /// Number of update steps run so far.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Number of diagnostics reports emitted so far.
    pub fn report_count(&self) -> u64 {
        self.report_count
    }

    /// Snapshot of the current metrics and scaling.
    pub fn report(&self) -> LatencyReport {
        let spec = self.sample_spec;
        let ms = |observed: bool, samples: i64| observed.then(|| spec.samples_to_millis(samples));
        LatencyReport {
            backend: self.backend,
            profile: self.profile,
            stream_pos: self.stream_pos,
            niq_latency_ms: ms(self.has_niq_latency, self.niq_latency),
            niq_stalling_ms: ms(self.has_niq_latency, self.niq_stalling),
            e2e_latency_ms: ms(self.has_e2e_latency, self.e2e_latency),
            jitter_ms: ms(self.has_jitter, self.jitter),
            target_latency_ms: spec.samples_to_millis(self.bounds.target_latency),
            min_latency_ms: spec.samples_to_millis(self.bounds.min_latency),
            max_latency_ms: spec.samples_to_millis(self.bounds.max_latency),
            scaling: self.freq_coeff,
        }
    }

    fn update(&mut self) -> bool {
        self.update_count += 1;

        let latency = match self.backend {
            LatencyTunerBackend::Niq if self.has_niq_latency => self.niq_latency,
            LatencyTunerBackend::E2e if self.has_e2e_latency => self.e2e_latency,
            _ => return true,
        };

        let mut ok = true;
        if self.enable_checking && !self.check_bounds(latency) {
            ok = false;
        }
        if self.enable_tuning {
            self.compute_scaling(latency);
        }
        ok
    }

    fn check_bounds(&self, latency: i64) -> bool {
        if latency >= self.bounds.min_latency && latency <= self.bounds.max_latency {
            return true;
        }

        let spec = self.sample_spec;
        if self.is_stalling() {
            tracing::debug!(
                latency_ms = spec.samples_to_millis(latency),
                stalling_ms = spec.samples_to_millis(self.niq_stalling),
                "latency tuner: out of bounds while queue is stalling"
            );
            return true;
        }

        tracing::error!(
            backend = %self.backend,
            latency_ms = spec.samples_to_millis(latency),
            min_ms = spec.samples_to_millis(self.bounds.min_latency),
            max_ms = spec.samples_to_millis(self.bounds.max_latency),
            "latency tuner: latency out of bounds"
        );
        false
    }

    fn is_stalling(&self) -> bool {
        self.bounds.max_stalling != 0 && self.niq_stalling > self.bounds.max_stalling
    }

    fn compute_scaling(&mut self, latency: i64) {
        let Some(fe) = self.fe.as_mut() else {
            return;
        };
        let raw = fe.update(latency.saturating_sub(self.bounds.target_latency));
        // Non-finite output is treated as neutral.
        let raw = if raw.is_finite() { raw } else { 1.0 };
        self.freq_coeff = raw.clamp(self.min_coeff, self.max_coeff);
    }

    fn emit_report(&mut self) {
        self.report_count += 1;
        let r = self.report();
        tracing::debug!(
            backend = %r.backend,
            profile = %r.profile,
            stream_pos = r.stream_pos,
            niq_latency_ms = ?r.niq_latency_ms,
            niq_stalling_ms = ?r.niq_stalling_ms,
            e2e_latency_ms = ?r.e2e_latency_ms,
            jitter_ms = ?r.jitter_ms,
            target_ms = r.target_latency_ms,
            scaling = r.scaling,
            "latency tuner report"
        );
    }
}

fn setup(
    config: &ResolvedLatencyConfig,
    spec: &SampleSpec,
) -> Result<(Bounds, Option<FreqEstimator>), TunerError> {
    if !spec.is_valid() {
        return Err(TunerError::InvalidSampleSpec {
            sample_rate: spec.sample_rate(),
            channels: spec.channels(),
        });
    }
    if config.backend == LatencyTunerBackend::Default {
        return Err(TunerError::UnresolvedBackend);
    }
    if config.profile == LatencyTunerProfile::Default {
        return Err(TunerError::UnresolvedProfile);
    }
    if !config.backend_supported() {
        return Err(TunerError::UnsupportedBackend {
            backend: config.backend,
            role: config.role,
        });
    }
    let tolerance = config.scaling_tolerance;
    if !(tolerance.is_finite() && tolerance > 0.0 && tolerance < 1.0) {
        return Err(TunerError::ScalingTolerance(tolerance));
    }

    let samples = |d, field| {
        spec.duration_to_samples(d)
            .ok_or(TunerError::Unrepresentable { field })
    };

    let target_latency = samples(config.target_latency, "target latency")?;
    let latency_tolerance = samples(config.latency_tolerance, "latency tolerance")?;
    let max_stalling = samples(config.stale_tolerance, "stale tolerance")?;
    let update_interval = samples(config.scaling_interval, "scaling interval")?;
    let report_interval = samples(config.report_interval, "report interval")?;

    if update_interval == 0 {
        return Err(TunerError::ScalingInterval);
    }

    let max_latency = target_latency
        .checked_add(latency_tolerance)
        .ok_or(TunerError::Unrepresentable {
            field: "target latency + tolerance",
        })?;

    let fe = if config.tuning_enabled() {
        Some(FreqEstimator::for_profile(config.profile)?)
    } else {
        None
    };

    Ok((
        Bounds {
            target_latency,
            min_latency: target_latency - latency_tolerance,
            max_latency,
            max_stalling,
            update_interval: update_interval as u64,
            report_interval: report_interval as u64,
        },
        fe,
    ))
}
