//! Deterministic drift simulation around a [`LatencyTuner`].
//!
//! Time is virtual and counted in receiver frames:
//! - the sender produces `block * (1 + drift)` frames per block into the
//!   network queue (nothing while a stall window is active; the backlog
//!   arrives in one burst when it ends)
//! - the receiver drains `block` frames per block
//! - a queue monitor measures the queue every `metrics_interval` and
//!   publishes through [`SharedLatencyMetrics`]; on a sender the measurement
//!   arrives `feedback_delay` later, like an RTCP report would
//!
//! The tuner's scaling multiplies the drain on a receiver and divides the
//! production on a sender.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use latency_tuner::{
    LatencyMetrics, LatencyReport, LatencyTuner, ResolvedLatencyConfig, SampleSpec,
    SharedLatencyMetrics, TunerRole,
};
use serde::Serialize;

/// Period during which no packets reach the receiver.
#[derive(Clone, Copy, Debug)]
pub struct StallWindow {
    pub start: Duration,
    pub length: Duration,
}

/// Parameters of one simulated session.
#[derive(Clone, Debug)]
pub struct SimParams {
    pub sample_spec: SampleSpec,
    /// Frames per processed block.
    pub block_frames: usize,
    pub duration: Duration,
    /// Sender clock drift relative to the receiver, in parts per million.
    pub drift_ppm: f64,
    /// Queue latency at session start.
    pub initial_latency: Duration,
    /// How often the queue monitor measures; zero means every block.
    pub metrics_interval: Duration,
    /// Added to the queue latency to form end-to-end latency.
    pub device_latency: Duration,
    pub jitter: Duration,
    pub stall: Option<StallWindow>,
    /// Delay of reports back to a sender. Ignored on a receiver.
    pub feedback_delay: Duration,
}

/// Result of one simulated session.
#[derive(Clone, Debug, Serialize)]
pub struct SimOutcome {
    pub drift_ppm: f64,
    pub blocks: u64,
    /// Set when the tuner requested termination.
    pub terminated_at_ms: Option<f64>,
    pub final_scaling: f32,
    pub min_scaling: Option<f32>,
    pub max_scaling: Option<f32>,
    pub final_niq_latency_ms: f64,
    pub underrun_frames: u64,
    pub report: LatencyReport,
}

/// Network queue occupancy, in receiver frames.
#[derive(Debug)]
struct QueueModel {
    occupancy: f64,
    backlog: f64,
    frames_since_packet: u64,
    underrun_frames: u64,
}

impl QueueModel {
    fn new(initial_frames: f64) -> Self {
        Self {
            occupancy: initial_frames,
            backlog: 0.0,
            frames_since_packet: 0,
            underrun_frames: 0,
        }
    }

    fn step(&mut self, block: usize, produce_ratio: f64, drain_ratio: f64, stalled: bool) {
        let block = block as f64;
        let produced = block * produce_ratio;
        if stalled {
            self.backlog += produced;
            self.frames_since_packet += block as u64;
        } else {
            self.occupancy += self.backlog + produced;
            self.backlog = 0.0;
            self.frames_since_packet = 0;
        }

        let drain = block * drain_ratio;
        if self.occupancy >= drain {
            self.occupancy -= drain;
        } else {
            self.underrun_frames += (drain - self.occupancy).round() as u64;
            self.occupancy = 0.0;
        }
    }
}

/// Periodic measurement of the queue, with optional delivery delay.
#[derive(Debug)]
struct QueueMonitor {
    rate: f64,
    interval_frames: u64,
    delay_frames: u64,
    next_due: u64,
    device_latency: Duration,
    jitter: Duration,
    in_flight: VecDeque<(u64, LatencyMetrics)>,
}

impl QueueMonitor {
    fn new(params: &SimParams, role: TunerRole) -> Self {
        let rate = params.sample_spec.sample_rate() as f64;
        let frames = |d: Duration| (d.as_secs_f64() * rate).round() as u64;
        let delay = match role {
            TunerRole::Receiver => Duration::ZERO,
            TunerRole::Sender => params.feedback_delay,
        };
        Self {
            rate,
            interval_frames: frames(params.metrics_interval).max(1),
            delay_frames: frames(delay),
            next_due: 0,
            device_latency: params.device_latency,
            jitter: params.jitter,
            in_flight: VecDeque::new(),
        }
    }

    fn measure(&self, model: &QueueModel) -> LatencyMetrics {
        let niq_latency = Duration::from_secs_f64(model.occupancy / self.rate);
        LatencyMetrics {
            niq_latency,
            niq_stalling: Duration::from_secs_f64(model.frames_since_packet as f64 / self.rate),
            e2e_latency: niq_latency + self.device_latency,
            jitter: self.jitter,
        }
    }

    fn poll(&mut self, pos: u64, model: &QueueModel, slot: &SharedLatencyMetrics) {
        if pos >= self.next_due {
            self.in_flight
                .push_back((pos + self.delay_frames, self.measure(model)));
            self.next_due = pos + self.interval_frames;
        }
        while let Some((due, metrics)) = self.in_flight.front().copied() {
            if due > pos {
                break;
            }
            self.in_flight.pop_front();
            slot.publish(metrics);
        }
    }
}

/// Run one session until its duration elapses or the tuner terminates it.
pub fn run_session(config: &ResolvedLatencyConfig, params: &SimParams) -> Result<SimOutcome> {
    ensure!(params.block_frames > 0, "block size must be positive");

    let mut tuner = LatencyTuner::new(config, &params.sample_spec);
    if let Some(err) = tuner.init_error() {
        return Err(anyhow!(err.clone()).context("latency tuner setup"));
    }

    let rate = params.sample_spec.sample_rate() as f64;
    let to_frames = |d: Duration| d.as_secs_f64() * rate;
    let block = params.block_frames;
    let total_blocks = (to_frames(params.duration) / block as f64).ceil() as u64;
    let drift = 1.0 + params.drift_ppm * 1e-6;
    let stall = params
        .stall
        .map(|w| (to_frames(w.start) as u64, to_frames(w.start + w.length) as u64));

    let slot = SharedLatencyMetrics::shared();
    let mut model = QueueModel::new(to_frames(params.initial_latency));
    let mut monitor = QueueMonitor::new(params, config.role);

    let mut blocks = 0u64;
    let mut terminated_at_ms = None;
    let mut min_scaling: Option<f32> = None;
    let mut max_scaling: Option<f32> = None;

    tracing::debug!(
        drift_ppm = params.drift_ppm,
        total_blocks,
        block_frames = block,
        role = %config.role,
        "simulation start"
    );

    for n in 0..total_blocks {
        let pos = n * block as u64;
        let stalled = stall.is_some_and(|(start, end)| pos >= start && pos < end);

        let scaling = match tuner.scaling() {
            s if s > 0.0 => s as f64,
            _ => 1.0,
        };
        let (produce_ratio, drain_ratio) = match config.role {
            TunerRole::Receiver => (drift, scaling),
            TunerRole::Sender => (drift / scaling, 1.0),
        };
        model.step(block, produce_ratio, drain_ratio, stalled);

        let end = pos + block as u64;
        monitor.poll(end, &model, &slot);
        if let Some(metrics) = slot.take() {
            tuner.write_metrics(&metrics);
        }

        blocks += 1;
        if !tuner.advance_stream(block) {
            let at_ms = end as f64 * 1000.0 / rate;
            tracing::warn!(
                at_ms,
                drift_ppm = params.drift_ppm,
                niq_latency_ms = model.occupancy * 1000.0 / rate,
                "session terminated by latency tuner"
            );
            terminated_at_ms = Some(at_ms);
            break;
        }

        let s = tuner.scaling();
        if s > 0.0 {
            min_scaling = Some(min_scaling.map_or(s, |m| m.min(s)));
            max_scaling = Some(max_scaling.map_or(s, |m| m.max(s)));
        }
    }

    Ok(SimOutcome {
        drift_ppm: params.drift_ppm,
        blocks,
        terminated_at_ms,
        final_scaling: tuner.scaling(),
        min_scaling,
        max_scaling,
        final_niq_latency_ms: model.occupancy * 1000.0 / rate,
        underrun_frames: model.underrun_frames,
        report: tuner.report(),
    })
}

/// Run one session per drift value on worker threads.
///
/// Results come back over a channel and are returned sorted by drift.
pub fn run_sweep(
    config: &ResolvedLatencyConfig,
    params: &SimParams,
    drifts_ppm: &[f64],
) -> Vec<(f64, Result<SimOutcome>)> {
    let config = Arc::new(config.clone());
    let params = Arc::new(params.clone());
    sweep(drifts_ppm, move |drift_ppm| {
        let params = SimParams {
            drift_ppm,
            ..(*params).clone()
        };
        run_session(&config, &params)
    })
}

/// Run `session` once per drift value, one thread each.
///
/// A worker that panics still yields an `Err` entry for its drift value.
fn sweep<T, F>(drifts_ppm: &[f64], session: F) -> Vec<(f64, Result<T>)>
where
    T: Send + 'static,
    F: Fn(f64) -> Result<T> + Send + Sync + 'static,
{
    let session = Arc::new(session);
    let (tx, rx) = crossbeam_channel::unbounded();

    let workers: Vec<_> = drifts_ppm
        .iter()
        .map(|&drift_ppm| {
            let tx = tx.clone();
            let session = Arc::clone(&session);
            let handle = thread::spawn(move || {
                let result = session(drift_ppm);
                if tx.send((drift_ppm, result)).is_err() {
                    tracing::warn!(drift_ppm, "sweep receiver gone, dropping result");
                }
            });
            (drift_ppm, handle)
        })
        .collect();
    drop(tx);

    let mut results: Vec<_> = rx.iter().collect();
    for (drift_ppm, handle) in workers {
        if handle.join().is_err() {
            tracing::error!(drift_ppm, "sweep worker panicked");
            results.push((drift_ppm, Err(anyhow!("session worker panicked"))));
        }
    }
    results.sort_by(|a, b| a.0.total_cmp(&b.0));
    results
}
