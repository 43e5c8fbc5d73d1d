//! Tuner Sim: drives a latency tuner through a simulated audio session.
//!
//! A virtual sender with a drifting clock fills a network queue that a virtual
//! receiver drains block by block. The latency tuner watches the measured queue
//! (or end-to-end) latency, applies its scaling to the rate correction, and
//! terminates the session when latency leaves the configured bounds.
//!
//! ## Modes
//! - default: run one session and print its outcome.
//! - `--sweep-ppm`: run one session per drift value in parallel.

mod cli;
mod sim;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tuner_sim=info,latency_tuner=info")
        }))
        .init();

    let config = args
        .latency_config()
        .deduce_defaults(args.default_target_latency(), args.role);
    tracing::info!(
        role = %config.role,
        backend = %config.backend,
        profile = %config.profile,
        target_ms = config.target_latency.as_secs_f64() * 1000.0,
        tolerance_ms = config.latency_tolerance.as_secs_f64() * 1000.0,
        stale_ms = config.stale_tolerance.as_secs_f64() * 1000.0,
        "latency config"
    );
    let params = args.sim_params(config.target_latency);

    if let Some(drifts) = &args.sweep_ppm {
        for (drift_ppm, result) in sim::run_sweep(&config, &params, drifts) {
            match result {
                Ok(outcome) => print_outcome(&outcome, args.json)?,
                Err(e) => tracing::error!(drift_ppm, "session failed: {e:#}"),
            }
        }
        return Ok(());
    }

    let outcome = sim::run_session(&config, &params).context("run session")?;
    print_outcome(&outcome, args.json)?;
    if let Some(at_ms) = outcome.terminated_at_ms {
        anyhow::bail!("session terminated at {at_ms:.0} ms: latency out of bounds");
    }
    Ok(())
}

fn print_outcome(outcome: &sim::SimOutcome, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(outcome).context("serialize outcome")?;
        println!("{line}");
        return Ok(());
    }
    tracing::info!(
        drift_ppm = outcome.drift_ppm,
        blocks = outcome.blocks,
        terminated_at_ms = ?outcome.terminated_at_ms,
        final_scaling = outcome.final_scaling,
        min_scaling = ?outcome.min_scaling,
        max_scaling = ?outcome.max_scaling,
        niq_latency_ms = outcome.final_niq_latency_ms,
        underrun_frames = outcome.underrun_frames,
        "session outcome"
    );
    Ok(())
}
