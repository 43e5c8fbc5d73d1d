//! Latency tuning configuration.
//!
//! [`LatencyConfig`] is what the user (or a CLI) fills in; `Default` variants and
//! [`LatencySetting::Unset`] fields are deferred decisions. They are resolved
//! exactly once by [`LatencyConfig::deduce_defaults`] into a
//! [`ResolvedLatencyConfig`], which is the only form the tuner accepts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParseSettingError;

/// Targets below this use the responsive profile by default.
const RESPONSIVE_TARGET_THRESHOLD: Duration = Duration::from_millis(30);
/// Above this target the default tolerance shrinks to half the target.
const WIDE_TOLERANCE_TARGET: Duration = Duration::from_millis(200);
const MIN_LATENCY_TOLERANCE: Duration = Duration::from_millis(10);
const MIN_STALE_TOLERANCE: Duration = Duration::from_millis(10);

/// Which latency the tuner monitors and drives toward the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTunerBackend {
    /// Pick the best backend for the role.
    #[default]
    Default,
    /// Network incoming queue length, measured on the receiver.
    Niq,
    /// End-to-end delay, from capture on the sender to playback on the receiver.
    E2e,
}

/// How aggressively the tuner corrects latency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTunerProfile {
    /// Pick the best profile for the role and target.
    #[default]
    Default,
    /// Never adjust the rate; only bounds are checked.
    Intact,
    /// Fast correction, for low latency and low jitter links.
    Responsive,
    /// Slow, smooth correction, for high latency or jittery links.
    Gradual,
}

/// Which side of the session the tuner runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunerRole {
    Receiver,
    Sender,
}

impl LatencyTunerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Niq => "niq",
            Self::E2e => "e2e",
        }
    }
}

impl LatencyTunerProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Intact => "intact",
            Self::Responsive => "responsive",
            Self::Gradual => "gradual",
        }
    }
}

impl TunerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receiver => "receiver",
            Self::Sender => "sender",
        }
    }
}

impl fmt::Display for LatencyTunerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LatencyTunerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TunerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LatencyTunerBackend {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "niq" => Ok(Self::Niq),
            "e2e" => Ok(Self::E2e),
            _ => Err(ParseSettingError::Backend(s.to_string())),
        }
    }
}

impl FromStr for LatencyTunerProfile {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "intact" => Ok(Self::Intact),
            "responsive" => Ok(Self::Responsive),
            "gradual" => Ok(Self::Gradual),
            _ => Err(ParseSettingError::Profile(s.to_string())),
        }
    }
}

impl FromStr for TunerRole {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receiver" => Ok(Self::Receiver),
            "sender" => Ok(Self::Sender),
            _ => Err(ParseSettingError::Role(s.to_string())),
        }
    }
}

/// A duration setting that may be left to defaults or switched off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LatencySetting {
    /// Use the default derived from the target latency.
    #[default]
    Unset,
    /// Turn the feature controlled by this setting off.
    Disabled,
    /// Explicit positive duration.
    Value(Duration),
}

impl LatencySetting {
    /// Decode the signed-nanoseconds form: negative is unset, zero is disabled.
    pub fn from_nanos(nanos: i64) -> Self {
        match nanos {
            n if n < 0 => Self::Unset,
            0 => Self::Disabled,
            n => Self::Value(Duration::from_nanos(n as u64)),
        }
    }

    /// Same as [`LatencySetting::from_nanos`], in milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            n if n < 0 => Self::Unset,
            0 => Self::Disabled,
            n => Self::Value(Duration::from_millis(n as u64)),
        }
    }

    /// Encode back into signed nanoseconds (`-1` for unset, saturating).
    pub fn as_nanos(&self) -> i64 {
        match self {
            Self::Unset => -1,
            Self::Disabled => 0,
            Self::Value(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    fn resolve(self, default: impl FnOnce() -> Duration) -> Duration {
        match self {
            Self::Unset => default(),
            Self::Disabled => Duration::ZERO,
            Self::Value(d) => d,
        }
    }
}

/// User-facing latency settings for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct LatencyConfig {
    /// Latency to monitor and tune.
    pub tuner_backend: LatencyTunerBackend,
    /// Correction policy.
    pub tuner_profile: LatencyTunerProfile,
    /// Target latency. Disabled turns off both tuning and bounds checks.
    pub target_latency: LatencySetting,
    /// Maximum allowed deviation from target before the session is terminated.
    /// Disabled turns off bounds checks.
    pub latency_tolerance: LatencySetting,
    /// Maximum delay since the last packet before the queue is considered
    /// stalling; while stalling, bounds checks are suspended.
    /// Disabled never treats the queue as stalling.
    pub stale_tolerance: LatencySetting,
    /// How often to recompute the scaling coefficient.
    pub scaling_interval: Duration,
    /// Maximum deviation of the coefficient from 1.0; excess is trimmed.
    /// For example, 0.01 keeps the coefficient within [0.99, 1.01].
    pub scaling_tolerance: f32,
    /// How often to emit diagnostics. Zero disables them.
    pub report_interval: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            tuner_backend: LatencyTunerBackend::Default,
            tuner_profile: LatencyTunerProfile::Default,
            target_latency: LatencySetting::Unset,
            latency_tolerance: LatencySetting::Unset,
            stale_tolerance: LatencySetting::Unset,
            scaling_interval: Duration::from_millis(5),
            scaling_tolerance: 0.005,
            report_interval: Duration::from_secs(5),
        }
    }
}

/// Fully resolved settings. `Duration::ZERO` means "disabled".
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLatencyConfig {
    /// Side of the session the tuner runs on.
    pub role: TunerRole,
    /// Latency to monitor; never `Default`.
    pub backend: LatencyTunerBackend,
    /// Correction policy; never `Default`.
    pub profile: LatencyTunerProfile,
    /// Target latency. Zero disables tuning and bounds checks.
    pub target_latency: Duration,
    /// Allowed deviation from target. Zero disables bounds checks.
    pub latency_tolerance: Duration,
    /// Stalling threshold. Zero never treats the queue as stalling.
    pub stale_tolerance: Duration,
    /// How often the update step runs.
    pub scaling_interval: Duration,
    /// Maximum deviation of the coefficient from 1.0.
    pub scaling_tolerance: f32,
    /// How often diagnostics are emitted. Zero disables them.
    pub report_interval: Duration,
}

impl LatencyConfig {
    /// Fill in every deferred setting for the given role.
    ///
    /// `default_target_latency` is used when the target is unset; passing zero
    /// there disables tuning for sessions that do not set a target.
    pub fn deduce_defaults(
        &self,
        default_target_latency: Duration,
        role: TunerRole,
    ) -> ResolvedLatencyConfig {
        let target_latency = self.target_latency.resolve(|| default_target_latency);

        let backend = match (self.tuner_backend, role) {
            (LatencyTunerBackend::Default, TunerRole::Receiver) => LatencyTunerBackend::Niq,
            (LatencyTunerBackend::Default, TunerRole::Sender) => LatencyTunerBackend::E2e,
            (explicit, _) => explicit,
        };

        let profile = match self.tuner_profile {
            LatencyTunerProfile::Default => default_profile(role, backend, target_latency),
            explicit => explicit,
        };

        let (latency_tolerance, stale_tolerance) = if target_latency.is_zero() {
            (Duration::ZERO, Duration::ZERO)
        } else {
            (
                self.latency_tolerance
                    .resolve(|| default_latency_tolerance(target_latency, role)),
                self.stale_tolerance
                    .resolve(|| (target_latency / 4).max(MIN_STALE_TOLERANCE)),
            )
        };

        ResolvedLatencyConfig {
            role,
            backend,
            profile,
            target_latency,
            latency_tolerance,
            stale_tolerance,
            scaling_interval: self.scaling_interval,
            scaling_tolerance: self.scaling_tolerance,
            report_interval: self.report_interval,
        }
    }
}

impl ResolvedLatencyConfig {
    /// Whether out-of-bounds latency terminates the session.
    pub fn checking_enabled(&self) -> bool {
        !self.target_latency.is_zero() && !self.latency_tolerance.is_zero()
    }

    /// Whether a scaling coefficient is computed at all.
    pub fn tuning_enabled(&self) -> bool {
        !self.target_latency.is_zero() && self.profile != LatencyTunerProfile::Intact
    }

    /// Whether the backend can be used on this side of the session.
    ///
    /// A sender never sees its peer's queue directly, only the end-to-end
    /// latency reported back to it.
    pub fn backend_supported(&self) -> bool {
        match (self.backend, self.role) {
            (LatencyTunerBackend::Default, _) => false,
            (LatencyTunerBackend::Niq, TunerRole::Sender) => false,
            _ => true,
        }
    }
}

fn default_profile(
    role: TunerRole,
    backend: LatencyTunerBackend,
    target_latency: Duration,
) -> LatencyTunerProfile {
    match (role, backend) {
        (TunerRole::Sender, _) => LatencyTunerProfile::Intact,
        (TunerRole::Receiver, LatencyTunerBackend::Niq)
            if target_latency < RESPONSIVE_TARGET_THRESHOLD =>
        {
            LatencyTunerProfile::Responsive
        }
        (TunerRole::Receiver, _) => LatencyTunerProfile::Gradual,
    }
}

fn default_latency_tolerance(target_latency: Duration, role: TunerRole) -> Duration {
    let base = if target_latency <= WIDE_TOLERANCE_TARGET {
        target_latency.max(MIN_LATENCY_TOLERANCE)
    } else {
        (target_latency / 2).max(WIDE_TOLERANCE_TARGET)
    };
    match role {
        TunerRole::Receiver => base,
        // Feedback adds delay and noise on top of the peer's measurement.
        TunerRole::Sender => base.saturating_add(base / 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TARGET: Duration = Duration::from_millis(200);

    #[test]
    fn latency_setting_decodes_signed_nanos() {
        assert_eq!(LatencySetting::from_nanos(-1), LatencySetting::Unset);
        assert_eq!(LatencySetting::from_nanos(0), LatencySetting::Disabled);
        assert_eq!(
            LatencySetting::from_nanos(5_000_000),
            LatencySetting::Value(Duration::from_millis(5))
        );
        assert_eq!(LatencySetting::from_millis(-7), LatencySetting::Unset);
        assert_eq!(LatencySetting::Unset.as_nanos(), -1);
        assert_eq!(LatencySetting::Disabled.as_nanos(), 0);
        assert_eq!(
            LatencySetting::Value(Duration::from_millis(5)).as_nanos(),
            5_000_000
        );
    }

    #[test]
    fn receiver_defaults_to_niq_backend() {
        let resolved = LatencyConfig::default().deduce_defaults(DEFAULT_TARGET, TunerRole::Receiver);
        assert_eq!(resolved.backend, LatencyTunerBackend::Niq);
        assert_eq!(resolved.profile, LatencyTunerProfile::Gradual);
        assert_eq!(resolved.target_latency, DEFAULT_TARGET);
        assert_eq!(resolved.latency_tolerance, Duration::from_millis(200));
        assert_eq!(resolved.stale_tolerance, Duration::from_millis(50));
        assert!(resolved.checking_enabled());
        assert!(resolved.tuning_enabled());
        assert!(resolved.backend_supported());
    }

    #[test]
    fn low_target_receiver_uses_responsive_profile() {
        let resolved = LatencyConfig::default()
            .deduce_defaults(Duration::from_millis(20), TunerRole::Receiver);
        assert_eq!(resolved.profile, LatencyTunerProfile::Responsive);
        assert_eq!(resolved.latency_tolerance, Duration::from_millis(20));
        assert_eq!(resolved.stale_tolerance, MIN_STALE_TOLERANCE);
    }

    #[test]
    fn e2e_receiver_uses_gradual_profile() {
        let cfg = LatencyConfig {
            tuner_backend: LatencyTunerBackend::E2e,
            ..LatencyConfig::default()
        };
        let resolved = cfg.deduce_defaults(Duration::from_millis(20), TunerRole::Receiver);
        assert_eq!(resolved.profile, LatencyTunerProfile::Gradual);
    }

    #[test]
    fn sender_defaults_to_e2e_and_intact() {
        let resolved = LatencyConfig::default().deduce_defaults(DEFAULT_TARGET, TunerRole::Sender);
        assert_eq!(resolved.backend, LatencyTunerBackend::E2e);
        assert_eq!(resolved.profile, LatencyTunerProfile::Intact);
        assert_eq!(resolved.latency_tolerance, Duration::from_millis(300));
        assert!(!resolved.tuning_enabled());
        assert!(resolved.checking_enabled());
    }

    #[test]
    fn huge_sender_target_resolves_without_overflow() {
        let cfg = LatencyConfig {
            target_latency: LatencySetting::Value(Duration::MAX),
            ..LatencyConfig::default()
        };
        let resolved = cfg.deduce_defaults(DEFAULT_TARGET, TunerRole::Sender);
        assert_eq!(resolved.target_latency, Duration::MAX);
        let base = Duration::MAX / 2;
        assert_eq!(resolved.latency_tolerance, base + base / 2);
    }

    #[test]
    fn explicit_niq_on_sender_is_unsupported() {
        let cfg = LatencyConfig {
            tuner_backend: LatencyTunerBackend::Niq,
            ..LatencyConfig::default()
        };
        let resolved = cfg.deduce_defaults(DEFAULT_TARGET, TunerRole::Sender);
        assert_eq!(resolved.backend, LatencyTunerBackend::Niq);
        assert!(!resolved.backend_supported());
    }

    #[test]
    fn large_targets_get_proportionally_tighter_tolerance() {
        let resolved = LatencyConfig::default()
            .deduce_defaults(Duration::from_secs(2), TunerRole::Receiver);
        assert_eq!(resolved.latency_tolerance, Duration::from_secs(1));
        let resolved = LatencyConfig::default()
            .deduce_defaults(Duration::from_millis(300), TunerRole::Receiver);
        assert_eq!(resolved.latency_tolerance, Duration::from_millis(200));
        let resolved = LatencyConfig::default()
            .deduce_defaults(Duration::from_millis(1), TunerRole::Receiver);
        assert_eq!(resolved.latency_tolerance, MIN_LATENCY_TOLERANCE);
    }

    #[test]
    fn explicit_and_disabled_settings_are_kept() {
        let cfg = LatencyConfig {
            tuner_profile: LatencyTunerProfile::Responsive,
            target_latency: LatencySetting::Value(Duration::from_millis(100)),
            latency_tolerance: LatencySetting::Disabled,
            stale_tolerance: LatencySetting::Value(Duration::from_millis(7)),
            ..LatencyConfig::default()
        };
        let resolved = cfg.deduce_defaults(DEFAULT_TARGET, TunerRole::Receiver);
        assert_eq!(resolved.profile, LatencyTunerProfile::Responsive);
        assert_eq!(resolved.target_latency, Duration::from_millis(100));
        assert_eq!(resolved.latency_tolerance, Duration::ZERO);
        assert_eq!(resolved.stale_tolerance, Duration::from_millis(7));
        assert!(!resolved.checking_enabled());
        assert!(resolved.tuning_enabled());
    }

    #[test]
    fn zero_target_disables_tuning_and_checking() {
        let cfg = LatencyConfig {
            tuner_profile: LatencyTunerProfile::Responsive,
            target_latency: LatencySetting::Disabled,
            latency_tolerance: LatencySetting::Value(Duration::from_millis(50)),
            ..LatencyConfig::default()
        };
        let resolved = cfg.deduce_defaults(DEFAULT_TARGET, TunerRole::Receiver);
        assert_eq!(resolved.target_latency, Duration::ZERO);
        assert_eq!(resolved.latency_tolerance, Duration::ZERO);
        assert_eq!(resolved.stale_tolerance, Duration::ZERO);
        assert!(!resolved.checking_enabled());
        assert!(!resolved.tuning_enabled());
    }

    #[test]
    fn zero_default_target_disables_unset_target() {
        let resolved = LatencyConfig::default().deduce_defaults(Duration::ZERO, TunerRole::Receiver);
        assert_eq!(resolved.target_latency, Duration::ZERO);
        assert!(!resolved.tuning_enabled());
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("NIQ".parse::<LatencyTunerBackend>().unwrap(), LatencyTunerBackend::Niq);
        assert_eq!(
            " gradual ".parse::<LatencyTunerProfile>().unwrap(),
            LatencyTunerProfile::Gradual
        );
        assert_eq!("sender".parse::<TunerRole>().unwrap(), TunerRole::Sender);
        assert!("rtcp".parse::<LatencyTunerBackend>().is_err());
        assert_eq!(LatencyTunerProfile::Intact.to_string(), "intact");
        assert_eq!(LatencyTunerBackend::E2e.to_string(), "e2e");
    }
}
