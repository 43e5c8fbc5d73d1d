//! Sample-rate descriptor used to move between wall-clock durations and
//! sample-domain counts.
//!
//! All counts are **per-channel** samples (frames), matching how the audio
//! pipeline reports block sizes to the tuner.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Sample rate and channel layout of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleSpec {
    sample_rate: u32,
    channels: u16,
}

impl SampleSpec {
    /// Describe a stream; check [`SampleSpec::is_valid`] before use.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Frames per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// A spec is usable only with a positive rate and at least one channel.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Convert `duration` to a sample count, rounding to the nearest sample.
    ///
    /// Returns `None` when the rate is zero or the result does not fit in `i64`.
    pub fn duration_to_samples(&self, duration: Duration) -> Option<i64> {
        if self.sample_rate == 0 {
            return None;
        }
        let scaled = duration
            .as_nanos()
            .checked_mul(self.sample_rate as u128)?
            .checked_add(NANOS_PER_SEC / 2)?;
        i64::try_from(scaled / NANOS_PER_SEC).ok()
    }

    /// Like [`SampleSpec::duration_to_samples`], but saturates instead of failing.
    pub fn duration_to_samples_saturating(&self, duration: Duration) -> i64 {
        self.duration_to_samples(duration).unwrap_or(i64::MAX)
    }

    /// Convert a (possibly negative) sample delta to milliseconds for logging.
    pub fn samples_to_millis(&self, samples: i64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        samples as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_durations_to_samples() {
        let spec = SampleSpec::new(48_000, 2);
        assert_eq!(spec.duration_to_samples(Duration::from_millis(200)), Some(9_600));
        assert_eq!(spec.duration_to_samples(Duration::from_millis(5)), Some(240));
        assert_eq!(spec.duration_to_samples(Duration::ZERO), Some(0));
    }

    #[test]
    fn rounds_to_nearest_sample() {
        let spec = SampleSpec::new(44_100, 2);
        // 1 ms at 44.1 kHz is 44.1 samples.
        assert_eq!(spec.duration_to_samples(Duration::from_millis(1)), Some(44));
        // 15 us at 44.1 kHz is 0.6615 samples.
        assert_eq!(spec.duration_to_samples(Duration::from_micros(15)), Some(1));
    }

    #[test]
    fn rejects_zero_rate_and_overflow() {
        assert_eq!(
            SampleSpec::new(0, 2).duration_to_samples(Duration::from_millis(1)),
            None
        );
        let spec = SampleSpec::new(u32::MAX, 1);
        assert_eq!(spec.duration_to_samples(Duration::MAX), None);
        assert_eq!(spec.duration_to_samples_saturating(Duration::MAX), i64::MAX);
    }

    #[test]
    fn validity_requires_rate_and_channels() {
        assert!(SampleSpec::new(48_000, 1).is_valid());
        assert!(!SampleSpec::new(0, 1).is_valid());
        assert!(!SampleSpec::new(48_000, 0).is_valid());
    }

    #[test]
    fn samples_to_millis_handles_negative_deltas() {
        let spec = SampleSpec::new(48_000, 2);
        assert_eq!(spec.samples_to_millis(-480), -10.0);
        assert_eq!(spec.samples_to_millis(9_600), 200.0);
    }
}
