pub mod config;
pub mod error;
pub mod freq_estimator;
pub mod metrics;
pub mod report;
pub mod sample_spec;
pub mod tuner;

pub use config::{
    LatencyConfig, LatencySetting, LatencyTunerBackend, LatencyTunerProfile,
    ResolvedLatencyConfig, TunerRole,
};
pub use error::{FreqEstimatorError, ParseSettingError, TunerError};
pub use metrics::{LatencyMetrics, SharedLatencyMetrics};
pub use report::LatencyReport;
pub use sample_spec::SampleSpec;
pub use tuner::LatencyTuner;
