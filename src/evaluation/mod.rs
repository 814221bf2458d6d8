//! Scoring harness for clock readings.
//!
//! - [`metrics`]: circular hour/minute/time-of-day error metrics, per clock type
//! - [`report`]: JSON + text reports, baseline vs candidate comparisons
//! - [`plots`]: optional PNG charts

pub mod metrics;
pub mod plots;
pub mod report;

pub use metrics::{
    circular_distance, evaluate, hour_error, minute_error, time_of_day_error, CombinedMetrics,
    HourMetrics, MetricSet, MinuteMetrics,
};
pub use report::{
    render_summary, write_reports, Comparison, EvaluationReport, MetricDelta, MetricSummary,
    PromptStats,
};
