//! Circular error metrics for clock readings.
//!
//! ## Metrics Overview
//!
//! | Metric                 | What it measures                                   | Range   |
//! |------------------------|----------------------------------------------------|---------|
//! | Hour accuracy          | Fraction of samples with the exact hour            | 0.0-1.0 |
//! | Minute accuracy        | Fraction of samples with the exact minute          | 0.0-1.0 |
//! | Exact match            | Hour AND minute both exact                         | 0.0-1.0 |
//! | Tolerance @5 / @10     | Minute within 5 / 10 minutes (exact included)      | 0.0-1.0 |
//! | Mean absolute error    | Circular distance over wrong-but-valid readings    | ≥ 0     |
//!
//! ## Circular Distance
//!
//! Hours live on a 24-ring, minutes on a 60-ring, time of day on a 1440-ring.
//! The error is always the shorter arc:
//!
//! ```text
//! raw   = |pred - true|
//! error = raw            if raw <= ring / 2
//!       = ring - raw     otherwise
//! ```
//!
//! So 23h vs 1h is 2 hours, not 22.
//!
//! ## Invalid Predictions
//!
//! An unset field still counts in the denominator (it lowers accuracy) but
//! never contributes to error statistics or the confusion matrix. For each
//! field: `accuracy + error_rate + invalid_rate == 1`.
//!
//! Everything here is a pure function of its inputs. Predictions and truths
//! are paired by position; unequal lengths are rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ClockType, Prediction, Sample};

pub const HOURS_PER_DAY: u32 = 24;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = HOURS_PER_DAY * MINUTES_PER_HOUR;

/// Shorter arc between `a` and `b` on a ring of size `ring`.
pub fn circular_distance(a: u32, b: u32, ring: u32) -> u32 {
    let raw = a.abs_diff(b) % ring;
    if raw <= ring / 2 {
        raw
    } else {
        ring - raw
    }
}

/// Hour error on the 24-hour ring. Never exceeds 12.
pub fn hour_error(predicted: u8, truth: u8) -> u32 {
    circular_distance(u32::from(predicted), u32::from(truth), HOURS_PER_DAY)
}

/// Minute error on the 60-minute ring. Never exceeds 30.
pub fn minute_error(predicted: u8, truth: u8) -> u32 {
    circular_distance(u32::from(predicted), u32::from(truth), MINUTES_PER_HOUR)
}

/// Minutes-of-day error, wrapped at 720.
pub fn time_of_day_error(pred_hour: u8, pred_minute: u8, true_hour: u8, true_minute: u8) -> u32 {
    let pred_total = u32::from(pred_hour) * MINUTES_PER_HOUR + u32::from(pred_minute);
    let true_total = u32::from(true_hour) * MINUTES_PER_HOUR + u32::from(true_minute);
    circular_distance(pred_total, true_total, MINUTES_PER_DAY)
}

/// Hour-field metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourMetrics {
    pub accuracy: f64,
    /// Valid but wrong
    pub error_rate: f64,
    /// Unset hour
    pub invalid_rate: f64,
    pub mean_absolute_error: f64,
    pub std_error: f64,
    pub max_error: u32,
    /// confusion_matrix[true][predicted], valid predictions only
    pub confusion_matrix: Vec<Vec<u32>>,
    pub error_distribution: Vec<u32>,
}

impl Default for HourMetrics {
    fn default() -> Self {
        Self {
            accuracy: 0.0,
            error_rate: 0.0,
            invalid_rate: 0.0,
            mean_absolute_error: 0.0,
            std_error: 0.0,
            max_error: 0,
            confusion_matrix: empty_confusion_matrix(),
            error_distribution: Vec::new(),
        }
    }
}

/// Minute-field metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinuteMetrics {
    pub accuracy: f64,
    pub error_rate: f64,
    pub invalid_rate: f64,
    pub mean_absolute_error: f64,
    pub std_error: f64,
    pub max_error: u32,
    /// Exact or within 5 minutes
    pub tolerance_5min_rate: f64,
    /// Exact or within 10 minutes
    pub tolerance_10min_rate: f64,
    pub error_distribution: Vec<u32>,
}

/// Whole-reading metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedMetrics {
    pub exact_match_accuracy: f64,
    pub mean_time_error_minutes: f64,
    pub std_time_error_minutes: f64,
    pub max_time_error_minutes: u32,
}

/// Aggregated metrics over a list of (prediction, sample) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Number of pairs evaluated (invalid predictions included)
    pub total_samples: usize,
    /// Predictions with at least one usable field
    pub valid_predictions: usize,
    /// Mean confidence over `valid_predictions`
    pub mean_confidence: f64,

    pub hour: HourMetrics,
    pub minute: MinuteMetrics,
    pub combined: CombinedMetrics,

    /// Independent metrics per clock type (empty inside a partition)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_clock_type: BTreeMap<ClockType, MetricSet>,
}

impl MetricSet {
    /// Compute metrics without the per-clock-type breakdown.
    pub fn compute(predictions: &[Prediction], truths: &[Sample]) -> Result<Self> {
        if predictions.len() != truths.len() {
            return Err(Error::LengthMismatch {
                predictions: predictions.len(),
                truths: truths.len(),
            });
        }

        let pairs: Vec<(&Prediction, &Sample)> = predictions.iter().zip(truths).collect();
        let total_samples = pairs.len();

        let confident: Vec<f64> = pairs
            .iter()
            .filter(|(p, _)| p.hour.is_some() || p.minute.is_some())
            .map(|(p, _)| p.confidence)
            .collect();

        Ok(Self {
            total_samples,
            valid_predictions: confident.len(),
            mean_confidence: mean(&confident),
            hour: hour_metrics(&pairs),
            minute: minute_metrics(&pairs),
            combined: combined_metrics(&pairs),
            by_clock_type: BTreeMap::new(),
        })
    }

    /// Primary score used for prompt selection.
    pub fn score(&self) -> f64 {
        self.combined.exact_match_accuracy
    }
}

/// Full evaluation: overall metrics plus a breakdown per clock type.
///
/// Each partition is computed by its own [`MetricSet::compute`] call.
pub fn evaluate(predictions: &[Prediction], truths: &[Sample]) -> Result<MetricSet> {
    let mut metrics = MetricSet::compute(predictions, truths)?;

    for clock_type in ClockType::ALL {
        let (type_preds, type_truths): (Vec<Prediction>, Vec<Sample>) = predictions
            .iter()
            .zip(truths)
            .filter(|(_, t)| t.clock_type == clock_type)
            .map(|(p, t)| (p.clone(), t.clone()))
            .unzip();

        if !type_truths.is_empty() {
            metrics
                .by_clock_type
                .insert(clock_type, MetricSet::compute(&type_preds, &type_truths)?);
        }
    }

    Ok(metrics)
}

fn hour_metrics(pairs: &[(&Prediction, &Sample)]) -> HourMetrics {
    let total = pairs.len();
    let mut correct = 0usize;
    let mut invalid = 0usize;
    let mut errors = Vec::new();
    let mut confusion = empty_confusion_matrix();

    for (pred, truth) in pairs {
        let Some(hour) = pred.hour else {
            invalid += 1;
            continue;
        };

        if hour == truth.true_hour {
            correct += 1;
        } else {
            errors.push(hour_error(hour, truth.true_hour));
        }

        confusion[usize::from(truth.true_hour)][usize::from(hour)] += 1;
    }

    HourMetrics {
        accuracy: ratio(correct, total),
        error_rate: ratio(errors.len(), total),
        invalid_rate: ratio(invalid, total),
        mean_absolute_error: mean_u32(&errors),
        std_error: std_dev_u32(&errors),
        max_error: errors.iter().copied().max().unwrap_or(0),
        confusion_matrix: confusion,
        error_distribution: errors,
    }
}

fn minute_metrics(pairs: &[(&Prediction, &Sample)]) -> MinuteMetrics {
    let total = pairs.len();
    let mut correct = 0usize;
    let mut invalid = 0usize;
    let mut within_5 = 0usize;
    let mut within_10 = 0usize;
    let mut errors = Vec::new();

    for (pred, truth) in pairs {
        let Some(minute) = pred.minute else {
            invalid += 1;
            continue;
        };

        if minute == truth.true_minute {
            correct += 1;
            continue;
        }

        let error = minute_error(minute, truth.true_minute);
        if error <= 5 {
            within_5 += 1;
        }
        if error <= 10 {
            within_10 += 1;
        }
        errors.push(error);
    }

    MinuteMetrics {
        accuracy: ratio(correct, total),
        error_rate: ratio(errors.len(), total),
        invalid_rate: ratio(invalid, total),
        mean_absolute_error: mean_u32(&errors),
        std_error: std_dev_u32(&errors),
        max_error: errors.iter().copied().max().unwrap_or(0),
        tolerance_5min_rate: ratio(correct + within_5, total),
        tolerance_10min_rate: ratio(correct + within_10, total),
        error_distribution: errors,
    }
}

fn combined_metrics(pairs: &[(&Prediction, &Sample)]) -> CombinedMetrics {
    let total = pairs.len();
    let mut exact = 0usize;
    let mut errors = Vec::new();

    for (pred, truth) in pairs {
        let (Some(hour), Some(minute)) = (pred.hour, pred.minute) else {
            continue;
        };

        if hour == truth.true_hour && minute == truth.true_minute {
            exact += 1;
        } else {
            errors.push(time_of_day_error(hour, minute, truth.true_hour, truth.true_minute));
        }
    }

    CombinedMetrics {
        exact_match_accuracy: ratio(exact, total),
        mean_time_error_minutes: mean_u32(&errors),
        std_time_error_minutes: std_dev_u32(&errors),
        max_time_error_minutes: errors.iter().copied().max().unwrap_or(0),
    }
}

// === Utility functions ===

fn empty_confusion_matrix() -> Vec<Vec<u32>> {
    vec![vec![0; HOURS_PER_DAY as usize]; HOURS_PER_DAY as usize]
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_u32(values: &[u32]) -> f64 {
    let values: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    mean(&values)
}

/// Population standard deviation.
fn std_dev_u32(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    let m = mean(&values);
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(hour: u8, minute: u8) -> Sample {
        Sample::new(format!("clock_{:02}{:02}.png", hour, minute), ClockType::Analog, hour, minute)
    }

    fn typed(clock_type: ClockType, hour: u8, minute: u8) -> Sample {
        Sample::new(format!("clock_{}_{:02}{:02}.png", clock_type, hour, minute), clock_type, hour, minute)
    }

    #[test]
    fn test_exact_reading() {
        let metrics = evaluate(&[Prediction::new(3, 15, 0.9)], &[sample(3, 15)]).unwrap();

        assert_eq!(metrics.total_samples, 1);
        assert_eq!(metrics.hour.accuracy, 1.0);
        assert_eq!(metrics.minute.accuracy, 1.0);
        assert_eq!(metrics.combined.exact_match_accuracy, 1.0);
        assert_eq!(metrics.hour.confusion_matrix[3][3], 1);
    }

    #[test]
    fn test_hour_wraps_around_midnight() {
        assert_eq!(hour_error(23, 1), 2, "23h vs 1h should be 2, not 22");

        let metrics = evaluate(&[Prediction::new(23, 0, 0.5)], &[sample(1, 0)]).unwrap();
        assert_eq!(metrics.hour.error_distribution, vec![2]);
        assert_eq!(metrics.hour.max_error, 2);
        assert_eq!(metrics.minute.accuracy, 1.0);
        // 23:00 vs 01:00 is 120 minutes across midnight
        assert_eq!(metrics.combined.max_time_error_minutes, 120);
    }

    #[test]
    fn test_unset_prediction_counts_in_total_only() {
        let metrics = evaluate(&[Prediction::invalid("Failed to parse response")], &[sample(7, 40)]).unwrap();

        assert_eq!(metrics.total_samples, 1);
        assert_eq!(metrics.valid_predictions, 0);
        assert_eq!(metrics.hour.accuracy, 0.0);
        assert!(metrics.hour.error_distribution.is_empty());
        assert!(metrics.minute.error_distribution.is_empty());
        assert_eq!(metrics.hour.invalid_rate, 1.0);
        let confusion_total: u32 = metrics.hour.confusion_matrix.iter().flatten().sum();
        assert_eq!(confusion_total, 0);
    }

    #[test]
    fn test_empty_input_defaults_to_zero() {
        let metrics = evaluate(&[], &[]).unwrap();
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.hour.accuracy, 0.0);
        assert_eq!(metrics.minute.tolerance_10min_rate, 0.0);
        assert_eq!(metrics.combined.mean_time_error_minutes, 0.0);
        assert!(!metrics.hour.mean_absolute_error.is_nan());
        assert!(metrics.by_clock_type.is_empty());
    }

    #[test]
    fn test_rates_partition_to_one() {
        let truths = vec![sample(1, 0), sample(2, 10), sample(3, 20), sample(4, 30)];
        let preds = vec![
            Prediction::new(1, 0, 0.9),
            Prediction::new(5, 10, 0.7),
            Prediction::invalid("timeout"),
            Prediction {
                hour: Some(4),
                minute: None,
                confidence: 0.3,
                error: None,
                raw_response: None,
            },
        ];

        let m = evaluate(&preds, &truths).unwrap();
        let hour_sum = m.hour.accuracy + m.hour.error_rate + m.hour.invalid_rate;
        let minute_sum = m.minute.accuracy + m.minute.error_rate + m.minute.invalid_rate;
        assert!((hour_sum - 1.0).abs() < 1e-9);
        assert!((minute_sum - 1.0).abs() < 1e-9);
        assert_eq!(m.valid_predictions, 3);
        assert!((m.mean_confidence - (0.9 + 0.7 + 0.3) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_minute_tolerance_bands() {
        let truths = vec![sample(9, 0), sample(9, 10), sample(9, 20), sample(9, 58)];
        let preds = vec![
            Prediction::new(9, 0, 1.0),  // exact
            Prediction::new(9, 14, 1.0), // 4 min
            Prediction::new(9, 29, 1.0), // 9 min
            Prediction::new(9, 3, 1.0),  // 5 min across the hour
        ];

        let m = evaluate(&preds, &truths).unwrap();
        assert_eq!(m.minute.accuracy, 0.25);
        assert_eq!(m.minute.tolerance_5min_rate, 0.75);
        assert_eq!(m.minute.tolerance_10min_rate, 1.0);
        assert_eq!(m.minute.error_distribution, vec![4, 9, 5]);
    }

    #[test]
    fn test_statistics_over_errors() {
        // errors 2 and 4 -> mean 3, population std 1
        let truths = vec![sample(10, 0), sample(10, 0)];
        let preds = vec![Prediction::new(12, 0, 1.0), Prediction::new(6, 0, 1.0)];

        let m = evaluate(&preds, &truths).unwrap();
        assert!((m.hour.mean_absolute_error - 3.0).abs() < 1e-9);
        assert!((m.hour.std_error - 1.0).abs() < 1e-9);
        assert_eq!(m.hour.max_error, 4);
    }

    #[test]
    fn test_breakdown_by_clock_type() {
        let truths = vec![
            typed(ClockType::Analog, 3, 15),
            typed(ClockType::Digital, 8, 45),
            typed(ClockType::Digital, 20, 5),
        ];
        let preds = vec![
            Prediction::new(3, 15, 0.9),
            Prediction::new(8, 45, 0.8),
            Prediction::new(8, 5, 0.8),
        ];

        let m = evaluate(&preds, &truths).unwrap();
        assert_eq!(m.by_clock_type.len(), 2);
        assert!(!m.by_clock_type.contains_key(&ClockType::Word));

        let analog = &m.by_clock_type[&ClockType::Analog];
        assert_eq!(analog.total_samples, 1);
        assert_eq!(analog.combined.exact_match_accuracy, 1.0);
        assert!(analog.by_clock_type.is_empty());

        let digital = &m.by_clock_type[&ClockType::Digital];
        assert_eq!(digital.total_samples, 2);
        assert_eq!(digital.hour.accuracy, 0.5);
        assert_eq!(digital.hour.error_distribution, vec![12]);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let truths = vec![sample(1, 1), sample(13, 59), sample(0, 30)];
        let preds = vec![
            Prediction::new(1, 5, 0.4),
            Prediction::invalid("x"),
            Prediction::new(12, 30, 0.6),
        ];
        assert_eq!(evaluate(&preds, &truths).unwrap(), evaluate(&preds, &truths).unwrap());
    }

    #[test]
    fn test_unpaired_lengths_rejected() {
        let preds = vec![Prediction::new(3, 15, 0.9)];
        let truths = vec![sample(3, 15), sample(4, 20)];

        let err = evaluate(&preds, &truths).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { predictions: 1, truths: 2 }));
        assert!(MetricSet::compute(&[], &truths).is_err());
    }

    #[test]
    fn test_saved_out_of_range_prediction_is_unset() {
        let pred: Prediction = serde_json::from_str(r#"{"hour":30,"minute":75,"confidence":0.5}"#).unwrap();
        let metrics = evaluate(&[pred], &[sample(6, 30)]).unwrap();

        assert_eq!(metrics.total_samples, 1);
        assert_eq!(metrics.valid_predictions, 0);
        assert_eq!(metrics.hour.invalid_rate, 1.0);
        assert_eq!(metrics.minute.invalid_rate, 1.0);
        let confusion_total: u32 = metrics.hour.confusion_matrix.iter().flatten().sum();
        assert_eq!(confusion_total, 0);
    }

    proptest! {
        #[test]
        fn prop_hour_error_symmetric_and_bounded(p in 0u8..24, t in 0u8..24) {
            prop_assert_eq!(hour_error(p, t), hour_error(t, p));
            prop_assert!(hour_error(p, t) <= 12);
        }

        #[test]
        fn prop_minute_error_bounded(p in 0u8..60, t in 0u8..60) {
            prop_assert!(minute_error(p, t) <= 30);
            prop_assert_eq!(minute_error(p, t), minute_error(t, p));
        }

        #[test]
        fn prop_time_of_day_error_bounded(ph in 0u8..24, pm in 0u8..60, th in 0u8..24, tm in 0u8..60) {
            prop_assert!(time_of_day_error(ph, pm, th, tm) <= 720);
        }

        #[test]
        fn prop_aggregate_orderings(
            readings in proptest::collection::vec((0u8..24, 0u8..60, 0u8..24, 0u8..60, any::<bool>()), 0..40)
        ) {
            let truths: Vec<Sample> = readings.iter().map(|r| sample(r.2, r.3)).collect();
            let preds: Vec<Prediction> = readings
                .iter()
                .map(|r| if r.4 { Prediction::new(r.0, r.1, 0.5) } else { Prediction::invalid("unset") })
                .collect();

            let m = evaluate(&preds, &truths).unwrap();
            prop_assert_eq!(m.total_samples, readings.len());
            prop_assert!(m.minute.tolerance_10min_rate >= m.minute.tolerance_5min_rate);
            prop_assert!(m.minute.tolerance_5min_rate >= m.minute.accuracy);
            prop_assert!(
                m.combined.exact_match_accuracy <= m.hour.accuracy.min(m.minute.accuracy) + 1e-12
            );
        }
    }
}
