//! Failure collection and feedback synthesis.
//!
//! Each iteration turns a scored batch into the text handed to the prompt
//! rewriter: headline metrics, a handful of concrete failures, the fixed
//! checklist of clock-reading pitfalls, and the trajectory of recent attempts
//! so the rewriter can see what was already tried.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::evaluation::{hour_error, minute_error, MetricSet};
use crate::types::{ClockType, OptimizationRecord, Prediction, RecordStatus, Sample};

/// How many past records the feedback shows.
pub const HISTORY_WINDOW: usize = 3;

/// A known way clock reading goes wrong, and the instruction that prevents it.
#[derive(Debug, Clone, Copy)]
pub struct Pitfall {
    pub issue: &'static str,
    pub fix: &'static str,
    /// Lowercase phrases whose presence means a prompt already covers this
    pub keywords: &'static [&'static str],
}

impl Pitfall {
    /// Whether `prompt` already addresses this pitfall.
    pub fn addressed_by(&self, prompt: &str) -> bool {
        let lower = prompt.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k))
    }
}

pub const PITFALLS: [Pitfall; 4] = [
    Pitfall {
        issue: "Hour hand vs minute hand confusion",
        fix: "The SHORT thick hand is the hour hand; the LONG thin hand is the minute hand.",
        keywords: &["short", "long"],
    },
    Pitfall {
        issue: "Wrap-around errors near 12 and midnight",
        fix: "Hours wrap around: 11 is followed by 12 and 23 by 0. If the hour hand sits just before a number, the hour is the previous one.",
        keywords: &["wrap"],
    },
    Pitfall {
        issue: "Incorrect minute calculation (should be position x 5)",
        fix: "Minutes = the number the minute hand points to x 5 (12 means 0 minutes).",
        keywords: &["x 5", "× 5", "* 5", "by 5"],
    },
    Pitfall {
        issue: "24-hour format conversion errors",
        fix: "Report the hour in 24-hour format (0-23).",
        keywords: &["24-hour"],
    },
];

/// Number of pitfalls a prompt addresses.
pub fn pitfall_coverage(prompt: &str) -> usize {
    PITFALLS.iter().filter(|p| p.addressed_by(prompt)).count()
}

/// One mismatched reading, kept for the feedback text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureExample {
    pub sample_id: String,
    pub clock_type: ClockType,
    pub expected: String,
    pub predicted: String,
    /// Circular hour error; `None` when the hour was unset
    pub hour_error: Option<u32>,
    pub minute_error: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FailureExample {
    fn describe(&self) -> String {
        let off = |e: Option<u32>, unit: &str| match e {
            Some(0) => format!("{} correct", unit),
            Some(e) => format!("{} off by {}", unit, e),
            None => format!("{} missing", unit),
        };
        let mut line = format!(
            "True: {}, Predicted: {} ({}; {}, {})",
            self.expected,
            self.predicted,
            self.clock_type,
            off(self.hour_error, "hour"),
            off(self.minute_error, "minute"),
        );
        if let Some(reason) = &self.error {
            let _ = write!(line, " [{}]", reason);
        }
        line
    }
}

/// First `max` samples whose prediction is not an exact match, in batch order.
pub fn collect_failures(predictions: &[Prediction], truths: &[Sample], max: usize) -> Vec<FailureExample> {
    predictions
        .iter()
        .zip(truths)
        .filter(|(p, t)| !p.matches(t))
        .take(max)
        .map(|(p, t)| FailureExample {
            sample_id: t.id.clone(),
            clock_type: t.clock_type,
            expected: t.time_string(),
            predicted: p.time_string(),
            hour_error: p.hour.map(|h| hour_error(h, t.true_hour)),
            minute_error: p.minute.map(|m| minute_error(m, t.true_minute)),
            error: p.error.clone(),
        })
        .collect()
}

/// Compose the feedback text for the rewriter.
pub fn build_feedback(metrics: &MetricSet, failures: &[FailureExample], history: &[OptimizationRecord]) -> String {
    let mut out = String::new();

    out.push_str("Current performance analysis:\n\n");
    out.push_str("ACCURACY METRICS:\n");
    let _ = writeln!(out, "- Hour accuracy: {:.1}%", metrics.hour.accuracy * 100.0);
    let _ = writeln!(out, "- Minute accuracy: {:.1}%", metrics.minute.accuracy * 100.0);
    let _ = writeln!(out, "- Exact match: {:.1}%", metrics.combined.exact_match_accuracy * 100.0);
    let _ = writeln!(out, "- Within 5 minutes: {:.1}%", metrics.minute.tolerance_5min_rate * 100.0);
    let _ = writeln!(
        out,
        "- Unreadable answers: {:.1}%",
        metrics.hour.invalid_rate.max(metrics.minute.invalid_rate) * 100.0
    );

    out.push_str("\nERROR ANALYSIS:\n");
    let _ = writeln!(out, "- Average hour error: {:.1} hours", metrics.hour.mean_absolute_error);
    let _ = writeln!(out, "- Average minute error: {:.1} minutes", metrics.minute.mean_absolute_error);
    let _ = writeln!(out, "- Average time error: {:.1} minutes", metrics.combined.mean_time_error_minutes);

    if metrics.by_clock_type.len() > 1 {
        out.push_str("\nBY CLOCK TYPE:\n");
        for (clock_type, m) in &metrics.by_clock_type {
            let _ = writeln!(
                out,
                "- {}: exact {:.1}% over {} samples",
                clock_type,
                m.combined.exact_match_accuracy * 100.0,
                m.total_samples
            );
        }
    }

    out.push_str("\nFAILED EXAMPLES:\n");
    if failures.is_empty() {
        out.push_str("(none in this batch)\n");
    } else {
        for f in failures {
            let _ = writeln!(out, "- {}", f.describe());
        }
    }

    out.push_str("\nISSUES TO ADDRESS:\n");
    for (i, p) in PITFALLS.iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {}", i + 1, p.issue, p.fix);
    }

    out.push_str("\nPREVIOUS ATTEMPTS (recent first):\n");
    if history.is_empty() {
        out.push_str("This is the first attempt.\n");
    } else {
        for r in history.iter().rev().take(HISTORY_WINDOW) {
            let _ = write!(
                out,
                "- Iteration {}: {} (training {:.3}, candidate {:.3}, {:+.3})",
                r.iteration, r.status, r.score_before, r.score_after, r.improvement
            );
            if r.status == RecordStatus::Rejected {
                out.push_str(" - that rewrite did not help, try a different change");
            }
            out.push('\n');
        }
    }

    out.push_str("\nIMPROVEMENT NEEDED:\n");
    out.push_str("- Clearer hand identification instructions\n");
    out.push_str("- More explicit minute calculation steps\n");
    out.push_str("- Keep the JSON response format with hour, minute and confidence\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate;

    fn sample(h: u8, m: u8) -> Sample {
        Sample::new(format!("clock_{:02}{:02}_analog.png", h, m), ClockType::Analog, h, m)
    }

    #[test]
    fn test_collect_failures_bounded_and_ordered() {
        let truths: Vec<Sample> = (0..8).map(|i| sample(i, 0)).collect();
        let preds: Vec<Prediction> = (0..8)
            .map(|i| if i % 2 == 0 { Prediction::new(i, 0, 1.0) } else { Prediction::new(i, 5, 1.0) })
            .collect();

        let failures = collect_failures(&preds, &truths, 3);
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].expected, "01:00");
        assert_eq!(failures[0].minute_error, Some(5));
        assert_eq!(failures[2].expected, "05:00");
    }

    #[test]
    fn test_failure_with_unset_hour() {
        let truths = vec![sample(23, 0)];
        let preds = vec![Prediction::invalid("Failed to parse response")];
        let failures = collect_failures(&preds, &truths, 5);
        assert_eq!(failures[0].predicted, "--:--");
        assert_eq!(failures[0].hour_error, None);
        assert!(failures[0].describe().contains("hour missing"));
    }

    #[test]
    fn test_feedback_sections() {
        let truths = vec![sample(3, 15), sample(23, 0)];
        let preds = vec![Prediction::new(15, 15, 0.9), Prediction::new(1, 0, 0.5)];
        let metrics = evaluate(&preds, &truths).unwrap();
        let failures = collect_failures(&preds, &truths, 5);

        let history: Vec<OptimizationRecord> = (1..=4)
            .map(|i| OptimizationRecord {
                iteration: i,
                score_before: 0.2,
                score_after: 0.1,
                improvement: -0.1,
                prompt_text: String::new(),
                status: RecordStatus::Rejected,
                error: None,
            })
            .collect();

        let text = build_feedback(&metrics, &failures, &history);
        assert!(text.contains("Exact match: 0.0%"));
        assert!(text.contains("True: 03:15, Predicted: 15:15"));
        assert!(text.contains("hour off by 12"));
        assert!(text.contains("hour off by 2"));
        for p in &PITFALLS {
            assert!(text.contains(p.issue));
        }
        assert!(text.contains("Iteration 4"));
        assert!(!text.contains("Iteration 1:"));
    }

    #[test]
    fn test_pitfall_coverage() {
        assert_eq!(pitfall_coverage("read the clock"), 0);
        let all: String = PITFALLS.iter().map(|p| p.fix).collect::<Vec<_>>().join("\n");
        assert_eq!(pitfall_coverage(&all), PITFALLS.len());
    }
}
