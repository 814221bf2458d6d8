//! Reports and before/after comparisons.
//!
//! Every artifact here is derived from a [`MetricSet`] that was already
//! computed; nothing is re-measured. Each report is written twice: a JSON
//! document for machines and a sibling `.txt` summary for people.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use super::metrics::MetricSet;
use crate::error::Result;

/// Persisted evaluation: metrics plus the context they were measured in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub metrics: MetricSet,
}

impl EvaluationReport {
    pub fn new(metrics: MetricSet) -> Self {
        Self {
            timestamp: Utc::now(),
            prompt: None,
            metrics,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Write `<path>` (JSON) and `<path>.txt` (summary). Returns the summary.
    pub fn write(&self, json_path: impl AsRef<Path>) -> Result<String> {
        let json_path = json_path.as_ref();
        let summary = render_summary(&self.metrics);
        write_pair(json_path, &serde_json::to_string_pretty(self)?, &summary)?;
        Ok(summary)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write the metrics report pair for a bare metric set.
pub fn write_reports(metrics: &MetricSet, json_path: impl AsRef<Path>) -> Result<String> {
    EvaluationReport::new(metrics.clone()).write(json_path)
}

/// Path of the text summary that accompanies a JSON report.
pub fn summary_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("txt")
}

fn write_pair(json_path: &Path, json: &str, summary: &str) -> Result<()> {
    if let Some(parent) = json_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(json_path, json)?;
    std::fs::write(summary_path(json_path), summary)?;
    Ok(())
}

/// Human-readable summary of one evaluation.
pub fn render_summary(metrics: &MetricSet) -> String {
    let mut out = String::new();
    let h = &metrics.hour;
    let m = &metrics.minute;
    let c = &metrics.combined;

    let _ = writeln!(out, "Clock Reading Evaluation Report");
    let _ = writeln!(out, "===============================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total samples: {} ({} with a usable reading)", metrics.total_samples, metrics.valid_predictions);
    let _ = writeln!(out, "Mean confidence: {:.2}", metrics.mean_confidence);
    let _ = writeln!(out);
    let _ = writeln!(out, "Hour:");
    let _ = writeln!(out, "- Accuracy: {:.2}%", h.accuracy * 100.0);
    let _ = writeln!(out, "- Mean absolute error: {:.2} h", h.mean_absolute_error);
    let _ = writeln!(out, "- Max error: {} h", h.max_error);
    let _ = writeln!(out, "- Invalid: {:.2}%", h.invalid_rate * 100.0);
    let _ = writeln!(out);
    let _ = writeln!(out, "Minute:");
    let _ = writeln!(out, "- Accuracy: {:.2}%", m.accuracy * 100.0);
    let _ = writeln!(out, "- Mean absolute error: {:.2} min", m.mean_absolute_error);
    let _ = writeln!(out, "- Within 5 min: {:.2}%", m.tolerance_5min_rate * 100.0);
    let _ = writeln!(out, "- Within 10 min: {:.2}%", m.tolerance_10min_rate * 100.0);
    let _ = writeln!(out);
    let _ = writeln!(out, "Whole reading:");
    let _ = writeln!(out, "- Exact match: {:.2}%", c.exact_match_accuracy * 100.0);
    let _ = writeln!(out, "- Mean time error: {:.2} min", c.mean_time_error_minutes);

    if !metrics.by_clock_type.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "By clock type:");
        for (clock_type, typed) in &metrics.by_clock_type {
            let _ = writeln!(
                out,
                "  {:<8} ({:>3} samples)  hour {:>6.2}%  minute {:>6.2}%  exact {:>6.2}%",
                clock_type.as_str().to_uppercase(),
                typed.total_samples,
                typed.hour.accuracy * 100.0,
                typed.minute.accuracy * 100.0,
                typed.combined.exact_match_accuracy * 100.0,
            );
        }
    }

    out
}

/// Headline numbers pulled from a metric set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub total_samples: usize,
    pub hour_accuracy: f64,
    pub minute_accuracy: f64,
    pub exact_match: f64,
    pub tolerance_5min: f64,
    pub tolerance_10min: f64,
    pub hour_mae: f64,
    pub minute_mae: f64,
    pub mean_time_error_minutes: f64,
}

impl From<&MetricSet> for MetricSummary {
    fn from(m: &MetricSet) -> Self {
        Self {
            total_samples: m.total_samples,
            hour_accuracy: m.hour.accuracy,
            minute_accuracy: m.minute.accuracy,
            exact_match: m.combined.exact_match_accuracy,
            tolerance_5min: m.minute.tolerance_5min_rate,
            tolerance_10min: m.minute.tolerance_10min_rate,
            hour_mae: m.hour.mean_absolute_error,
            minute_mae: m.minute.mean_absolute_error,
            mean_time_error_minutes: m.combined.mean_time_error_minutes,
        }
    }
}

/// Signed change of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub name: String,
    pub baseline: f64,
    pub candidate: f64,
    /// candidate - baseline
    pub delta: f64,
    /// Accuracy-like metrics improve upward, error metrics downward
    pub higher_is_better: bool,
}

impl MetricDelta {
    fn new(name: &str, baseline: f64, candidate: f64, higher_is_better: bool) -> Self {
        Self {
            name: name.to_string(),
            baseline,
            candidate,
            delta: candidate - baseline,
            higher_is_better,
        }
    }

    pub fn improved(&self) -> bool {
        if self.higher_is_better {
            self.delta > 0.0
        } else {
            self.delta < 0.0
        }
    }

    fn is_rate(&self) -> bool {
        self.higher_is_better
    }
}

/// Size of a prompt, for before/after comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStats {
    pub chars: usize,
    pub lines: usize,
}

impl PromptStats {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            lines: text.lines().count(),
        }
    }
}

/// Baseline vs candidate comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub timestamp: DateTime<Utc>,
    pub baseline: MetricSummary,
    pub candidate: MetricSummary,
    pub deltas: Vec<MetricDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_prompt: Option<PromptStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_prompt: Option<PromptStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_prompt_text: Option<String>,
}

impl Comparison {
    pub fn new(baseline: &MetricSet, candidate: &MetricSet) -> Self {
        let b = MetricSummary::from(baseline);
        let c = MetricSummary::from(candidate);

        let deltas = vec![
            MetricDelta::new("hour_accuracy", b.hour_accuracy, c.hour_accuracy, true),
            MetricDelta::new("minute_accuracy", b.minute_accuracy, c.minute_accuracy, true),
            MetricDelta::new("exact_match", b.exact_match, c.exact_match, true),
            MetricDelta::new("tolerance_5min", b.tolerance_5min, c.tolerance_5min, true),
            MetricDelta::new("tolerance_10min", b.tolerance_10min, c.tolerance_10min, true),
            MetricDelta::new("hour_mae", b.hour_mae, c.hour_mae, false),
            MetricDelta::new("minute_mae", b.minute_mae, c.minute_mae, false),
            MetricDelta::new(
                "mean_time_error_minutes",
                b.mean_time_error_minutes,
                c.mean_time_error_minutes,
                false,
            ),
        ];

        Self {
            timestamp: Utc::now(),
            baseline: b,
            candidate: c,
            deltas,
            baseline_prompt: None,
            candidate_prompt: None,
            candidate_prompt_text: None,
        }
    }

    /// Attach prompt sizes (and the candidate text) to the comparison.
    pub fn with_prompts(mut self, baseline: &str, candidate: &str) -> Self {
        self.baseline_prompt = Some(PromptStats::of(baseline));
        self.candidate_prompt = Some(PromptStats::of(candidate));
        self.candidate_prompt_text = Some(candidate.to_string());
        self
    }

    pub fn delta(&self, name: &str) -> Option<&MetricDelta> {
        self.deltas.iter().find(|d| d.name == name)
    }

    /// Plain-text summary.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Prompt Comparison");
        let _ = writeln!(out, "=================");
        let _ = writeln!(
            out,
            "Samples: baseline {}, candidate {}",
            self.baseline.total_samples, self.candidate.total_samples
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<26} {:>10} {:>10} {:>10}", "metric", "baseline", "candidate", "delta");

        for d in &self.deltas {
            if d.is_rate() {
                let _ = writeln!(
                    out,
                    "{:<26} {:>9.2}% {:>9.2}% {:>+9.2}%",
                    d.name,
                    d.baseline * 100.0,
                    d.candidate * 100.0,
                    d.delta * 100.0
                );
            } else {
                let _ = writeln!(
                    out,
                    "{:<26} {:>10.2} {:>10.2} {:>+10.2}",
                    d.name, d.baseline, d.candidate, d.delta
                );
            }
        }

        if let (Some(b), Some(c)) = (self.baseline_prompt, self.candidate_prompt) {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Prompt length: {} → {} chars ({:+}), {} → {} lines ({:+})",
                b.chars,
                c.chars,
                c.chars as i64 - b.chars as i64,
                b.lines,
                c.lines,
                c.lines as i64 - b.lines as i64
            );
        }

        if let Some(text) = &self.candidate_prompt_text {
            let _ = writeln!(out);
            let _ = writeln!(out, "Candidate prompt:");
            let _ = writeln!(out, "{}", text);
        }

        out
    }

    /// Write `<path>` (JSON) and `<path>.txt`. Returns the text.
    pub fn write(&self, json_path: impl AsRef<Path>) -> Result<String> {
        let text = self.render();
        write_pair(json_path.as_ref(), &serde_json::to_string_pretty(self)?, &text)?;
        Ok(text)
    }

    /// Colored terminal version of the headline deltas.
    pub fn print(&self) {
        println!();
        println!("{}", " BASELINE vs CANDIDATE ".bold().on_blue());
        println!();
        for d in &self.deltas {
            let (arrow, delta_str) = if d.delta == 0.0 {
                ("→", format_delta(d).dimmed().to_string())
            } else if d.improved() {
                (if d.delta > 0.0 { "↑" } else { "↓" }, format_delta(d).green().to_string())
            } else {
                (if d.delta > 0.0 { "↑" } else { "↓" }, format_delta(d).red().to_string())
            };
            let (before, after) = if d.is_rate() {
                (format!("{:.1}%", d.baseline * 100.0), format!("{:.1}%", d.candidate * 100.0))
            } else {
                (format!("{:.2}", d.baseline), format!("{:.2}", d.candidate))
            };
            println!("  {:<24} {:>7} {} {:<7} ({})", d.name.bold(), before, arrow, after, delta_str);
        }
        println!();
    }
}

fn format_delta(d: &MetricDelta) -> String {
    if d.is_rate() {
        format!("{:+.1}%", d.delta * 100.0)
    } else {
        format!("{:+.2}", d.delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::metrics::evaluate;
    use crate::types::{ClockType, Prediction, Sample};

    fn metrics(preds: &[Prediction]) -> MetricSet {
        let truths: Vec<Sample> = (0..preds.len())
            .map(|i| Sample::new(format!("clock_{:04}_analog.png", i), ClockType::Analog, 3, 15))
            .collect();
        evaluate(preds, &truths).unwrap()
    }

    #[test]
    fn test_comparison_deltas() {
        let baseline = metrics(&[Prediction::new(4, 15, 0.5), Prediction::new(3, 40, 0.5)]);
        let candidate = metrics(&[Prediction::new(3, 15, 0.9), Prediction::new(3, 20, 0.9)]);

        let cmp = Comparison::new(&baseline, &candidate);
        let exact = cmp.delta("exact_match").unwrap();
        assert!((exact.delta - 0.5).abs() < 1e-9);
        assert!(exact.improved());

        let minute_mae = cmp.delta("minute_mae").unwrap();
        assert!(minute_mae.delta < 0.0);
        assert!(minute_mae.improved(), "lower error is an improvement");
    }

    #[test]
    fn test_comparison_render_mentions_prompt_growth() {
        let m = metrics(&[Prediction::new(3, 15, 0.9)]);
        let text = Comparison::new(&m, &m)
            .with_prompts("short", "a much longer\nprompt")
            .render();
        assert!(text.contains("exact_match"));
        assert!(text.contains("Prompt length: 5 → 20 chars (+15), 1 → 2 lines (+1)"));
        assert!(text.contains("a much longer"));
    }

    #[test]
    fn test_render_summary_lists_clock_types() {
        let m = metrics(&[Prediction::new(3, 15, 0.9), Prediction::invalid("timeout")]);
        let text = render_summary(&m);
        assert!(text.contains("Total samples: 2 (1 with a usable reading)"));
        assert!(text.contains("Exact match: 50.00%"));
        assert!(text.contains("ANALOG"));
    }

    #[test]
    fn test_write_reports_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("baseline_evaluation.json");
        let m = metrics(&[Prediction::new(3, 15, 0.9)]);

        let summary = write_reports(&m, &path).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(summary_path(&path)).unwrap(), summary);

        let loaded = EvaluationReport::load(&path).unwrap();
        assert_eq!(loaded.metrics, m);
    }
}
