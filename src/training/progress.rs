//! Live optimization progress for the terminal.
//!
//! One line per iteration, redrawn in place: training score and candidate
//! score sparklines, the best score so far, and the last record status.

use std::io::Write;

use owo_colors::OwoColorize;

use crate::types::{OptimizationRecord, RecordStatus};

#[derive(Debug, Clone, Default)]
pub struct LiveProgress {
    training_history: Vec<f64>,
    candidate_history: Vec<f64>,
    best_history: Vec<f64>,
    accepted: usize,
    failed_rewrites: usize,
}

impl LiveProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration and the best score after it.
    pub fn record(&mut self, record: &OptimizationRecord, best_score: f64) {
        self.training_history.push(record.score_before);
        self.candidate_history.push(record.score_after);
        self.best_history.push(best_score);
        match record.status {
            RecordStatus::Accepted => self.accepted += 1,
            RecordStatus::RewriteFailed => self.failed_rewrites += 1,
            _ => {}
        }
    }

    pub fn iterations(&self) -> usize {
        self.best_history.len()
    }

    /// Sparkline of scores on a fixed 0..=1 scale.
    ///
    /// Shows the newest `width` scores, left-aligned and padded with spaces,
    /// so a flat run at 0 stays at the bottom instead of being rescaled.
    pub fn sparkline(scores: &[f64], width: usize) -> String {
        const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

        let recent = &scores[scores.len().saturating_sub(width)..];
        recent
            .iter()
            .map(|score| {
                let level = (score.clamp(0.0, 1.0) * (BARS.len() - 1) as f64).round() as usize;
                BARS[level.min(BARS.len() - 1)]
            })
            .chain(std::iter::repeat(' '))
            .take(width)
            .collect()
    }

    /// Redraw the progress line.
    pub fn display(&self, iteration: usize, total: usize, status: RecordStatus) {
        let width = 20;

        print!("\x1b[2K\r");
        print!("I{:2}/{} ", iteration, total);

        if let Some(last) = self.training_history.last() {
            print!("Train[{}]{:.3} ", Self::sparkline(&self.training_history, width), last);
        }
        if let Some(last) = self.candidate_history.last() {
            print!("Cand[{}]{:.3} ", Self::sparkline(&self.candidate_history, width), last);
        }
        if let Some(best) = self.best_history.last() {
            print!("best={:.3} ", best);
        }

        match status {
            RecordStatus::Accepted => print!("{}", "accepted".green()),
            RecordStatus::RewriteFailed => print!("{}", "rewrite failed".red()),
            other => print!("{}", other.to_string().dimmed()),
        }

        std::io::stdout().flush().ok();
    }

    /// Print the closing summary.
    pub fn final_summary(&self, initial_best: f64) {
        println!("\n");
        println!("{}", " OPTIMIZATION COMPLETE ".bold().on_green());
        println!();

        if let Some(last) = self.best_history.last() {
            let delta = last - initial_best;
            let (arrow, delta_str) = if delta > 0.0 {
                ("↑", format!("{:+.4}", delta).green().to_string())
            } else {
                ("→", format!("{:+.4}", delta).dimmed().to_string())
            };
            println!(
                "  {}: {:.4} {} {:.4}  ({})",
                "Exact match".bold(),
                initial_best,
                arrow,
                last,
                delta_str
            );
            println!("          [{}]", Self::sparkline(&self.best_history, 40).cyan());
        }

        if !self.candidate_history.is_empty() {
            println!("  {}:", "Candidates".bold());
            println!("          [{}]", Self::sparkline(&self.candidate_history, 40).cyan());
        }

        println!(
            "  {} accepted, {} rewrite failures over {} iterations",
            self.accepted,
            self.failed_rewrites,
            self.iterations()
        );
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_shape() {
        assert_eq!(LiveProgress::sparkline(&[0.0, 0.5, 1.0], 5), "▁▅█  ");
        assert_eq!(LiveProgress::sparkline(&[], 3), "   ");

        // no rescaling: a flat run reads as its absolute level
        assert_eq!(LiveProgress::sparkline(&[0.0, 0.0], 2), "▁▁");
        assert_eq!(LiveProgress::sparkline(&[1.0, 1.0], 2), "██");
    }

    #[test]
    fn test_sparkline_keeps_newest() {
        assert_eq!(LiveProgress::sparkline(&[1.0, 1.0, 0.0, 0.0, 1.0], 3), "▁▁█");
        assert_eq!(LiveProgress::sparkline(&[0.2, 1.5, -1.0], 3), "▂█▁");
    }

    #[test]
    fn test_record_counts() {
        let mut progress = LiveProgress::new();
        let mut record = OptimizationRecord {
            iteration: 1,
            score_before: 0.2,
            score_after: 0.4,
            improvement: 0.2,
            prompt_text: "p".into(),
            status: RecordStatus::Accepted,
            error: None,
        };
        progress.record(&record, 0.4);
        record.status = RecordStatus::RewriteFailed;
        progress.record(&record, 0.4);

        assert_eq!(progress.iterations(), 2);
        assert_eq!(progress.accepted, 1);
        assert_eq!(progress.failed_rewrites, 1);
    }
}
