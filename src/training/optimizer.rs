//! The prompt optimization loop.
//!
//! ```text
//! seeds ──score on validation──► best
//!   loop:
//!     train subsample ──read with best──► metrics + failures
//!     feedback ──rewriter──► candidate
//!     candidate ──score on validation──► replace best only if strictly better
//!     append record
//! ```
//!
//! State carried across iterations is just the best prompt, its score, and
//! the history. Every iteration appends exactly one record, whatever
//! happened, so the history length equals the number of iterations attempted.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::feedback::{build_feedback, collect_failures};
use super::progress::LiveProgress;
use super::rewriter::PromptRewriter;
use crate::dataset::{split, subsample};
use crate::error::{Error, Result};
use crate::evaluation::evaluate;
use crate::reader::{read_batch, PredictionSource};
use crate::types::{OptimizationRecord, PromptCandidate, RecordStatus, Sample};

/// What to do when the rewriter fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the best prompt and go on to the next iteration
    #[default]
    Continue,
    /// End the loop early, keeping what was found so far
    Stop,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "stop" => Ok(FailurePolicy::Stop),
            _ => Err(format!("Unknown failure policy: {}. Use 'continue' or 'stop'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OptimizerConfig {
    pub num_iterations: usize,
    /// Training samples read per iteration
    pub samples_per_iteration: usize,
    /// Validation samples used to score each seed
    pub seed_eval_samples: usize,
    /// Validation samples used to score each candidate
    pub validation_samples: usize,
    pub train_ratio: f64,
    pub max_failure_examples: usize,
    pub on_rewrite_failure: FailurePolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            num_iterations: 3,
            samples_per_iteration: 15,
            seed_eval_samples: 10,
            validation_samples: 15,
            train_ratio: 0.7,
            max_failure_examples: 5,
            on_rewrite_failure: FailurePolicy::Continue,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(Error::Config(format!(
                "train-ratio must be strictly between 0 and 1, got {}",
                self.train_ratio
            )));
        }
        if self.samples_per_iteration == 0 || self.seed_eval_samples == 0 || self.validation_samples == 0 {
            return Err(Error::Config("sample counts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub best_prompt: PromptCandidate,
    /// Validation score of `best_prompt` when it was selected
    pub best_score: f64,
    /// Score of the seed that started the loop
    pub initial_score: f64,
    /// One score per seed, in seed order
    pub seed_scores: Vec<f64>,
    pub history: Vec<OptimizationRecord>,
}

pub struct Optimizer<S, W, G> {
    source: S,
    rewriter: W,
    config: OptimizerConfig,
    rng: G,
    progress: Option<LiveProgress>,
}

impl<S, W, G> Optimizer<S, W, G>
where
    S: PredictionSource,
    W: PromptRewriter,
    G: Rng,
{
    pub fn new(source: S, rewriter: W, config: OptimizerConfig, rng: G) -> Self {
        Self {
            source,
            rewriter,
            config,
            rng,
            progress: None,
        }
    }

    /// Redraw a sparkline progress line on stdout after every iteration.
    pub fn with_live_progress(mut self) -> Self {
        self.progress = Some(LiveProgress::new());
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Exact-match score of `prompt` on `samples`.
    fn score(&self, prompt: &str, samples: &[Sample]) -> Result<f64> {
        let predictions = read_batch(&self.source, samples, prompt);
        Ok(evaluate(&predictions, samples)?.score())
    }

    /// Run the loop over `dataset`, starting from the best of `seeds`.
    pub fn optimize(&mut self, dataset: &[Sample], seeds: &[PromptCandidate]) -> Result<OptimizationOutcome> {
        self.config.validate()?;
        if seeds.is_empty() {
            return Err(Error::Config("no seed prompts to start from".into()));
        }
        if dataset.is_empty() {
            return Err(Error::Config("dataset is empty".into()));
        }

        let (mut train, mut validation) = split(dataset, self.config.train_ratio, &mut self.rng);
        if train.is_empty() {
            train = validation.clone();
        } else if validation.is_empty() {
            validation = train.clone();
        }
        info!(
            train = train.len(),
            validation = validation.len(),
            source = self.source.name(),
            rewriter = self.rewriter.name(),
            "starting optimization"
        );

        // Seed selection
        let mut seed_scores = Vec::with_capacity(seeds.len());
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, seed) in seeds.iter().enumerate() {
            let batch = subsample(&validation, self.config.seed_eval_samples, &mut self.rng);
            let score = self.score(&seed.text, &batch)?;
            info!(seed = i + 1, score, "scored seed prompt");
            if score > best_score {
                best_idx = i;
                best_score = score;
            }
            seed_scores.push(score);
        }
        if best_score == 0.0 {
            warn!("every seed scored 0, starting from the first seed");
            best_idx = 0;
        }

        let mut best = seeds[best_idx].clone();
        let initial_score = best_score;
        let mut history: Vec<OptimizationRecord> = Vec::with_capacity(self.config.num_iterations);
        info!(seed = best_idx + 1, score = best_score, "selected starting prompt");

        for iteration in 1..=self.config.num_iterations {
            let record = if !best.trainable {
                debug!(iteration, "best prompt is frozen, skipping");
                OptimizationRecord {
                    iteration,
                    score_before: best_score,
                    score_after: best_score,
                    improvement: 0.0,
                    prompt_text: best.text.clone(),
                    status: RecordStatus::Skipped,
                    error: None,
                }
            } else {
                let batch = subsample(&train, self.config.samples_per_iteration, &mut self.rng);
                let predictions = read_batch(&self.source, &batch, &best.text);
                let metrics = evaluate(&predictions, &batch)?;
                let train_score = metrics.score();
                info!(iteration, train_score, samples = batch.len(), "evaluated current prompt");

                let failures = collect_failures(&predictions, &batch, self.config.max_failure_examples);
                let feedback = build_feedback(&metrics, &failures, &history);
                debug!(iteration, failures = failures.len(), "built feedback");

                match self.rewriter.improve(&best.text, &feedback) {
                    Err(e) => {
                        warn!(iteration, "prompt rewrite failed: {}", e);
                        OptimizationRecord {
                            iteration,
                            score_before: train_score,
                            score_after: best_score,
                            improvement: 0.0,
                            prompt_text: best.text.clone(),
                            status: RecordStatus::RewriteFailed,
                            error: Some(e.to_string()),
                        }
                    }
                    Ok(candidate) if candidate.trim() == best.text.trim() => {
                        info!(iteration, "rewriter returned the same prompt");
                        OptimizationRecord {
                            iteration,
                            score_before: train_score,
                            score_after: best_score,
                            improvement: 0.0,
                            prompt_text: candidate,
                            status: RecordStatus::Unchanged,
                            error: None,
                        }
                    }
                    Ok(candidate) => {
                        let batch = subsample(&validation, self.config.validation_samples, &mut self.rng);
                        let candidate_score = self.score(&candidate, &batch)?;
                        let improvement = candidate_score - best_score;

                        let status = if candidate_score > best_score {
                            info!(iteration, candidate_score, improvement, "accepted new prompt");
                            best = PromptCandidate::new(candidate.clone());
                            best_score = candidate_score;
                            RecordStatus::Accepted
                        } else {
                            info!(iteration, candidate_score, best_score, "kept previous prompt");
                            RecordStatus::Rejected
                        };

                        OptimizationRecord {
                            iteration,
                            score_before: train_score,
                            score_after: candidate_score,
                            improvement,
                            prompt_text: candidate,
                            status,
                            error: None,
                        }
                    }
                }
            };

            let status = record.status;
            if let Some(progress) = self.progress.as_mut() {
                progress.record(&record, best_score);
                progress.display(iteration, self.config.num_iterations, status);
            }
            history.push(record);

            if status == RecordStatus::RewriteFailed && self.config.on_rewrite_failure == FailurePolicy::Stop {
                warn!(iteration, "stopping after rewrite failure");
                break;
            }
        }

        if let Some(progress) = &self.progress {
            progress.final_summary(initial_score);
        }

        Ok(OptimizationOutcome {
            best_prompt: best,
            best_score,
            initial_score,
            seed_scores,
            history,
        })
    }
}
