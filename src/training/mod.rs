//! Closed-loop prompt optimization.
//!
//! Observe failures under the current prompt, describe them in text, ask a
//! rewriter for a revised prompt, keep the revision only if it scores
//! strictly better on held-out samples. The "gradient" is the feedback text.
//!
//! - [`seeds`]: built-in starting prompts
//! - [`feedback`]: failure collection, pitfall checklist, feedback text
//! - [`rewriter`]: the rewriter trait and CLI-agent rewriters
//! - [`optimizer`]: the loop itself
//! - [`progress`]: terminal sparklines while the loop runs
//!
//! ## Usage
//!
//! ```bash
//! # Optimize against the API
//! clocktune optimize --dataset dataset --iterations 3 --samples 15
//!
//! # Dry run, no network
//! clocktune optimize --dataset dataset --simulate --seed 7
//! ```

pub mod feedback;
pub mod optimizer;
pub mod progress;
pub mod rewriter;
pub mod seeds;

pub use feedback::{build_feedback, collect_failures, pitfall_coverage, FailureExample, Pitfall, PITFALLS};
pub use optimizer::{FailurePolicy, OptimizationOutcome, Optimizer, OptimizerConfig};
pub use progress::LiveProgress;
pub use rewriter::{call_agent, Agent, AgentRewriter, PromptRewriter};
pub use seeds::{default_seeds, BASELINE_PROMPT};
