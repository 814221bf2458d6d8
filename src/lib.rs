//! clocktune - prompt evaluation and optimization for clock reading
//!
//! Measures how well a multimodal model reads the time off clock images under
//! a given prompt, and improves the prompt in a closed loop.
//!
//! # Architecture
//!
//! ```text
//! Dataset → PredictionSource(prompt) → Metric Engine → Feedback → PromptRewriter
//!    ↓             ↓                         ↓              ↓            ↓
//! metadata     OpenAI / simulated       circular        failures +   candidate → re-score
//!  .json        + lenient parse          errors          checklist      → keep if better
//! ```
//!
//! # Scoring
//!
//! - Hours live on a 24-ring, minutes on a 60-ring, time of day on a 1440-ring;
//!   errors are the shorter way round
//! - Unreadable answers count against accuracy but not against error size
//! - The optimizer's score is exact-match accuracy

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod reader;
pub mod training;
pub mod types;

pub use error::{Error, Result};
pub use types::{ClockType, OptimizationRecord, Prediction, PromptCandidate, RecordStatus, Sample};

pub use evaluation::{evaluate, Comparison, MetricSet};
pub use reader::{read_batch, PredictionSource};
pub use training::{Optimizer, OptimizerConfig, PromptRewriter};
