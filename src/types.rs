//! Core types for clocktune.
//!
//! Samples and predictions are frozen once produced: a sample is owned by the
//! dataset, a prediction is made once per (sample, prompt) pair. Anything
//! that aggregates them (metrics, records) is recomputed rather than patched.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Serde helpers for fields where "unset" is written as `-1`.
///
/// The metadata and prediction documents use `-1` as the sentinel for a
/// missing reading, so `None` round-trips through that value. Values outside
/// the field's range read back as `None`, the same as [`Prediction::new`].
mod sentinel_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_i64(i64::from(*v)),
            None => serializer.serialize_i64(-1),
        }
    }

    fn deserialize_below<'de, D>(deserializer: D, ring: u8) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<i64> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(|v| u8::try_from(v).ok()).filter(|v| *v < ring))
    }

    pub mod hour {
        pub use super::serialize;

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
            super::deserialize_below(deserializer, 24)
        }
    }

    pub mod minute {
        pub use super::serialize;

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
            super::deserialize_below(deserializer, 60)
        }
    }
}

/// How the time is drawn on the clock face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockType {
    Analog,
    Digital,
    /// Time spelled out in words
    Word,
}

impl ClockType {
    pub const ALL: [ClockType; 3] = [ClockType::Analog, ClockType::Digital, ClockType::Word];

    pub fn as_str(self) -> &'static str {
        match self {
            ClockType::Analog => "analog",
            ClockType::Digital => "digital",
            ClockType::Word => "word",
        }
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analog" => Ok(ClockType::Analog),
            "digital" => Ok(ClockType::Digital),
            "word" => Ok(ClockType::Word),
            _ => Err(format!("Unknown clock type: {}. Use 'analog', 'digital', or 'word'", s)),
        }
    }
}

/// One ground-truth clock image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSample")]
pub struct Sample {
    /// Stable identifier (the image file name)
    pub id: String,
    /// Path to the rendered image
    pub image_ref: PathBuf,
    pub clock_type: ClockType,
    /// 0..=23
    pub true_hour: u8,
    /// 0..=59
    pub true_minute: u8,
}

/// Unchecked wire form of [`Sample`].
#[derive(Deserialize)]
struct RawSample {
    id: String,
    image_ref: PathBuf,
    clock_type: ClockType,
    true_hour: u8,
    true_minute: u8,
}

impl TryFrom<RawSample> for Sample {
    type Error = String;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        if raw.true_hour >= 24 {
            return Err(format!("{}: hour {} out of range 0-23", raw.id, raw.true_hour));
        }
        if raw.true_minute >= 60 {
            return Err(format!("{}: minute {} out of range 0-59", raw.id, raw.true_minute));
        }
        Ok(Self {
            id: raw.id,
            image_ref: raw.image_ref,
            clock_type: raw.clock_type,
            true_hour: raw.true_hour,
            true_minute: raw.true_minute,
        })
    }
}

impl Sample {
    pub fn new(id: impl Into<String>, clock_type: ClockType, hour: u8, minute: u8) -> Self {
        let id = id.into();
        Self {
            image_ref: PathBuf::from(&id),
            id,
            clock_type,
            true_hour: hour,
            true_minute: minute,
        }
    }

    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}", self.true_hour, self.true_minute)
    }
}

/// A model's reading of one image under one prompt.
///
/// `hour`/`minute` are `None` when the model gave no usable value. Errors
/// during reading never escape as `Err`; they become an invalid prediction
/// with `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(with = "sentinel_serde::hour", default)]
    pub hour: Option<u8>,
    #[serde(with = "sentinel_serde::minute", default)]
    pub minute: Option<u8>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl Prediction {
    /// A reading with both fields set. Out-of-range values are treated as unset.
    pub fn new(hour: u8, minute: u8, confidence: f64) -> Self {
        Self {
            hour: (hour < 24).then_some(hour),
            minute: (minute < 60).then_some(minute),
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
            raw_response: None,
        }
    }

    /// Placeholder for a failed read.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            hour: None,
            minute: None,
            confidence: 0.0,
            error: Some(reason.into()),
            raw_response: None,
        }
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    /// Both fields present.
    pub fn is_complete(&self) -> bool {
        self.hour.is_some() && self.minute.is_some()
    }

    /// Exact hour and minute match against a sample.
    pub fn matches(&self, sample: &Sample) -> bool {
        self.hour == Some(sample.true_hour) && self.minute == Some(sample.true_minute)
    }

    /// `HH:MM` with `--` for unset fields.
    pub fn time_string(&self) -> String {
        let part = |v: Option<u8>| v.map(|v| format!("{:02}", v)).unwrap_or_else(|| "--".to_string());
        format!("{}:{}", part(self.hour), part(self.minute))
    }
}

/// A prompt under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCandidate {
    pub text: String,
    /// Whether the rewriter may change this prompt
    #[serde(default = "default_trainable")]
    pub trainable: bool,
}

fn default_trainable() -> bool {
    true
}

impl PromptCandidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            trainable: true,
        }
    }

    pub fn frozen(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            trainable: false,
        }
    }
}

/// What happened to the candidate produced in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Candidate beat the best score and replaced the best prompt
    Accepted,
    /// Candidate was scored but did not beat the best score
    Rejected,
    /// Rewriter returned the same text; nothing to score
    Unchanged,
    /// Rewriter call failed; best prompt kept
    RewriteFailed,
    /// Best prompt is not trainable
    Skipped,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Accepted => "accepted",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Unchanged => "unchanged",
            RecordStatus::RewriteFailed => "rewrite failed",
            RecordStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One entry of the optimization ledger. Appended once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    /// 1-based iteration number
    pub iteration: usize,
    /// Exact-match score of the current best prompt on the training subsample
    pub score_before: f64,
    /// Validation score of the candidate (or the unchanged best score)
    pub score_after: f64,
    /// `score_after` minus the best score at the time
    pub improvement: f64,
    /// Candidate text (or the kept prompt when no candidate was produced)
    pub prompt_text: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
