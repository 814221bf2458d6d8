//! Clock dataset loading and sampling.
//!
//! A dataset directory holds the rendered images plus `metadata.json`, a
//! list of records:
//!
//! ```json
//! [
//!   {"filename": "clock_0000_analog.png", "clock_type": "analog",
//!    "hour": 14, "minute": 37, "time_string": "14:37"}
//! ]
//! ```
//!
//! Rendering the images is someone else's job; this module only reads the
//! records, validates them, and hands out train/validation partitions and
//! random subsamples.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ClockType, Sample};

pub const METADATA_FILE: &str = "metadata.json";

/// One record of `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub clock_type: ClockType,
    pub hour: i64,
    pub minute: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_string: Option<String>,
}

/// Samples in metadata order, with image paths resolved against `root`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub root: PathBuf,
    pub samples: Vec<Sample>,
}

impl Dataset {
    /// Load `<dir>/metadata.json`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let path = root.join(METADATA_FILE);
        if !path.exists() {
            return Err(Error::dataset(&path, "metadata file not found"));
        }

        let content = std::fs::read_to_string(&path)?;
        let records: Vec<MetadataRecord> = serde_json::from_str(&content)
            .map_err(|e| Error::dataset(&path, format!("invalid metadata: {}", e)))?;

        Self::from_records(root, records).map_err(|reason| Error::dataset(&path, reason))
    }

    /// Validate records and resolve image paths.
    pub fn from_records(root: PathBuf, records: Vec<MetadataRecord>) -> std::result::Result<Self, String> {
        let mut samples = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            let hour = u8::try_from(record.hour)
                .ok()
                .filter(|h| *h < 24)
                .ok_or_else(|| format!("record {} ({}): hour {} out of range", i, record.filename, record.hour))?;
            let minute = u8::try_from(record.minute)
                .ok()
                .filter(|m| *m < 60)
                .ok_or_else(|| format!("record {} ({}): minute {} out of range", i, record.filename, record.minute))?;

            samples.push(Sample {
                id: record.filename.clone(),
                image_ref: root.join(&record.filename),
                clock_type: record.clock_type,
                true_hour: hour,
                true_minute: minute,
            });
        }

        Ok(Self { root, samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep only samples of the given clock types.
    pub fn filter_types(mut self, types: &[ClockType]) -> Self {
        if !types.is_empty() {
            self.samples.retain(|s| types.contains(&s.clock_type));
        }
        self
    }

    /// First `n` samples (metadata order).
    pub fn head(&self, n: usize) -> &[Sample] {
        &self.samples[..n.min(self.samples.len())]
    }

    /// Last `n` samples (metadata order).
    pub fn tail(&self, n: usize) -> &[Sample] {
        let n = n.min(self.samples.len());
        &self.samples[self.samples.len() - n..]
    }
}

/// Shuffle once and split into (train, validation).
///
/// `train_ratio` of the samples (floored) go to train.
pub fn split<R: Rng + ?Sized>(samples: &[Sample], train_ratio: f64, rng: &mut R) -> (Vec<Sample>, Vec<Sample>) {
    let mut shuffled = samples.to_vec();
    shuffled.shuffle(rng);

    let ratio = train_ratio.clamp(0.0, 1.0);
    let split_idx = (shuffled.len() as f64 * ratio) as usize;
    let validation = shuffled.split_off(split_idx);
    (shuffled, validation)
}

/// Random subsample of up to `n` samples, without replacement.
pub fn subsample<R: Rng + ?Sized>(samples: &[Sample], n: usize, rng: &mut R) -> Vec<Sample> {
    samples
        .choose_multiple(rng, n.min(samples.len()))
        .cloned()
        .collect()
}
