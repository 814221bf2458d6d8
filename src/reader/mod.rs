//! Prediction sources: something that looks at a clock image and answers.
//!
//! The trait is deliberately narrow, one image and one prompt in, one
//! reading out. Backends:
//!
//! - [`openai::OpenAiClient`]: multimodal chat-completions over HTTP
//! - [`simulate::SimulatedReader`]: deterministic offline stand-in
//!
//! [`read_batch`] is where failures are absorbed. A backend may return `Err`
//! for transport or parse problems; the batch turns that into an invalid
//! prediction for that sample and moves on. Order is preserved so results
//! zip back onto the samples by position.

pub mod openai;
pub mod parse;
pub mod simulate;

use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Prediction, Sample};

pub use parse::parse_prediction;

/// Reads the time from one clock image.
pub trait PredictionSource {
    /// Read `image` using `prompt`.
    ///
    /// Unparseable model output should come back as `Ok` with an invalid
    /// prediction; `Err` is for failures to get an answer at all.
    fn predict(&self, image: &Path, prompt: &str) -> Result<Prediction>;

    fn name(&self) -> &str;
}

impl<T: PredictionSource + ?Sized> PredictionSource for &T {
    fn predict(&self, image: &Path, prompt: &str) -> Result<Prediction> {
        (**self).predict(image, prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: PredictionSource + ?Sized> PredictionSource for Box<T> {
    fn predict(&self, image: &Path, prompt: &str) -> Result<Prediction> {
        (**self).predict(image, prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Read every sample in order. One prediction per sample, always.
pub fn read_batch<S: PredictionSource + ?Sized>(source: &S, samples: &[Sample], prompt: &str) -> Vec<Prediction> {
    let total = samples.len();

    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            debug!(
                source = source.name(),
                "reading {}/{}: {}",
                i + 1,
                total,
                sample.image_ref.display()
            );

            match source.predict(&sample.image_ref, prompt) {
                Ok(prediction) => {
                    if let Some(reason) = &prediction.error {
                        warn!(sample = %sample.id, "unusable reading: {}", reason);
                    }
                    prediction
                }
                Err(e) => {
                    warn!(sample = %sample.id, "prediction failed: {}", e);
                    Prediction::invalid(e.to_string())
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ClockType;
    use std::cell::Cell;

    /// Fails on every call whose index is in `fail_on`.
    struct Flaky {
        calls: Cell<usize>,
        fail_on: Vec<usize>,
    }

    impl PredictionSource for Flaky {
        fn predict(&self, _image: &Path, _prompt: &str) -> Result<Prediction> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if self.fail_on.contains(&n) {
                Err(Error::Transport("rate limited".into()))
            } else {
                Ok(Prediction::new(n as u8, 0, 1.0))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_batch_absorbs_failures_in_order() {
        let samples: Vec<Sample> = (0..4)
            .map(|i| Sample::new(format!("clock_{:04}_analog.png", i), ClockType::Analog, i, 0))
            .collect();
        let source = Flaky {
            calls: Cell::new(0),
            fail_on: vec![1],
        };

        let preds = read_batch(&source, &samples, "read the clock");

        assert_eq!(preds.len(), 4);
        assert_eq!(preds[0].hour, Some(0));
        assert!(preds[1].hour.is_none());
        assert!(preds[1].error.as_deref().unwrap().contains("rate limited"));
        assert_eq!(preds[2].hour, Some(2));
        assert_eq!(preds[3].hour, Some(3));
    }
}
