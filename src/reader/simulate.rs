//! Offline stand-ins for the model: a reader and a rewriter.
//!
//! Used by `--simulate` dry runs and by tests. Both are deterministic.
//!
//! [`SimulatedReader`] answers from ground truth but makes the classic
//! clock-reading mistakes. Which mistake an image provokes is fixed by a hash
//! of its file name; the mistake is avoided when the prompt addresses the
//! matching pitfall. So a prompt that covers more pitfalls reads strictly
//! more clocks correctly, which gives the optimizer something real to climb.
//!
//! [`ChecklistRewriter`] is the matching rewriter: it adds the fix for one
//! pitfall the feedback names and the prompt does not yet cover.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::reader::parse::parse_prediction;
use crate::reader::PredictionSource;
use crate::training::feedback::PITFALLS;
use crate::training::rewriter::PromptRewriter;
use crate::types::{ClockType, Prediction, Sample};

/// FNV-1a, stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Index into [`PITFALLS`] of each simulated mistake.
const HAND_CONFUSION: usize = 0;
const WRAP_AROUND: usize = 1;
const MINUTE_TIMES_FIVE: usize = 2;
const TWELVE_HOUR: usize = 3;

/// Deterministic reader that knows the answers and makes human mistakes.
#[derive(Debug, Clone, Default)]
pub struct SimulatedReader {
    truths: HashMap<PathBuf, (ClockType, u8, u8)>,
}

impl SimulatedReader {
    pub fn new(samples: &[Sample]) -> Self {
        let truths = samples
            .iter()
            .map(|s| (s.image_ref.clone(), (s.clock_type, s.true_hour, s.true_minute)))
            .collect();
        Self { truths }
    }

    /// The raw text the simulated model would send back.
    pub fn respond(&self, image: &Path, prompt: &str) -> Result<String> {
        let &(clock_type, hour, minute) = self
            .truths
            .get(image)
            .ok_or_else(|| Error::Transport(format!("image not found: {}", image.display())))?;

        let key = image.file_name().map(|n| n.to_string_lossy()).unwrap_or_else(|| image.to_string_lossy());
        let hash = fnv1a(key.as_bytes());
        let wants_json = prompt.to_lowercase().contains("json");

        if !wants_json && hash % 5 == 0 {
            return Ok(format!("It looks like roughly {} o'clock to me.", hour % 12));
        }

        let lucky = hash % 8 < 2;
        let mistake = ((hash >> 3) % PITFALLS.len() as u64) as usize;
        let applies = match clock_type {
            ClockType::Analog => true,
            ClockType::Digital | ClockType::Word => mistake == WRAP_AROUND || mistake == TWELVE_HOUR,
        };
        let avoided = lucky || !applies || PITFALLS[mistake].addressed_by(prompt);

        let (h, m) = if avoided {
            (hour, minute)
        } else {
            match mistake {
                HAND_CONFUSION => (((minute / 5) % 12 + (hour / 12) * 12) % 24, (hour % 12) * 5),
                WRAP_AROUND => ((hour + 23) % 24, minute),
                MINUTE_TIMES_FIVE => (hour, minute / 5),
                _ => ((hour + 12) % 24, minute),
            }
        };

        let confidence = 0.5 + 0.1 * crate::training::feedback::pitfall_coverage(prompt) as f64;
        let body = format!(r#"{{"hour": {}, "minute": {}, "confidence": {:.2}}}"#, h, m, confidence);
        Ok(if hash % 3 == 0 {
            format!("```json\n{}\n```", body)
        } else {
            body
        })
    }
}

impl PredictionSource for SimulatedReader {
    fn predict(&self, image: &Path, prompt: &str) -> Result<Prediction> {
        let response = self.respond(image, prompt)?;
        Ok(parse_prediction(&response))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Offline rewriter: adds one missing pitfall fix per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecklistRewriter;

const CHECKLIST_HEADING: &str = "Checklist:";

impl PromptRewriter for ChecklistRewriter {
    fn improve(&self, current: &str, feedback: &str) -> Result<String> {
        let next = PITFALLS
            .iter()
            .find(|p| feedback.contains(p.issue) && !p.addressed_by(current));

        let Some(pitfall) = next else {
            return Ok(current.to_string());
        };

        let mut revised = current.trim_end().to_string();
        if !revised.contains(CHECKLIST_HEADING) {
            revised.push_str("\n\n");
            revised.push_str(CHECKLIST_HEADING);
        }
        revised.push_str("\n- ");
        revised.push_str(pitfall.fix);
        Ok(revised)
    }

    fn name(&self) -> &str {
        "checklist"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate;
    use crate::reader::read_batch;
    use crate::training::feedback::pitfall_coverage;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let clock_type = ClockType::ALL[i % 3];
                Sample::new(
                    format!("clock_{:04}_{}.png", i, clock_type),
                    clock_type,
                    (i * 5 % 24) as u8,
                    (i * 13 % 60) as u8,
                )
            })
            .collect()
    }

    #[test]
    fn test_deterministic() {
        let data = samples(10);
        let reader = SimulatedReader::new(&data);
        let a = read_batch(&reader, &data, "Return JSON.");
        let b = read_batch(&reader, &data, "Return JSON.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_image_is_error() {
        let reader = SimulatedReader::new(&samples(2));
        assert!(reader.predict(Path::new("missing.png"), "JSON").is_err());
    }

    #[test]
    fn test_covering_pitfalls_never_hurts() {
        let data = samples(120);
        let reader = SimulatedReader::new(&data);

        let bare = "Read the clock. Answer in JSON.";
        let all_fixes = format!(
            "{}\n{}",
            bare,
            PITFALLS.iter().map(|p| p.fix).collect::<Vec<_>>().join("\n")
        );

        let bare_preds = read_batch(&reader, &data, bare);
        let full_preds = read_batch(&reader, &data, &all_fixes);

        for ((b, f), s) in bare_preds.iter().zip(&full_preds).zip(&data) {
            if b.matches(s) {
                assert!(f.matches(s), "fix broke {}", s.id);
            }
        }
        let full = evaluate(&full_preds, &data).unwrap();
        assert_eq!(full.combined.exact_match_accuracy, 1.0);
        assert!(evaluate(&bare_preds, &data).unwrap().combined.exact_match_accuracy < 1.0);
    }

    #[test]
    fn test_checklist_rewriter_adds_one_fix() {
        let feedback: String = PITFALLS.iter().map(|p| p.issue).collect::<Vec<_>>().join("\n");
        let rewriter = ChecklistRewriter;

        let once = rewriter.improve("Read the clock.", &feedback).unwrap();
        assert_eq!(pitfall_coverage(&once), 1);
        assert!(once.contains(CHECKLIST_HEADING));

        let twice = rewriter.improve(&once, &feedback).unwrap();
        assert_eq!(pitfall_coverage(&twice), 2);
        assert_eq!(twice.matches(CHECKLIST_HEADING).count(), 1);
    }

    #[test]
    fn test_checklist_rewriter_unchanged_when_covered() {
        let feedback: String = PITFALLS.iter().map(|p| p.issue).collect::<Vec<_>>().join("\n");
        let covered = PITFALLS.iter().map(|p| p.fix).collect::<Vec<_>>().join("\n");
        assert_eq!(ChecklistRewriter.improve(&covered, &feedback).unwrap(), covered);
    }
}
