//! Built-in seed prompts.
//!
//! The optimizer starts from whichever seed scores best on a validation
//! subsample. All seeds ask for the same JSON shape so [`parse_prediction`]
//! can read any of them.
//!
//! [`parse_prediction`]: crate::reader::parse_prediction

use crate::types::PromptCandidate;

/// Plain reading prompt used by `evaluate` when no prompt file is given.
pub const BASELINE_PROMPT: &str = r#"Look at this clock image and tell me the exact time it shows.

Respond in JSON only:
{
    "hour": hour (0-23),
    "minute": minute (0-59),
    "confidence": confidence (0.0-1.0)
}"#;

const SEED_CONCISE: &str = r#"Analyze this clock image and determine the exact time.

Response format:
{
    "hour": hour (0-23),
    "minute": minute (0-59),
    "confidence": confidence (0.0-1.0)
}

Instructions:
- Short thick hand = HOUR hand
- Long thin hand = MINUTE hand
- Read the minute hand first: multiply the number it points to by 5
- Read the hour hand: if it is between two numbers, use the smaller one
- Convert to 24-hour format
- Respond only in JSON format"#;

const SEED_STEPWISE: &str = r#"Read this clock carefully following these steps:

Step 1: Identify the hands
- HOUR hand: short and thick
- MINUTE hand: long and thin

Step 2: Read the MINUTE hand
- Find which number the long hand points to
- Calculate: number x 5 = minutes
- Examples: points to 3 = 15 minutes, points to 6 = 30 minutes

Step 3: Read the HOUR hand
- The short hand indicates the hour
- If it is between two numbers, choose the smaller number
- Example: between 2 and 3 = hour is 2

Step 4: Format the response
{
    "hour": hour (0-23),
    "minute": minute (0-59),
    "confidence": confidence (0.0-1.0)
}

JSON only."#;

const SEED_PROTOCOL: &str = r#"CLOCK READING PROTOCOL

HAND IDENTIFICATION:
- Hour hand: SHORT and THICK
- Minute hand: LONG and THIN

MINUTE CALCULATION:
- Locate the long (minute) hand
- Identify the number it points to (1-12)
- Formula: number x 5 = minutes
- Special case: 12 = 0 minutes

HOUR CALCULATION:
- Locate the short (hour) hand
- Read the number it has passed or is on
- If between numbers, use the lower number
- The hour hand moves gradually between hours

DIGITAL AND WORD CLOCKS:
- Digital: read the digits directly, keep 24-hour format
- Words: convert the spelled-out time to numbers

COMMON MISTAKES TO AVOID:
- Don't confuse hour and minute hands
- Don't round the hour up when the hand is past a number
- Don't forget the wrap-around from 11 to 12 and from 23 to 0

OUTPUT FORMAT:
{
    "hour": hour (0-23),
    "minute": minute (0-59),
    "confidence": confidence (0.0-1.0)
}

Return JSON only."#;

/// The three built-in seeds, shortest first.
pub fn default_seeds() -> Vec<PromptCandidate> {
    [SEED_CONCISE, SEED_STEPWISE, SEED_PROTOCOL]
        .into_iter()
        .map(PromptCandidate::new)
        .collect()
}
