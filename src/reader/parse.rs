//! Turning free-form model output into a [`Prediction`].
//!
//! Models asked for JSON still wrap it in code fences, prepend prose, or
//! quote the numbers. Parsing is lenient about all of that and never fails:
//! anything unusable becomes an invalid prediction that carries the reason
//! and the raw text.

use serde_json::Value;

use crate::types::Prediction;

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence if present.
pub fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Find the JSON object in a response: whole text first, then the outermost braces.
pub fn extract_json(text: &str) -> Option<Value> {
    let body = strip_code_fence(text);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Integer field that may arrive as a number or a numeric string.
fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a model response into a prediction.
///
/// Out-of-range or negative hours/minutes are unset. A missing confidence is
/// 0.0; present values are clamped to [0, 1].
pub fn parse_prediction(response: &str) -> Prediction {
    let Some(json) = extract_json(response) else {
        return Prediction::invalid("Failed to parse response").with_raw_response(response);
    };

    let hour = int_field(&json, "hour").and_then(|h| u8::try_from(h).ok()).filter(|h| *h < 24);
    let minute = int_field(&json, "minute").and_then(|m| u8::try_from(m).ok()).filter(|m| *m < 60);
    let confidence = float_field(&json, "confidence").unwrap_or(0.0).clamp(0.0, 1.0);

    let error = match (hour, minute) {
        (Some(_), Some(_)) => None,
        (None, None) => Some("No valid hour or minute in response".to_string()),
        (None, Some(_)) => Some("No valid hour in response".to_string()),
        (Some(_), None) => Some("No valid minute in response".to_string()),
    };

    let mut prediction = Prediction {
        hour,
        minute,
        confidence,
        error,
        raw_response: None,
    };
    if prediction.error.is_some() {
        prediction.raw_response = Some(response.to_string());
    }
    prediction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let p = parse_prediction(r#"{"hour": 14, "minute": 5, "confidence": 0.8}"#);
        assert_eq!(p.hour, Some(14));
        assert_eq!(p.minute, Some(5));
        assert!((p.confidence - 0.8).abs() < 1e-9);
        assert!(p.error.is_none());
    }

    #[test]
    fn test_fenced_json() {
        let p = parse_prediction("```json\n{\"hour\": 3, \"minute\": 15, \"confidence\": 0.9}\n```");
        assert_eq!(p.hour, Some(3));
        assert_eq!(p.minute, Some(15));
    }

    #[test]
    fn test_json_after_prose() {
        let p = parse_prediction("The clock shows:\n{\"hour\": \"7\", \"minute\": \"45\"}\nHope this helps.");
        assert_eq!(p.hour, Some(7));
        assert_eq!(p.minute, Some(45));
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_garbage_becomes_invalid() {
        let p = parse_prediction("I cannot read this clock.");
        assert!(p.hour.is_none());
        assert!(p.minute.is_none());
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.error.as_deref(), Some("Failed to parse response"));
        assert_eq!(p.raw_response.as_deref(), Some("I cannot read this clock."));
    }

    #[test]
    fn test_out_of_range_fields_unset() {
        let p = parse_prediction(r#"{"hour": -1, "minute": 75, "confidence": 3}"#);
        assert!(p.hour.is_none());
        assert!(p.minute.is_none());
        assert_eq!(p.confidence, 1.0);
        assert!(p.error.is_some());
    }

    #[test]
    fn test_partial_reading_keeps_valid_field() {
        let p = parse_prediction(r#"{"hour": 9, "confidence": 0.4}"#);
        assert_eq!(p.hour, Some(9));
        assert!(p.minute.is_none());
        assert_eq!(p.error.as_deref(), Some("No valid minute in response"));
    }
}
