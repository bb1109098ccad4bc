//! Turns the raw AI flow reply into an [`AiAnalysis`].
//!
//! Every entry point here is total: malformed input yields
//! [`AiAnalysis::unstructured_fallback`] instead of an error.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::models::{AiAnalysis, BudgetTier, Intent};

const LOG_SNIPPET_GRAPHEMES: usize = 100;
const FLOW_TEXT_POINTER: &str = "/outputs/0/outputs/0/results/message/text";

#[derive(Debug, Error)]
enum NormalizeError {
    #[error("flow envelope has no message text at {FLOW_TEXT_POINTER}")]
    MissingText,
    #[error("reply is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("reply is JSON but not an object")]
    NotAnObject,
}

/// Pulls `outputs[0].outputs[0].results.message.text` out of the flow envelope.
pub fn extract_flow_text(envelope: &Value) -> Option<&str> {
    envelope.pointer(FLOW_TEXT_POINTER).and_then(Value::as_str)
}

/// Removes a leading ```` ``` ```` / ```` ```json ```` fence and a trailing ```` ``` ````.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => rest
            .get(..4)
            .filter(|tag| tag.eq_ignore_ascii_case("json"))
            .map(|_| &rest[4..])
            .unwrap_or(rest),
        None => trimmed,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn normalize_flow_response(envelope: &Value) -> AiAnalysis {
    match extract_flow_text(envelope) {
        Some(text) => normalize_text(text),
        None => {
            let err = NormalizeError::MissingText;
            error!(
                error = %err,
                snippet = %snippet(&envelope.to_string()),
                "ai flow reply rejected, using fallback"
            );
            AiAnalysis::unstructured_fallback()
        }
    }
}

pub fn normalize_text(text: &str) -> AiAnalysis {
    match parse_analysis(text) {
        Ok(analysis) => {
            info!(intent = analysis.intent.as_str(), "ai flow reply parsed");
            analysis
        }
        Err(err) => {
            error!(
                error = %err,
                snippet = %snippet(text),
                "ai flow reply rejected, using fallback"
            );
            AiAnalysis::unstructured_fallback()
        }
    }
}

fn parse_analysis(text: &str) -> Result<AiAnalysis, NormalizeError> {
    let value: Value = serde_json::from_str(strip_code_fences(text))?;
    let Value::Object(object) = value else {
        return Err(NormalizeError::NotAnObject);
    };

    let location = text_field(&object, "location")
        .filter(|value| !value.eq_ignore_ascii_case("any"));
    let budget = text_field(&object, "budget").and_then(|value| BudgetTier::parse(&value));
    let tags = match object.get("tags") {
        Some(value) if !value.is_null() => string_list(value),
        _ => object.get("venue_tags").map(string_list).unwrap_or_default(),
    };

    Ok(AiAnalysis {
        intent: text_field(&object, "intent")
            .map(|value| Intent::from_label(&value))
            .unwrap_or_default(),
        reasoning: text_field(&object, "reasoning"),
        chat_response: text_field(&object, "chat_response"),
        personality_profile: text_field(&object, "personality_profile"),
        gift_suggestion: text_field(&object, "gift_suggestion"),
        event_type: text_field(&object, "event_type"),
        location,
        budget,
        budget_per_head: number_field(object.get("budget_per_head")),
        guest_count: number_field(object.get("guest_count")) as u32,
        tags,
        missing_info: object.get("missing_info").map(string_list).unwrap_or_default(),
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// A bare string becomes a one-element list; non-string items are skipped.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(single) => {
            let single = single.trim();
            if single.is_empty() {
                Vec::new()
            } else {
                vec![single.to_string()]
            }
        }
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn number_field(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|number| number.is_finite() && *number > 0.0)
        .unwrap_or(0.0)
}

fn snippet(text: &str) -> String {
    text.graphemes(true).take(LOG_SNIPPET_GRAPHEMES).collect()
}
