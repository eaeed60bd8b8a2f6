/*
 * The flatten contract between the engine and the flatten service.
 * `build_request` turns the current selection into the request body;
 * `interpret_response` turns the service's answer into a display model with
 * normalized percentage labels and severity bands. The wire types mirror the
 * JSON the service exchanges (`{"paths": [...]}` in, `{"text", "token_count",
 * "model_percentages"}` out).
 */
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/* Sentinel `token_count` meaning the text was produced but could not be tokenized. */
pub const TOKENIZATION_FAILED: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenRequest {
    pub paths: Vec<PathBuf>,
}

/*
 * A model's share of its context window as reported by the service. The
 * percentage is kept as a raw JSON value because producers are not required to
 * send a number; anything that does not parse as a finite, non-negative float
 * is shown as "N/A".
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPercentage {
    pub name: String,
    #[serde(default)]
    pub percentage: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlattenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub token_count: i64,
    #[serde(default)]
    pub model_percentages: Vec<ModelPercentage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Counted(u64),
    TokenizationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSeverity {
    Unavailable,
    Neutral,
    Low,
    Medium,
    High,
    OverBudget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelUsage {
    pub name: String,
    pub percentage: Option<f64>,
    pub label: String,
    pub severity: UsageSeverity,
}

/*
 * What the front end shows after a flatten call. `text_available` is false when
 * the service sent no text and `text` holds a synthesized error message instead.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayModel {
    pub text: String,
    pub text_available: bool,
    pub token_status: TokenStatus,
    pub models: Vec<ModelUsage>,
}

impl DisplayModel {
    /*
     * One-line usage summary, e.g. `Tokens: 1500 | 4o: 1.2% | o3: 0.75%`.
     */
    pub fn summary_line(&self) -> String {
        let tokens = match self.token_status {
            TokenStatus::Counted(n) => format!("Tokens: {n}"),
            TokenStatus::TokenizationFailed => "Tokens: tokenization failed".to_string(),
        };
        let mut parts = vec![tokens];
        for model in &self.models {
            if model.percentage.is_some() {
                parts.push(format!("{}: {}%", model.name, model.label));
            } else {
                parts.push(format!("{}: {}", model.name, model.label));
            }
        }
        parts.join(" | ")
    }
}

pub fn build_request(selection: &[PathBuf]) -> FlattenRequest {
    FlattenRequest {
        paths: selection.to_vec(),
    }
}

pub fn interpret_response(response: &FlattenResponse) -> DisplayModel {
    let (text, text_available) = match (&response.text, &response.error) {
        (Some(text), _) => (text.clone(), true),
        (None, Some(error)) => (format!("Error generating text: {error}"), false),
        (None, None) => (
            "Error generating text: the flatten service returned no text.".to_string(),
            false,
        ),
    };

    let token_status = match response.token_count {
        n if n >= 0 => TokenStatus::Counted(n as u64),
        TOKENIZATION_FAILED => TokenStatus::TokenizationFailed,
        other => {
            log::warn!("FlattenContract: Unexpected negative token count {other}; treating as failed.");
            TokenStatus::TokenizationFailed
        }
    };

    let models = response
        .model_percentages
        .iter()
        .map(|entry| {
            let percentage = parse_percentage(&entry.percentage);
            ModelUsage {
                name: entry.name.clone(),
                percentage,
                label: format_percentage(percentage),
                severity: severity_for(percentage),
            }
        })
        .collect();

    DisplayModel {
        text,
        text_available,
        token_status,
        models,
    }
}

/*
 * Accepts JSON numbers and numeric strings. NaN, infinities and negative values
 * are treated as unavailable.
 */
pub fn parse_percentage(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

fn round_half_away(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/*
 * Display label for a percentage: "N/A" when unavailable, "0" for zero, two
 * decimals below 0.1, one decimal below 10, a whole number otherwise. Rounding
 * is half away from zero on the scaled value and a trailing ".0" is dropped.
 */
pub fn format_percentage(percentage: Option<f64>) -> String {
    let Some(p) = percentage else {
        return "N/A".to_string();
    };
    let label = if p == 0.0 {
        "0".to_string()
    } else if p < 0.1 {
        format!("{:.2}", round_half_away(p, 2))
    } else if p < 10.0 {
        format!("{:.1}", round_half_away(p, 1))
    } else {
        format!("{:.0}", p.round())
    };
    match label.strip_suffix(".0") {
        Some(stripped) => stripped.to_string(),
        None => label,
    }
}

pub fn severity_for(percentage: Option<f64>) -> UsageSeverity {
    match percentage {
        None => UsageSeverity::Unavailable,
        Some(p) if p == 0.0 => UsageSeverity::Neutral,
        Some(p) if p < 50.0 => UsageSeverity::Low,
        Some(p) if p < 80.0 => UsageSeverity::Medium,
        Some(p) if p <= 100.0 => UsageSeverity::High,
        Some(_) => UsageSeverity::OverBudget,
    }
}
