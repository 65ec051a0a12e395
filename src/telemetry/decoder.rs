use once_cell::sync::Lazy;
use regex::Regex;

use super::types::TelemetryFrame;
use super::{DecodeError, Result};

const LABELS: [&str; 5] = ["RPM", "MA", "Set", "PWM", "%Err"];

static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$").expect("decimal regex should compile"));

static INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+$").expect("integer regex should compile"));

/// Parses controller telemetry lines.
///
/// Format: `RPM: <f> MA: <f> Set: <f> PWM: <i> %Err: <f>`, fields in that
/// order, whitespace between fields and optional whitespace after each colon.
/// Anything else is rejected; a frame is produced only when all five fields
/// decode.
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode `line`, stamping the frame with session time `t`
    pub fn decode(line: &str, t: f64) -> Result<TelemetryFrame> {
        let mut rest = line.trim();
        let mut values: [&str; 5] = [""; 5];

        for (i, label) in LABELS.iter().enumerate() {
            let after_label = rest
                .strip_prefix(label)
                .and_then(|r| r.strip_prefix(':'))
                .ok_or_else(|| DecodeError::Structure(format!("expected '{}:' at {:?}", label, rest)))?;

            let after_label = after_label.trim_start();
            let end = after_label
                .find(char::is_whitespace)
                .unwrap_or(after_label.len());
            let (value, tail) = after_label.split_at(end);
            if value.is_empty() {
                return Err(DecodeError::Structure(format!("missing value for {}", label)));
            }
            values[i] = value;

            let is_last = i + 1 == LABELS.len();
            if !is_last && !tail.starts_with(char::is_whitespace) {
                return Err(DecodeError::Structure(format!("missing field after {}", label)));
            }
            rest = tail.trim_start();
        }

        if !rest.is_empty() {
            return Err(DecodeError::Structure(format!("trailing content {:?}", rest)));
        }

        Ok(TelemetryFrame {
            t,
            rpm: parse_decimal(LABELS[0], values[0])?,
            moving_average_rpm: parse_decimal(LABELS[1], values[1])?,
            setpoint_rpm: parse_decimal(LABELS[2], values[2])?,
            pwm: parse_integer(LABELS[3], values[3])?,
            percent_error: parse_decimal(LABELS[4], values[4])?,
        })
    }
}

fn numeric_error(field: &'static str, value: &str) -> DecodeError {
    DecodeError::Numeric {
        field,
        value: value.to_string(),
    }
}

/// Plain `-ddd.ddd` only: no exponent, no leading `+`, digits on both sides
/// of the point.
fn parse_decimal(field: &'static str, value: &str) -> Result<f64> {
    if !DECIMAL.is_match(value) {
        return Err(numeric_error(field, value));
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(numeric_error(field, value)),
    }
}

fn parse_integer(field: &'static str, value: &str) -> Result<i32> {
    if !INTEGER.is_match(value) {
        return Err(numeric_error(field, value));
    }
    value.parse::<i32>().map_err(|_| numeric_error(field, value))
}
