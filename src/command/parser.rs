use once_cell::sync::Lazy;
use regex::Regex;

use super::{Command, CommandError, Result};

static STRUCTURED_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)[,\s]+([0-9]+)$").expect("structured pair regex should compile"));

static RPM_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9]+)\s*rpm").expect("rpm regex should compile"));

static DURATION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([0-9]+)\s*(minutes?|seconds?)").expect("duration regex should compile")
});

static BARE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(?:\.[0-9]*)?$").expect("bare number regex should compile"));

/// Converts operator text, typed or transcribed, into a [`Command`].
///
/// Two grammars are tried in order:
///
/// 1. the whole text is `<rpm> <seconds>` (comma or whitespace separated);
/// 2. free text: an integer tagged `rpm` gives the speed and an integer tagged
///    `minute(s)`/`second(s)` gives the duration. Without an `rpm` tag the whole
///    text may be a single number, taken as the speed with no duration.
pub struct CommandParser;

impl CommandParser {
    pub fn parse(text: &str) -> Result<Command> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }

        match Self::parse_structured_pair(text) {
            Ok(Some(command)) => return Ok(command),
            Ok(None) => {}
            Err(e) => log::debug!("Pair form rejected ({}), trying free text", e),
        }

        Self::parse_natural(text)
    }

    /// Grammar 1 only. `Ok(None)` when the text is not a bare pair.
    pub fn parse_structured_pair(text: &str) -> Result<Option<Command>> {
        let Some(caps) = STRUCTURED_PAIR.captures(text.trim()) else {
            return Ok(None);
        };
        let rpm = parse_digits("rpm", &caps[1])?;
        let duration = parse_digits("duration", &caps[2])?;
        Ok(Some(Command::new(rpm, Some(duration))))
    }

    fn parse_natural(text: &str) -> Result<Command> {
        let duration_seconds = match DURATION_TAG.captures(text) {
            Some(caps) => {
                let amount = parse_digits("duration", &caps[1])?;
                let seconds = if caps[2].to_ascii_lowercase().starts_with("minute") {
                    amount.checked_mul(60).ok_or_else(|| CommandError::Field {
                        field: "duration",
                        value: caps[0].to_string(),
                    })?
                } else {
                    amount
                };
                Some(seconds)
            }
            None => None,
        };

        if let Some(caps) = RPM_TAG.captures(text) {
            let rpm = parse_digits("rpm", &caps[1])?;
            return Ok(Command::new(rpm, duration_seconds));
        }

        // Fallback: the whole text is one number; a fractional part is truncated
        if let Some(caps) = BARE_NUMBER.captures(text) {
            let rpm = parse_digits("rpm", &caps[1])?;
            return Ok(Command::new(rpm, None));
        }

        Err(CommandError::NoRpm(text.to_string()))
    }
}

fn parse_digits(field: &'static str, digits: &str) -> Result<u32> {
    digits.parse::<u32>().map_err(|_| CommandError::Field {
        field,
        value: digits.to_string(),
    })
}
