//! Spoken yes/no gate in front of voice-derived commands.

use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Which voice commands must be confirmed before they are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    Always,
    /// Only commands that start a countdown
    #[default]
    DurationOnly,
    Never,
}

impl ConfirmationPolicy {
    pub fn requires_confirmation(&self, command: &Command) -> bool {
        match self {
            ConfirmationPolicy::Always => true,
            ConfirmationPolicy::DurationOnly => command.duration_seconds.is_some(),
            ConfirmationPolicy::Never => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The phrase must appear as whole words, punctuation ignored
    #[default]
    WholeWord,
    /// Plain case-insensitive substring search
    Substring,
}

/// Decides whether a transcribed response counts as "yes"
#[derive(Debug, Clone)]
pub struct AffirmativeMatcher {
    phrases: Vec<String>,
    mode: MatchMode,
}

impl AffirmativeMatcher {
    pub fn new<I, S>(phrases: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases, mode }
    }

    pub fn is_affirmative(&self, response: &str) -> bool {
        let response = response.to_lowercase();
        match self.mode {
            MatchMode::Substring => self.phrases.iter().any(|p| response.contains(p.as_str())),
            MatchMode::WholeWord => {
                let words = normalize_words(&response);
                self.phrases.iter().any(|phrase| {
                    let needle = normalize_words(phrase);
                    !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
                })
            }
        }
    }
}

impl Default for AffirmativeMatcher {
    fn default() -> Self {
        Self::new(["yes"], MatchMode::WholeWord)
    }
}

/// Lowercased words with surrounding punctuation stripped
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    AwaitingConfirmation(Command),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Dispatch(Command),
    Cancelled,
    /// `resolve` called with nothing pending
    NotAwaiting,
}

/// Holds at most one pending command until a single response resolves it
#[derive(Debug, Clone)]
pub struct ConfirmationFlow {
    state: ConfirmationState,
    matcher: AffirmativeMatcher,
}

impl ConfirmationFlow {
    pub fn new(matcher: AffirmativeMatcher) -> Self {
        Self {
            state: ConfirmationState::Idle,
            matcher,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ConfirmationState::AwaitingConfirmation(_))
    }

    pub fn pending(&self) -> Option<Command> {
        match self.state {
            ConfirmationState::AwaitingConfirmation(command) => Some(command),
            ConfirmationState::Idle => None,
        }
    }

    /// Start awaiting a response for `command`. Refused while another command
    /// is pending; the earlier one keeps its claim on the next response.
    pub fn begin_confirmation(&mut self, command: Command) -> bool {
        if let ConfirmationState::AwaitingConfirmation(pending) = self.state {
            log::warn!("Confirmation already pending for {}; ignoring {}", pending, command);
            return false;
        }
        self.state = ConfirmationState::AwaitingConfirmation(command);
        true
    }

    pub fn resolve(&mut self, response: &str) -> Resolution {
        let ConfirmationState::AwaitingConfirmation(command) = self.state else {
            log::debug!("Confirmation response with nothing pending: {:?}", response);
            return Resolution::NotAwaiting;
        };
        self.state = ConfirmationState::Idle;

        if self.matcher.is_affirmative(response) {
            Resolution::Dispatch(command)
        } else {
            Resolution::Cancelled
        }
    }

    /// Drop the pending command, e.g. when no response could be captured
    pub fn cancel(&mut self) -> Option<Command> {
        let pending = self.pending();
        self.state = ConfirmationState::Idle;
        pending
    }
}

impl Default for ConfirmationFlow {
    fn default() -> Self {
        Self::new(AffirmativeMatcher::default())
    }
}

pub fn confirmation_prompt(command: &Command) -> String {
    match command.duration_seconds {
        Some(seconds) => format!(
            "Do you really want to run for {} seconds at {} RPM? Please say yes or no.",
            seconds, command.rpm
        ),
        None => format!("Do you really want to run at {} RPM? Please say yes or no.", command.rpm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_dispatches() {
        let cmd = Command::new(1500, Some(30));
        let mut flow = ConfirmationFlow::default();
        assert!(flow.begin_confirmation(cmd));
        assert_eq!(flow.resolve("Yes please."), Resolution::Dispatch(cmd));
        assert_eq!(flow.state(), ConfirmationState::Idle);
    }

    #[test]
    fn test_other_responses_cancel() {
        let mut flow = ConfirmationFlow::default();
        for response in ["no", "", "   ", "maybe later"] {
            flow.begin_confirmation(Command::new(1000, Some(10)));
            assert_eq!(flow.resolve(response), Resolution::Cancelled, "{:?}", response);
        }
    }

    #[test]
    fn test_second_resolve_is_noop() {
        let mut flow = ConfirmationFlow::default();
        flow.begin_confirmation(Command::new(1000, Some(10)));
        assert!(matches!(flow.resolve("yes"), Resolution::Dispatch(_)));
        assert_eq!(flow.resolve("yes"), Resolution::NotAwaiting);
    }

    #[test]
    fn test_begin_refused_while_pending() {
        let first = Command::new(1000, Some(10));
        let mut flow = ConfirmationFlow::default();
        assert!(flow.begin_confirmation(first));
        assert!(!flow.begin_confirmation(Command::new(2000, Some(20))));
        assert_eq!(flow.cancel(), Some(first));
        assert_eq!(flow.cancel(), None);
    }

    #[test]
    fn test_whole_word_ignores_embedded_yes() {
        let matcher = AffirmativeMatcher::default();
        assert!(matcher.is_affirmative("YES!"));
        assert!(!matcher.is_affirmative("yesterday was fine"));
        assert!(!matcher.is_affirmative("eyes closed"));

        let loose = AffirmativeMatcher::new(["yes"], MatchMode::Substring);
        assert!(loose.is_affirmative("yesterday was fine"));
    }

    #[test]
    fn test_multi_word_phrases() {
        let matcher = AffirmativeMatcher::new(["yes", "go ahead"], MatchMode::WholeWord);
        assert!(matcher.is_affirmative("okay, go ahead."));
        assert!(!matcher.is_affirmative("go somewhere ahead"));
    }

    #[test]
    fn test_policy() {
        let timed = Command::new(1000, Some(5));
        let open = Command::new(1000, None);
        assert!(ConfirmationPolicy::DurationOnly.requires_confirmation(&timed));
        assert!(!ConfirmationPolicy::DurationOnly.requires_confirmation(&open));
        assert!(ConfirmationPolicy::Always.requires_confirmation(&open));
        assert!(!ConfirmationPolicy::Never.requires_confirmation(&timed));
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            confirmation_prompt(&Command::new(2000, Some(300))),
            "Do you really want to run for 300 seconds at 2000 RPM? Please say yes or no."
        );
    }
}
