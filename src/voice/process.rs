//! Voice collaborators backed by external programs (speech-to-text script,
//! TTS player, local LLM runner).

use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context};

use super::{CommandExtractor, Speaker, SpeechRecognizer};

pub const EXTRACTION_PROMPT: &str = "Extract the centrifuge settings from the following request exactly as stated. \
Ignore any extraneous words that do not affect the numerical values. \
Return your answer as plain text in the format: <RPM> <TIME>.\n\n\
For example, if the input is \"set centrifuge to 2000 rpm for 5 minutes\", the output should be: 2000 300\n\n\
Request: ";

fn run_capture(program: &str, args: &[String]) -> anyhow::Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("failed to run {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn split_command(argv: &[String]) -> anyhow::Result<(&str, &[String])> {
    argv.split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| anyhow!("empty command line"))
}

/// Runs a recorder/transcriber program and takes its stdout as the transcript
pub struct RecognizerProcess {
    argv: Vec<String>,
}

impl RecognizerProcess {
    pub fn new(argv: Vec<String>) -> anyhow::Result<Self> {
        split_command(&argv)?;
        Ok(Self { argv })
    }
}

impl SpeechRecognizer for RecognizerProcess {
    fn capture_and_transcribe(&mut self) -> anyhow::Result<String> {
        let (program, args) = split_command(&self.argv)?;
        let text = run_capture(program, args)?;
        log::debug!("Recognized speech: {:?}", text);
        Ok(text.to_lowercase())
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Runs a TTS program with the text appended as its last argument
pub struct SpeakerProcess {
    argv: Vec<String>,
}

impl SpeakerProcess {
    pub fn new(argv: Vec<String>) -> anyhow::Result<Self> {
        split_command(&argv)?;
        Ok(Self { argv })
    }
}

impl Speaker for SpeakerProcess {
    fn speak(&mut self, text: &str) -> anyhow::Result<()> {
        let (program, args) = split_command(&self.argv)?;
        let mut args = args.to_vec();
        args.push(text.to_string());
        run_capture(program, &args).map(|_| ())
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Asks a local model through an `ollama run <model> <prompt>` style CLI
pub struct ExtractorProcess {
    program: String,
    model: String,
}

impl ExtractorProcess {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }
}

impl CommandExtractor for ExtractorProcess {
    fn extract_command(&self, free_text: &str) -> anyhow::Result<String> {
        let combined = format!("{}{}", EXTRACTION_PROMPT, free_text);
        log::debug!("Extraction prompt: {:?}", combined);
        let args = ["run".to_string(), self.model.clone(), combined];
        let output = run_capture(&self.program, &args)?;
        log::info!("Raw output from {}: {}", self.model, output);
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
