use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::command::CommandSource;
use crate::serial::SerialPortIO;
use crate::voice::VoiceEvent;

use super::{SessionController, SessionSummary};

/// Operator actions fed into the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    /// Free text, either grammar
    Text(String),
    /// The two-field entry form
    Manual { rpm: String, duration: String },
    /// Listen for one spoken command
    Voice,
    Close,
}

impl OperatorInput {
    /// Interpret one console line. Blank lines mean nothing.
    pub fn from_console_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let lowered = line.to_ascii_lowercase();
        match lowered.as_str() {
            "quit" | "exit" | ":q" | ":quit" => return Some(OperatorInput::Close),
            ":voice" | ":v" => return Some(OperatorInput::Voice),
            "stop" | ":stop" => return Some(OperatorInput::Text("0".to_string())),
            _ => {}
        }

        if let Some(rest) = lowered.strip_prefix(":set") {
            let mut fields = rest.split_whitespace();
            let rpm = fields.next().unwrap_or_default().to_string();
            let duration = fields.next().unwrap_or_default().to_string();
            return Some(OperatorInput::Manual { rpm, duration });
        }

        Some(OperatorInput::Text(line.to_string()))
    }
}

/// Forward console lines into the control loop from a dedicated OS thread.
///
/// The blocking read lives outside the async runtime, so a session closed by
/// Ctrl-C or the voice path does not wait for another line. End of input
/// closes the session.
pub fn spawn_console_reader<R>(reader: R, tx: mpsc::Sender<OperatorInput>) -> std::io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        let Some(input) = OperatorInput::from_console_line(&line) else {
                            continue;
                        };
                        let closing = input == OperatorInput::Close;
                        if tx.blocking_send(input).is_err() || closing {
                            return;
                        }
                    }
                    Err(e) => {
                        log::error!("Console read failed: {}", e);
                        let _ = tx.blocking_send(OperatorInput::Close);
                        return;
                    }
                }
            }
            log::info!("Console input closed");
            let _ = tx.blocking_send(OperatorInput::Close);
        })
}

async fn next_voice_event(events: &mut Option<mpsc::UnboundedReceiver<VoiceEvent>>) -> Option<VoiceEvent> {
    let event = match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => return std::future::pending().await,
    };
    if event.is_none() {
        log::debug!("Voice worker gone; no more voice results");
        *events = None;
    }
    event
}

async fn handle_input<T: SerialPortIO>(controller: &mut SessionController<T>, input: OperatorInput) {
    let now = Instant::now();
    let result = match input {
        OperatorInput::Text(text) => controller.handle_text(&text, CommandSource::Typed, now).await.map(|_| ()),
        OperatorInput::Manual { rpm, duration } => controller.handle_manual(&rpm, &duration, now).await.map(|_| ()),
        OperatorInput::Voice => controller.request_voice_command(),
        OperatorInput::Close => Ok(()),
    };
    // already reported to the operator through the display
    if let Err(e) = result {
        log::debug!("Operator input not applied: {}", e);
    }
}

/// Drive `controller` until the operator closes the run or the input channel
/// goes away, then close it and return the summary.
///
/// The loop never blocks on I/O: each tick drains only what the port already
/// holds, and voice work reports back through `voice_events`.
pub async fn run_session<T: SerialPortIO>(
    mut controller: SessionController<T>,
    mut inputs: mpsc::Receiver<OperatorInput>,
    mut voice_events: Option<mpsc::UnboundedReceiver<VoiceEvent>>,
    tick_interval: Duration,
) -> SessionSummary {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!("Session {} running, tick every {:?}", controller.id(), tick_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.tick(Instant::now()).await;
            }

            input = inputs.recv() => match input {
                Some(OperatorInput::Close) | None => {
                    log::info!("Close requested for session {}", controller.id());
                    break;
                }
                Some(input) => handle_input(&mut controller, input).await,
            },

            Some(event) = next_voice_event(&mut voice_events) => {
                if let Err(e) = controller.handle_voice_event(event, Instant::now()).await {
                    log::debug!("Voice result not applied: {}", e);
                }
            }
        }
    }

    // results still in flight have nowhere to land
    drop(voice_events);
    controller.close(Instant::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_lines() {
        assert_eq!(OperatorInput::from_console_line("   "), None);
        assert_eq!(OperatorInput::from_console_line("QUIT"), Some(OperatorInput::Close));
        assert_eq!(OperatorInput::from_console_line(":voice"), Some(OperatorInput::Voice));
        assert_eq!(
            OperatorInput::from_console_line("stop"),
            Some(OperatorInput::Text("0".into()))
        );
        assert_eq!(
            OperatorInput::from_console_line(":set 1500 30"),
            Some(OperatorInput::Manual {
                rpm: "1500".into(),
                duration: "30".into()
            })
        );
        assert_eq!(
            OperatorInput::from_console_line(":set 1500"),
            Some(OperatorInput::Manual {
                rpm: "1500".into(),
                duration: String::new()
            })
        );
        assert_eq!(
            OperatorInput::from_console_line(" 2000 rpm for 5 Minutes "),
            Some(OperatorInput::Text("2000 rpm for 5 Minutes".into()))
        );
    }
}
