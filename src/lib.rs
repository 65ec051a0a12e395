pub mod command;
pub mod config;
pub mod confirmation;
pub mod countdown;
pub mod serial;
pub mod session;
pub mod telemetry;
pub mod voice;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use tokio::sync::mpsc;
use uuid::Uuid;

use config::{Cli, VoiceConfig};
use serial::{ControllerProtocol, SerialInterface};
use session::{run_session, spawn_console_reader, ConsoleDisplay, OperatorInput, SessionController, SessionSettings};
use voice::{
    CommandExtractor, ExtractorProcess, RecognizerProcess, Speaker, SpeakerProcess, VoiceEvent, VoiceSettings,
    VoiceWorker,
};

fn list_ports() -> anyhow::Result<()> {
    let devices = SerialInterface::discover_devices().context("enumerating serial ports")?;
    if devices.is_empty() {
        println!("No USB serial ports found");
    }
    for device in devices {
        println!(
            "{}  {:04x}:{:04x}  {}",
            device.port_name,
            device.vid,
            device.pid,
            device.product.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn build_voice_worker(
    session_id: Uuid,
    config: &VoiceConfig,
) -> anyhow::Result<(VoiceWorker, mpsc::UnboundedReceiver<VoiceEvent>)> {
    let recognizer =
        RecognizerProcess::new(config.transcribe_command.clone()).context("voice.transcribe_command")?;

    let speaker: Option<Box<dyn Speaker>> = if config.speak_command.is_empty() {
        None
    } else {
        Some(Box::new(
            SpeakerProcess::new(config.speak_command.clone()).context("voice.speak_command")?,
        ))
    };

    let extractor: Option<Arc<dyn CommandExtractor>> = if config.extractor.enabled {
        Some(Arc::new(ExtractorProcess::new(
            config.extractor.program.clone(),
            config.extractor.model.clone(),
        )))
    } else {
        None
    };

    let settings = VoiceSettings {
        trigger_word: config.trigger_word.clone(),
        trigger_scan_words: config.trigger_scan_words,
        capture_attempts: config.capture_attempts,
    };

    log::info!(
        "Voice input enabled (trigger: {}, extractor: {})",
        settings.trigger_word.as_deref().unwrap_or("none"),
        extractor.as_ref().map(|e| e.name()).unwrap_or("off")
    );
    Ok(VoiceWorker::new(session_id, Box::new(recognizer), speaker, extractor, settings))
}

fn spawn_interrupt_handler(tx: mpsc::Sender<OperatorInput>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted");
            let _ = tx.send(OperatorInput::Close).await;
        }
    });
}

/// Connect to the controller and run one operator session until it is closed
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_ports {
        return list_ports();
    }

    let config = cli.resolve_config().context("loading configuration")?;

    let port_name = match &config.serial.port {
        Some(port) => port.clone(),
        None => SerialInterface::discover_devices()
            .context("enumerating serial ports")?
            .into_iter()
            .next()
            .map(|device| device.port_name)
            .ok_or_else(|| anyhow!("no USB serial port found; pass --port"))?,
    };

    let mut interface = SerialInterface::new();
    interface
        .connect(&port_name, config.serial.baud_rate, config.serial.read_timeout())
        .with_context(|| format!("opening {}", port_name))?;

    let settle = config.serial.settle_delay();
    if !settle.is_zero() {
        log::info!("Waiting {:?} for the controller to reset", settle);
        tokio::time::sleep(settle).await;
    }

    let protocol = ControllerProtocol::new(interface, config.serial.max_line_len);
    let mut controller = SessionController::new(
        protocol,
        SessionSettings::from_config(&config),
        Box::new(ConsoleDisplay::stdout()),
        Instant::now(),
    );

    let voice_events = if config.voice.enabled {
        let (worker, events) = build_voice_worker(controller.id(), &config.voice)?;
        controller.attach_voice(worker);
        Some(events)
    } else {
        None
    };

    let (input_tx, input_rx) = mpsc::channel(16);
    spawn_console_reader(std::io::BufReader::new(std::io::stdin()), input_tx.clone())
        .context("starting console reader")?;
    spawn_interrupt_handler(input_tx);

    let summary = run_session(controller, input_rx, voice_events, config.session.tick_interval()).await;
    log::info!("Session summary: {}", serde_json::to_string(&summary)?);
    if summary.stops_abandoned > 0 {
        log::error!("{} stop command(s) were never delivered", summary.stops_abandoned);
    }
    Ok(())
}
