mod support;

use std::time::{Duration, Instant};

use centrifuge_control_lib::command::{Command, CommandSource};
use centrifuge_control_lib::countdown::CountdownStatus;
use centrifuge_control_lib::serial::ControllerProtocol;
use centrifuge_control_lib::session::{NoticeKind, SessionController, SessionError, SessionSettings};

use support::{RecordingDisplay, ScriptedPort, FRAME_LINE};

fn session(settings: SessionSettings, t0: Instant) -> (SessionController<ScriptedPort>, ScriptedPort, RecordingDisplay) {
    let port = ScriptedPort::new();
    let display = RecordingDisplay::new();
    let controller = SessionController::new(
        ControllerProtocol::new(port.clone(), 4096),
        settings,
        Box::new(display.clone()),
        t0,
    );
    (controller, port, display)
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[tokio::test]
async fn test_expiry_sends_exactly_one_stop() {
    let t0 = Instant::now();
    let (mut controller, port, display) = session(SessionSettings::default(), t0);

    controller
        .submit(Command::new(1500, Some(10)), CommandSource::Typed, t0)
        .await
        .unwrap();
    assert_eq!(port.written(), vec!["1500,10\n"]);

    let report = controller.tick(t0 + secs(5.0)).await;
    assert_eq!(report.countdown, CountdownStatus::Active(secs(5.0)));
    assert_eq!(display.last_remaining(), Some(secs(5.0)));

    let report = controller.tick(t0 + secs(10.05)).await;
    assert_eq!(report.countdown, CountdownStatus::Expired);
    assert!(report.stop_sent);
    assert_eq!(port.written(), vec!["1500,10\n", "0\n"]);
    assert_eq!(display.last_remaining(), None);

    for extra in [11.0, 12.0, 30.0] {
        let report = controller.tick(t0 + secs(extra)).await;
        assert_eq!(report.countdown, CountdownStatus::Idle);
        assert!(!report.stop_sent);
    }
    assert_eq!(port.written().len(), 2);

    let notices = display.notices();
    assert!(notices.contains(&NoticeKind::CountdownExpired));
    assert_eq!(notices.iter().filter(|n| **n == NoticeKind::StopSent).count(), 1);
}

#[tokio::test]
async fn test_failed_stop_is_retried_on_later_ticks() {
    let t0 = Instant::now();
    let (mut controller, port, display) = session(SessionSettings::default(), t0);
    controller
        .submit(Command::new(1000, Some(1)), CommandSource::Typed, t0)
        .await
        .unwrap();

    port.fail_next_writes(2);
    let first = controller.tick(t0 + secs(1.0)).await;
    assert_eq!(first.countdown, CountdownStatus::Expired);
    assert!(!first.stop_sent);
    assert!(controller.stop_pending());

    assert!(!controller.tick(t0 + secs(1.1)).await.stop_sent);
    let third = controller.tick(t0 + secs(1.2)).await;
    assert_eq!(third.countdown, CountdownStatus::Idle);
    assert!(third.stop_sent);
    assert!(!controller.stop_pending());

    assert_eq!(port.written(), vec!["1000,1\n", "0\n"]);
    let failures: Vec<u32> = display
        .notices()
        .iter()
        .filter_map(|n| match n {
            NoticeKind::StopFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![1, 2]);

    assert!(!controller.tick(t0 + secs(1.3)).await.stop_sent);
    assert_eq!(port.written().len(), 2);
}

#[tokio::test]
async fn test_stop_abandoned_after_retry_limit() {
    let t0 = Instant::now();
    let settings = SessionSettings {
        stop_retry_limit: 3,
        ..SessionSettings::default()
    };
    let (mut controller, port, display) = session(settings, t0);
    controller
        .submit(Command::new(1000, Some(1)), CommandSource::Typed, t0)
        .await
        .unwrap();

    port.fail_next_writes(100);
    for i in 0..5 {
        controller.tick(t0 + secs(1.0 + f64::from(i) * 0.1)).await;
    }
    assert!(!controller.stop_pending());
    assert!(display
        .notices()
        .contains(&NoticeKind::StopAbandoned { attempts: 3 }));

    let summary = controller.close(t0 + secs(2.0)).await;
    assert_eq!(summary.stops_abandoned, 1);
    assert_eq!(summary.stops_sent, 0);
}

#[tokio::test]
async fn test_failed_submit_leaves_countdown_alone() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller
        .submit(Command::new(1500, Some(10)), CommandSource::Typed, t0)
        .await
        .unwrap();

    port.fail_next_writes(1);
    let err = controller
        .submit(Command::new(2000, None), CommandSource::Typed, t0 + secs(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(controller.timer().remaining(t0 + secs(1.0)), Some(secs(9.0)));
    assert_eq!(port.written(), vec!["1500,10\n"]);
}

#[tokio::test]
async fn test_command_without_duration_clears_countdown() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller
        .submit(Command::new(1500, Some(5)), CommandSource::Typed, t0)
        .await
        .unwrap();
    controller
        .submit(Command::new(1800, None), CommandSource::Typed, t0 + secs(1.0))
        .await
        .unwrap();

    let report = controller.tick(t0 + secs(6.0)).await;
    assert_eq!(report.countdown, CountdownStatus::Idle);
    assert_eq!(port.written(), vec!["1500,5\n", "1800\n"]);
}

#[tokio::test]
async fn test_rearm_extends_deadline() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller.handle_text("1500 5", CommandSource::Typed, t0).await.unwrap();
    controller
        .handle_text("1500,20", CommandSource::Typed, t0 + secs(3.0))
        .await
        .unwrap();

    assert!(matches!(
        controller.tick(t0 + secs(6.0)).await.countdown,
        CountdownStatus::Active(_)
    ));
    assert_eq!(controller.tick(t0 + secs(23.0)).await.countdown, CountdownStatus::Expired);
    assert_eq!(port.written(), vec!["1500,5\n", "1500,20\n", "0\n"]);
}

#[tokio::test]
async fn test_close_with_armed_countdown_sends_stop() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller
        .handle_manual("1200", "60", t0)
        .await
        .unwrap();

    let summary = controller.close(t0 + secs(4.0)).await;
    assert_eq!(port.written(), vec!["1200,60\n", "0\n"]);
    assert_eq!(summary.commands_sent, 2);
    assert_eq!(summary.stops_sent, 1);
    assert!((summary.duration_secs - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_close_without_countdown_writes_nothing() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller.handle_text("2000", CommandSource::Typed, t0).await.unwrap();

    controller.close(t0 + secs(1.0)).await;
    assert_eq!(port.written(), vec!["2000\n"]);
}

#[tokio::test]
async fn test_invalid_text_is_reported_not_sent() {
    let t0 = Instant::now();
    let (mut controller, port, display) = session(SessionSettings::default(), t0);

    for text in ["", "   ", "abc", "for 5 minutes"] {
        let err = controller.handle_text(text, CommandSource::Typed, t0).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCommand(_)), "{:?}", text);
    }
    assert!(controller.handle_manual("fast", "10", t0).await.is_err());

    assert!(port.written().is_empty());
    let invalid = display
        .notices()
        .iter()
        .filter(|n| matches!(n, NoticeKind::InvalidCommand { .. }))
        .count();
    assert_eq!(invalid, 5);
}

#[tokio::test]
async fn test_natural_language_text_is_sent() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);
    controller
        .handle_text("set to 2000 rpm for 5 minutes", CommandSource::Typed, t0)
        .await
        .unwrap();
    assert_eq!(port.written(), vec!["2000,300\n"]);
    assert_eq!(controller.timer().remaining(t0), Some(secs(300.0)));
}

#[tokio::test]
async fn test_window_shrinks_while_idle() {
    let t0 = Instant::now();
    let (mut controller, port, display) = session(SessionSettings::default(), t0);

    port.feed(FRAME_LINE.as_bytes());
    port.feed(b"garbage\nRPM: 1 MA: 2\n");
    port.feed(FRAME_LINE.as_bytes());
    let report = controller.tick(t0).await;
    assert_eq!(report.frames_decoded, 2);
    assert_eq!(report.frames_rejected, 2);
    assert_eq!(display.last_frames(), 2);

    let report = controller.tick(t0 + secs(30.0)).await;
    assert_eq!(report.frames_evicted, 0);
    assert_eq!(controller.window().len(), 2);

    let report = controller.tick(t0 + secs(60.5)).await;
    assert_eq!(report.frames_decoded, 0);
    assert_eq!(report.frames_evicted, 2);
    assert!(controller.window().is_empty());
    assert_eq!(display.last_frames(), 0);
    assert_eq!(display.renders(), 3);

    let summary = controller.close(t0 + secs(61.0)).await;
    assert_eq!(summary.frames_decoded, 2);
    assert_eq!(summary.frames_rejected, 2);
}

#[tokio::test]
async fn test_window_keeps_only_last_span() {
    let t0 = Instant::now();
    let (mut controller, port, _display) = session(SessionSettings::default(), t0);

    for second in 0..90u32 {
        port.feed(FRAME_LINE.as_bytes());
        controller.tick(t0 + secs(f64::from(second))).await;
    }
    let now = 89.0;
    let frames = controller.window().snapshot();
    assert!(frames.iter().all(|f| f.t >= now - 60.0));
    assert!(frames.windows(2).all(|w| w[0].t <= w[1].t));
    assert_eq!(frames.len(), 61);
}

fn transport_errors(display: &RecordingDisplay) -> usize {
    display
        .notices()
        .iter()
        .filter(|n| matches!(n, NoticeKind::TransportError { .. }))
        .count()
}

#[tokio::test]
async fn test_read_failure_reported_once_and_countdown_keeps_running() {
    let t0 = Instant::now();
    let (mut controller, port, display) = session(SessionSettings::default(), t0);
    port.feed(FRAME_LINE.as_bytes());
    assert_eq!(controller.tick(t0).await.frames_decoded, 1);
    controller
        .submit(Command::new(1500, Some(2)), CommandSource::Typed, t0)
        .await
        .unwrap();

    port.fail_next_reads(10);
    for i in 1..=5 {
        let report = controller.tick(t0 + secs(f64::from(i) * 0.3)).await;
        assert_eq!(report.frames_decoded, 0);
        assert!(matches!(report.countdown, CountdownStatus::Active(_)));
        assert!(controller.read_fault());
    }
    assert_eq!(transport_errors(&display), 1);

    let report = controller.tick(t0 + secs(2.05)).await;
    assert_eq!(report.countdown, CountdownStatus::Expired);
    assert!(report.stop_sent);
    assert!(controller.read_fault());
    assert_eq!(port.written(), vec!["1500,2\n", "0\n"]);

    // the remaining failures, then a quiet port: still faulted without bytes
    for i in 0..5 {
        controller.tick(t0 + secs(2.1 + f64::from(i) * 0.1)).await;
    }
    assert!(controller.read_fault());
    assert_eq!(transport_errors(&display), 1);

    port.feed(FRAME_LINE.as_bytes());
    let report = controller.tick(t0 + secs(3.0)).await;
    assert_eq!(report.frames_decoded, 1);
    assert!(!controller.read_fault());

    // a later fault is a new incident
    port.fail_next_reads(1);
    controller.tick(t0 + secs(3.1)).await;
    assert!(controller.read_fault());
    assert_eq!(transport_errors(&display), 2);
    assert_eq!(port.written().len(), 2);
}
