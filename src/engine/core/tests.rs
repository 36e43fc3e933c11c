use super::*;

use std::time::Instant;

use tokio::sync::broadcast::error::TryRecvError;

use crate::engine::backend::{ScriptedBackend, StubTimeSource};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sampling.tick_interval_ms = 1;
    config.sampling.frame_size = 64;
    config.detection.sensitivity = 50;
    config.detection.min_delay_ms = 250;
    config
}

fn handle_with(backend: &ScriptedBackend, config: &AppConfig) -> ShotDetectorHandle {
    ShotDetectorHandle::with_time_source(
        Arc::new(backend.clone()),
        Arc::new(StubTimeSource::new(16)),
        config,
    )
}

fn next_event(rx: &mut broadcast::Receiver<DetectorEvent>) -> Option<DetectorEvent> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) => return Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(TryRecvError::Closed) => return None,
        }
    }
    None
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn idle_detector_reports_zero_volume() {
    let backend = ScriptedBackend::new(0.3);
    let handle = handle_with(&backend, &fast_config());

    assert_eq!(handle.status(), DetectorStatus::Idle);
    assert!(!handle.is_listening());
    assert_eq!(handle.current_volume(), 0.0);
    assert_eq!(backend.opened_streams(), 0);
}

#[test]
fn start_acquires_and_stop_releases_microphone() {
    let backend = ScriptedBackend::new(0.25);
    let handle = handle_with(&backend, &fast_config());

    handle.start().unwrap();
    assert!(handle.is_listening());
    assert_eq!(backend.active_streams(), 1);
    assert!(wait_until(|| (handle.current_volume() - 0.25).abs() < 1e-6));

    handle.stop().unwrap();
    assert_eq!(handle.status(), DetectorStatus::Idle);
    assert_eq!(handle.current_volume(), 0.0);
    assert_eq!(backend.active_streams(), 0);
}

#[test]
fn second_start_fails_while_listening() {
    let backend = ScriptedBackend::default();
    let handle = handle_with(&backend, &fast_config());

    handle.start().unwrap();
    assert_eq!(handle.start(), Err(AudioError::AlreadyListening));
    assert_eq!(backend.opened_streams(), 1);
    handle.stop().unwrap();
}

#[test]
fn failed_start_holds_nothing_and_publishes_nothing() {
    let backend = ScriptedBackend::default().failing_open("permission denied");
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    let result = handle.start();
    assert!(matches!(
        result,
        Err(AudioError::MicrophoneUnavailable { ref reason }) if reason == "permission denied"
    ));
    assert!(!handle.is_listening());
    assert_eq!(backend.active_streams(), 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // Stop right after a failed start is a no-op.
    handle.stop().unwrap();
    handle.stop().unwrap();
    assert_eq!(handle.status(), DetectorStatus::Idle);
}

#[test]
fn stop_is_idempotent() {
    let backend = ScriptedBackend::default();
    let handle = handle_with(&backend, &fast_config());

    handle.stop().unwrap();
    handle.start().unwrap();
    handle.stop().unwrap();
    handle.stop().unwrap();
    assert_eq!(backend.active_streams(), 0);
}

#[test]
fn spike_after_warmup_is_reported() {
    let backend = ScriptedBackend::new(0.01).with_spike(40, 0.5);
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    let event = next_event(&mut rx);
    handle.stop().unwrap();

    match event {
        Some(DetectorEvent::ShotDetected(shot)) => {
            assert_eq!(shot.shot_number, 1);
            assert!((shot.volume - 0.5).abs() < 1e-6);
            assert!((shot.baseline_volume - 0.01).abs() < 1e-6);
            assert!((shot.threshold - 0.01 * 5.75).abs() < 1e-6);
        }
        other => panic!("expected a shot, got {:?}", other),
    }
}

#[test]
fn spike_during_warmup_is_ignored() {
    let backend = ScriptedBackend::new(0.01).with_spike(10, 0.9).with_spike(45, 0.5);
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    let event = next_event(&mut rx);
    handle.stop().unwrap();

    // The warm-up spike lifts the baseline; the later spike still clears 5.75x.
    match event {
        Some(DetectorEvent::ShotDetected(shot)) => {
            assert_eq!(shot.shot_number, 1);
            assert!((shot.volume - 0.5).abs() < 1e-6);
        }
        other => panic!("expected the post-warm-up shot, got {:?}", other),
    }
}

#[test]
fn close_spikes_are_debounced() {
    // Stub clock advances 16 ms per tick: reads 40 and 45 are 80 ms apart,
    // read 70 is 480 ms after read 40.
    let backend = ScriptedBackend::new(0.01)
        .with_spike(40, 0.5)
        .with_spike(45, 0.5)
        .with_spike(70, 0.5);
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    let first = next_event(&mut rx);
    let second = next_event(&mut rx);
    handle.stop().unwrap();

    let (Some(DetectorEvent::ShotDetected(first)), Some(DetectorEvent::ShotDetected(second))) =
        (first, second)
    else {
        panic!("expected two shots");
    };
    assert_eq!(first.shot_number, 1);
    assert_eq!(second.shot_number, 2);
    assert!(second.timestamp_ms - first.timestamp_ms >= 250);
}

#[test]
fn stream_failure_publishes_error_after_release() {
    let backend = ScriptedBackend::default().failing_after(5, "device unplugged");
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    let event = next_event(&mut rx);

    assert!(matches!(
        event,
        Some(DetectorEvent::Error(AudioError::MicrophoneUnavailable { .. }))
    ));
    // Already idle and released by the time the error is observable.
    assert!(!handle.is_listening());
    assert_eq!(handle.current_volume(), 0.0);
    assert_eq!(backend.active_streams(), 0);

    handle.stop().unwrap();
}

#[test]
fn detector_restarts_after_stream_failure() {
    let backend = ScriptedBackend::default().failing_after(3, "device unplugged");
    let handle = handle_with(&backend, &fast_config());
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    assert!(matches!(next_event(&mut rx), Some(DetectorEvent::Error(_))));

    handle.start().unwrap();
    assert_eq!(backend.opened_streams(), 2);
    handle.stop().unwrap();
}

#[test]
fn disabled_detection_refuses_to_start() {
    let backend = ScriptedBackend::default();
    let mut config = fast_config();
    config.detection.enabled = false;
    let handle = handle_with(&backend, &config);

    assert!(matches!(
        handle.start(),
        Err(AudioError::InvalidConfig { .. })
    ));
    assert_eq!(backend.opened_streams(), 0);

    handle.set_enabled(true);
    handle.start().unwrap();
    handle.stop().unwrap();
}

#[test]
fn live_settings_are_clamped_and_applied() {
    let backend = ScriptedBackend::default();
    let handle = handle_with(&backend, &fast_config());

    handle.set_sensitivity(250);
    handle.set_min_delay_ms(900);
    let config = handle.detection_config();
    assert_eq!(config.sensitivity, 100);
    assert_eq!(config.min_delay_ms, 900);

    handle.apply_config(AudioDetectionConfig {
        enabled: true,
        sensitivity: 20,
        min_delay_ms: 100,
    });
    assert_eq!(handle.detection_config().sensitivity, 20);
}

#[test]
fn sensitivity_change_applies_without_restart() {
    // 3x baseline: below the 10x needed at sensitivity 0, above 1.5x at 100.
    let mut script = ScriptedBackend::new(0.01);
    for read in 40..400 {
        script = script.with_spike(read, 0.03);
    }
    let mut config = fast_config();
    config.detection.sensitivity = 0;
    config.detection.min_delay_ms = 0;
    let handle = handle_with(&script, &config);
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    handle.set_sensitivity(100);
    let event = next_event(&mut rx);
    handle.stop().unwrap();
    assert!(matches!(event, Some(DetectorEvent::ShotDetected(_))));
}

#[test]
fn dropping_handle_releases_microphone() {
    let backend = ScriptedBackend::default();
    {
        let handle = handle_with(&backend, &fast_config());
        handle.start().unwrap();
        assert_eq!(backend.active_streams(), 1);
    }
    assert_eq!(backend.active_streams(), 0);
}

#[test]
fn invalid_sampling_config_is_rejected() {
    let backend = ScriptedBackend::default();
    let mut config = fast_config();
    config.sampling.frame_size = 0;
    let handle = handle_with(&backend, &config);

    assert!(matches!(
        handle.start(),
        Err(AudioError::InvalidConfig { .. })
    ));
    assert_eq!(backend.opened_streams(), 0);
}

#[tokio::test]
async fn event_stream_yields_shots() {
    use tokio_stream::StreamExt as _;

    let backend = ScriptedBackend::new(0.01).with_spike(35, 0.6);
    let handle = handle_with(&backend, &fast_config());
    let stream = handle.event_stream();
    tokio::pin!(stream);

    handle.start().unwrap();
    let event = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
    handle.stop().unwrap();

    assert!(matches!(event, Some(DetectorEvent::ShotDetected(_))));
}

#[tokio::test]
async fn volume_poller_publishes_levels() {
    let backend = ScriptedBackend::new(0.2);
    let mut config = fast_config();
    config.sampling.volume_poll_interval_ms = 5;
    let handle = handle_with(&backend, &config);
    let mut levels = handle.subscribe_volume_levels();
    let poller = handle.spawn_volume_poller();

    let idle = tokio::time::timeout(WAIT, levels.recv()).await.unwrap().unwrap();
    assert!(!idle.listening);
    assert_eq!(idle.volume, 0.0);

    handle.start().unwrap();
    let listening = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(level) = levels.recv().await {
                if level.listening && level.volume > 0.0 {
                    return level;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!((listening.volume - 0.2).abs() < 1e-6);

    handle.stop().unwrap();
    poller.shutdown();
}
