use super::dispatch::{block_len, f32_to_i16, u16_to_i16, BlockDispatcher};
use super::{forward_mic_block, peak_percent, LiveMeter, VoipPoller};
use crate::clock::ManualClock;
use crate::engine::{DuckingEngine, EngineSettings, NoiseVerdict, ReductionState};
use crate::session::InMemorySessions;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn engine_with(sessions: &Arc<InMemorySessions>, clock: &Arc<ManualClock>) -> Arc<DuckingEngine> {
    DuckingEngine::new(
        sessions.clone(),
        clock.clone(),
        EngineSettings {
            reduction: 0.5,
            min_noise_length: Duration::from_millis(300),
            min_mic_volume: 10.0,
            min_app_peak: 0.05,
            ..EngineSettings::default()
        },
    )
}

#[test]
fn block_len_covers_all_channels() {
    assert_eq!(block_len(48_000, 1, 50), 2_400);
    assert_eq!(block_len(44_100, 2, 50), 4_410);
    assert_eq!(block_len(8_000, 0, 0), 1);
}

#[test]
fn sample_conversions_hit_the_rails() {
    assert_eq!(f32_to_i16(1.0), i16::MAX);
    assert_eq!(f32_to_i16(2.0), i16::MAX);
    assert_eq!(f32_to_i16(0.0), 0);
    assert_eq!(u16_to_i16(0), i16::MIN);
    assert_eq!(u16_to_i16(32_768), 0);
    assert_eq!(u16_to_i16(u16::MAX), i16::MAX);
}

#[test]
fn dispatcher_emits_fixed_blocks_across_callbacks() {
    let (tx, rx) = bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(4, tx, dropped.clone());

    dispatcher.push(&[1i16, 2, 3], |s| s);
    assert!(rx.try_recv().is_err());
    dispatcher.push(&[4i16, 5, 6, 7, 8, 9], |s| s);

    assert_eq!(rx.try_recv().expect("first block"), vec![1, 2, 3, 4]);
    assert_eq!(rx.try_recv().expect("second block"), vec![5, 6, 7, 8]);
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_drops_when_consumer_lags() {
    let (tx, rx) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(2, tx, dropped.clone());

    dispatcher.push(&[0.5f32, 0.5, 0.25, 0.25, 0.0, 0.0], f32_to_i16);

    assert_eq!(rx.len(), 1);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
}

#[test]
fn dispatcher_stops_when_consumer_is_gone() {
    let (tx, rx) = bounded(4);
    drop(rx);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(2, tx, dropped.clone());
    dispatcher.push(&[1i16, 2, 3, 4], |s| s);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn quiet_mic_block_is_ignored_but_metered() {
    let sessions = Arc::new(InMemorySessions::new());
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    let meter = LiveMeter::new();

    // 3_000 / 32_768 is about 9.2 percent, below the 10 percent floor.
    assert_eq!(forward_mic_block(&engine, &[3_000, -3_000], Some(&meter)), None);
    assert!(meter.percent() > 9.0 && meter.percent() < 10.0);
    assert_eq!(engine.last_noise(), None);
}

#[test]
fn loud_mic_blocks_duck_after_sustained_noise() {
    let sessions = Arc::new(InMemorySessions::new());
    sessions.add_session(7, "spotify", "/usr/bin/spotify", 80.0);
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    let loud = [0i16, 16_384, -200];
    assert_eq!(peak_percent(&loud), 50.0);

    let mut verdicts = Vec::new();
    for at in [0, 100, 200, 300] {
        clock.set_ms(at);
        verdicts.push(forward_mic_block(&engine, &loud, None));
    }

    assert_eq!(
        verdicts,
        vec![
            Some(NoiseVerdict::EpisodeRestarted),
            Some(NoiseVerdict::Accumulating),
            Some(NoiseVerdict::Accumulating),
            Some(NoiseVerdict::Trigger),
        ]
    );
    assert_eq!(engine.reduction_state(), ReductionState::Applied);
    assert_eq!(sessions.volume(7), Some(40.0));
    engine.restore_now();
}

#[test]
fn voip_poller_forwards_loud_windows() {
    let sessions = Arc::new(InMemorySessions::new());
    sessions.add_session(20, "zoom", "/usr/bin/zoom", 60.0);
    sessions.add_session(30, "spotify", "/usr/bin/spotify", 90.0);
    sessions.set_peak(20, 0.4);
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    engine.add_voip_app("zoom");
    engine.rescan_processes().expect("rescan");
    assert_eq!(engine.tracked_voip_pids(), vec![20]);

    let mut poller = VoipPoller::new(Duration::from_millis(50));
    let mut windows = Vec::new();
    for step in 0..24u64 {
        clock.set_ms(step * 50);
        if let Some(window) = poller.poll_once(&engine) {
            windows.push(window);
        }
    }

    assert_eq!(windows.len(), 4);
    assert!(windows.iter().all(|window| window.qualifies));
    assert_eq!(engine.reduction_state(), ReductionState::Applied);
    assert_eq!(sessions.volume(30), Some(45.0));
    // The VOIP app itself is whitelisted.
    assert_eq!(sessions.volume(20), Some(60.0));
    engine.restore_now();
}

#[test]
fn voip_poller_skips_vanished_processes() {
    let sessions = Arc::new(InMemorySessions::new());
    sessions.add_session(20, "zoom", "/usr/bin/zoom", 60.0);
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    engine.add_voip_app("zoom");
    engine.rescan_processes().expect("rescan");
    sessions.remove_process(20);

    let mut poller = VoipPoller::new(Duration::from_millis(300));
    let window = poller.poll_once(&engine).expect("window");
    assert_eq!(window.mean, 0.0);
    assert!(!window.qualifies);
    assert_eq!(engine.last_noise(), None);
}

#[test]
fn voip_windows_chain_despite_late_polls() {
    let sessions = Arc::new(InMemorySessions::new());
    sessions.add_session(20, "zoom", "/usr/bin/zoom", 60.0);
    sessions.add_session(30, "spotify", "/usr/bin/spotify", 90.0);
    sessions.set_peak(20, 0.4);
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    engine.add_voip_app("zoom");
    engine.rescan_processes().expect("rescan");

    // Each poll lands 1ms late; wall-clock windows would be 306ms apart.
    let mut poller = VoipPoller::new(Duration::from_millis(50));
    for step in 0..12u64 {
        clock.set_ms(step * 51);
        poller.poll_once(&engine);
    }

    assert_eq!(engine.first_noise(), Some(Duration::from_millis(250)));
    assert_eq!(engine.last_noise(), Some(Duration::from_millis(550)));
    assert_eq!(engine.reduction_state(), ReductionState::Applied);
    engine.restore_now();
}

#[test]
fn voip_window_after_mic_noise_keeps_timers_monotonic() {
    let sessions = Arc::new(InMemorySessions::new());
    sessions.add_session(20, "zoom", "/usr/bin/zoom", 60.0);
    sessions.set_peak(20, 0.4);
    let clock = Arc::new(ManualClock::new());
    let engine = engine_with(&sessions, &clock);
    engine.add_voip_app("zoom");
    engine.rescan_processes().expect("rescan");

    // Polls land 9ms late, so the window closes on a timeline stamp of 250ms.
    let mut poller = VoipPoller::new(Duration::from_millis(50));
    for step in 0..5u64 {
        clock.set_ms(step * 59);
        assert!(poller.poll_once(&engine).is_none());
    }
    clock.set_ms(294);
    assert_eq!(
        forward_mic_block(&engine, &[16_384], None),
        Some(NoiseVerdict::EpisodeRestarted)
    );
    clock.set_ms(295);
    let window = poller.poll_once(&engine).expect("window");
    assert!(window.qualifies);

    assert_eq!(engine.first_noise(), Some(Duration::from_millis(294)));
    assert_eq!(engine.last_noise(), Some(Duration::from_millis(294)));
    assert_eq!(engine.reduction_state(), ReductionState::Idle);
}
