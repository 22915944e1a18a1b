// Integration tests for the recording lifecycle
//
// A scripted host stands in for the microphone so each scenario runs the
// real controller, writer and naming policy end to end.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local};
use mic_recorder::audio::{
    derive_path, AudioFile, CaptureParams, FlushPolicy, MockEnding, MockEvent, MockHost,
    MAX_DATA_BYTES,
};
use mic_recorder::recording::{
    EXIT_CONTAINER_FULL, EXIT_FAILURE, EXIT_OK, EXIT_SESSION_ABORTED,
};
use mic_recorder::{
    CaptureError, LifecycleState, Recorder, RecorderError, RecorderSettings, StopFlag,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn settings(output_dir: &Path) -> RecorderSettings {
    RecorderSettings {
        capture: CaptureParams {
            sample_rate: 44100,
            channels: 1,
            block_frames: 4410,
            queue_blocks: 64,
        },
        output_dir: output_dir.to_path_buf(),
        flush: FlushPolicy::default(),
        min_free_mb: 0,
        max_data_bytes: MAX_DATA_BYTES,
        preferred_device: None,
        startup_attempts: 1,
        retry_delay: Duration::from_millis(10),
    }
}

fn wav_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "wav").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

/// Data chunk length the header declares, and the bytes actually behind it
fn header_and_body(path: &Path) -> Result<(u64, u64)> {
    let bytes = fs::read(path)?;
    let declared = u32::from_le_bytes(bytes[40..44].try_into()?) as u64;
    Ok((declared, bytes.len() as u64 - 44))
}

/// Raise `stop` after `delay` from another thread, like a SIGTERM would
fn stop_after(stop: &StopFlag, delay: Duration) -> thread::JoinHandle<()> {
    let stop = stop.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        stop.raise();
    })
}

#[test]
fn test_three_seconds_of_mono_silence() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Mock Mic"])
        .with_silence(44100, 1, 3)
        .with_ending(MockEnding::HoldUntilStopped);
    let stop = StopFlag::new();
    let signal = stop_after(&stop, Duration::from_millis(300));

    let outcome = Recorder::new(host, settings(dir.path()), stop).run();
    signal.join().unwrap();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.exit_code(), EXIT_OK);

    let files = wav_files(dir.path())?;
    assert_eq!(files.len(), 1, "Exactly one file per session");

    let audio = AudioFile::open(&files[0])?;
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.data_bytes, 3 * 44100 * 2);

    let summary = outcome.summary.expect("file was created");
    assert!(summary.finalized);
    assert_eq!(summary.frames_written, 3 * 44100);
    assert_eq!(summary.data_bytes, audio.data_bytes);
    assert_eq!(summary.path, files[0]);
    Ok(())
}

#[test]
fn test_stop_interrupts_idle_device_promptly() -> Result<()> {
    let dir = TempDir::new()?;
    // Device delivers nothing at all
    let host = MockHost::new(&["Silent Mic"]).with_ending(MockEnding::HoldUntilStopped);
    let stop = StopFlag::new();
    let signal = stop_after(&stop, Duration::from_millis(100));

    let started = Instant::now();
    let outcome = Recorder::new(host, settings(dir.path()), stop).run();
    signal.join().unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(2),
        "Stop should be honoured within bounded latency"
    );
    assert_eq!(outcome.state, LifecycleState::Stopped);

    let audio = AudioFile::open(&wav_files(dir.path())?[0])?;
    assert_eq!(audio.data_bytes, 0);
    Ok(())
}

#[test]
fn test_samples_round_trip_through_session() -> Result<()> {
    let dir = TempDir::new()?;
    let ramp: Vec<i16> = (0..10_000).map(|i| (i * 3 - 15_000) as i16).collect();
    // Odd callback sizes, unrelated to the block size
    let script = ramp
        .chunks(333)
        .map(|c| MockEvent::Samples(c.to_vec()))
        .collect();
    let host = MockHost::new(&["Mock Mic"]).with_script(script);

    let mut cfg = settings(dir.path());
    cfg.capture.block_frames = 1000;
    let outcome = Recorder::new(host, cfg, StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    let audio = AudioFile::open(&wav_files(dir.path())?[0])?;
    assert_eq!(audio.read_samples()?, ramp, "Samples should appear byte-identical and in order");
    Ok(())
}

#[test]
fn test_stereo_session_header() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Stereo Mic"]).with_silence(48000, 2, 1);

    let mut cfg = settings(dir.path());
    cfg.capture.sample_rate = 48000;
    cfg.capture.channels = 2;
    cfg.capture.block_frames = 4800;
    let outcome = Recorder::new(host, cfg, StopFlag::new()).run();

    assert_eq!(outcome.exit_code(), EXIT_OK);
    let audio = AudioFile::open(&wav_files(dir.path())?[0])?;
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.frames, 48000);
    Ok(())
}

#[test]
fn test_no_device_fails_without_creating_a_file() -> Result<()> {
    let dir = TempDir::new()?;
    let mut recorder = Recorder::new(MockHost::empty(), settings(dir.path()), StopFlag::new());

    let outcome = recorder.run();

    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(matches!(outcome.error, Some(RecorderError::NoDeviceFound)));
    assert_ne!(outcome.exit_code(), 0, "Startup failure must exit non-zero");
    assert!(outcome.summary.is_none());
    assert!(wav_files(dir.path())?.is_empty(), "No file should be created");
    Ok(())
}

#[test]
fn test_open_failures_are_retried_a_bounded_number_of_times() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Flaky Mic"])
        .with_silence(44100, 1, 1)
        .failing_opens(2);

    let mut cfg = settings(dir.path());
    cfg.startup_attempts = 3;
    let mut recorder = Recorder::new(host, cfg, StopFlag::new());
    let outcome = recorder.run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert_eq!(recorder.host().opened_streams(), 1);
    Ok(())
}

#[test]
fn test_persistent_open_failure_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Broken Mic"]).failing_opens(10);

    let mut cfg = settings(dir.path());
    cfg.startup_attempts = 2;
    let outcome = Recorder::new(host, cfg, StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(matches!(outcome.error, Some(RecorderError::DeviceOpen { .. })));
    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    assert!(wav_files(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn test_recoverable_errors_do_not_end_the_session() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Mock Mic"]).with_script(vec![
        MockEvent::Samples(vec![1; 4410]),
        MockEvent::Fault(CaptureError::Stream("xrun".into())),
        MockEvent::Samples(vec![2; 4410]),
        MockEvent::Fault(CaptureError::Overrun { dropped_blocks: 1 }),
        MockEvent::Samples(vec![3; 4410]),
    ]);

    let outcome = Recorder::new(host, settings(dir.path()), StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert!(outcome.error.is_none());
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.recoverable_errors, 2);
    assert_eq!(summary.frames_written, 3 * 4410);
    Ok(())
}

#[test]
fn test_device_loss_finalizes_what_was_captured() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["USB Mic"])
        .with_script(vec![
            MockEvent::Samples(vec![7; 4410]),
            MockEvent::Samples(vec![8; 4410]),
            MockEvent::Fault(CaptureError::DeviceLost("unplugged".into())),
            MockEvent::Samples(vec![9; 4410]),
        ])
        .with_ending(MockEnding::HoldUntilStopped);

    let outcome = Recorder::new(host, settings(dir.path()), StopFlag::new()).run();

    assert!(matches!(
        outcome.error,
        Some(RecorderError::Capture(CaptureError::DeviceLost(_)))
    ));
    assert_eq!(outcome.exit_code(), EXIT_SESSION_ABORTED);

    let summary = outcome.summary.unwrap();
    assert!(summary.finalized, "Header should be corrected after device loss");

    let audio = AudioFile::open(&summary.path)?;
    assert_eq!(audio.frames, 2 * 4410);
    assert!(audio.read_samples()?.iter().all(|&s| s == 7 || s == 8));
    Ok(())
}

#[test]
fn test_failed_append_finalizes_what_was_written() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["USB Mic"])
        .with_script(vec![
            MockEvent::Samples(vec![1; 4410]),
            MockEvent::Samples(vec![2; 4410]),
            MockEvent::Samples(vec![3; 4410]),
        ])
        .switch_layout_after(2, 2);

    let outcome = Recorder::new(host, settings(dir.path()), StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert!(matches!(outcome.error, Some(RecorderError::Io { .. })));
    assert_eq!(outcome.exit_code(), EXIT_SESSION_ABORTED);

    let summary = outcome.summary.unwrap();
    assert!(summary.finalized, "Header should be corrected after a failed append");
    assert_eq!(summary.data_bytes, 2 * 4410 * 2);

    let (declared, body) = header_and_body(&summary.path)?;
    assert_eq!(declared, summary.data_bytes);
    assert_eq!(body, summary.data_bytes, "Refused block must not reach the file");
    assert_eq!(AudioFile::open(&summary.path)?.frames, 2 * 4410);
    Ok(())
}

#[test]
fn test_full_file_finalizes_and_asks_for_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1);

    let mut cfg = settings(dir.path());
    cfg.max_data_bytes = 2 * 4410 * 2 + 100;
    let outcome = Recorder::new(host, cfg, StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert!(matches!(outcome.error, Some(RecorderError::ContainerFull { .. })));
    assert_eq!(outcome.exit_code(), EXIT_CONTAINER_FULL);

    let summary = outcome.summary.unwrap();
    assert!(summary.finalized);
    assert_eq!(summary.frames_written, 2 * 4410);

    let (declared, body) = header_and_body(&summary.path)?;
    assert_eq!(declared, 2 * 4410 * 2);
    assert_eq!(body, declared);
    Ok(())
}

#[test]
fn test_zero_channels_are_rejected_before_any_file() -> Result<()> {
    let dir = TempDir::new()?;
    let out = dir.path().join("out");

    let mut cfg = settings(&out);
    cfg.capture.channels = 0;
    let mut recorder = Recorder::new(MockHost::new(&["Mock Mic"]), cfg, StopFlag::new());
    let outcome = recorder.run();

    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(matches!(outcome.error, Some(RecorderError::InvalidSettings(_))));
    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    assert_eq!(recorder.host().opened_streams(), 0);
    assert!(!out.exists());
    Ok(())
}

#[test]
fn test_low_disk_space_fails_startup() -> Result<()> {
    let dir = TempDir::new()?;
    let host = MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1);

    let mut cfg = settings(dir.path());
    cfg.min_free_mb = u64::MAX / (1024 * 1024);
    let mut recorder = Recorder::new(host, cfg, StopFlag::new());
    let outcome = recorder.run();

    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(matches!(outcome.error, Some(RecorderError::LowDiskSpace { .. })));
    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    assert_eq!(recorder.host().opened_streams(), 0);
    assert!(wav_files(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn test_same_second_restart_is_a_naming_collision() -> Result<()> {
    let dir = TempDir::new()?;

    // Occupy the names for the next few seconds so the run lands on one of them
    let now = Local::now();
    let occupied: Vec<PathBuf> = (0..5)
        .map(|s| derive_path(dir.path(), &(now + ChronoDuration::seconds(s))))
        .collect();
    for path in &occupied {
        fs::write(path, b"prior session")?;
    }

    let host = MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1);
    let outcome = Recorder::new(host, settings(dir.path()), StopFlag::new()).run();

    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(matches!(
        outcome.error,
        Some(RecorderError::NamingCollision { .. })
    ));
    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    for path in &occupied {
        assert_eq!(fs::read(path)?, b"prior session", "Prior session must be untouched");
    }
    Ok(())
}

#[test]
fn test_sessions_a_second_apart_get_separate_files() -> Result<()> {
    let dir = TempDir::new()?;

    let first = Recorder::new(
        MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1),
        settings(dir.path()),
        StopFlag::new(),
    )
    .run();
    thread::sleep(Duration::from_millis(1100));
    let second = Recorder::new(
        MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1),
        settings(dir.path()),
        StopFlag::new(),
    )
    .run();

    assert_eq!(first.exit_code(), EXIT_OK);
    assert_eq!(second.exit_code(), EXIT_OK);
    assert_eq!(wav_files(dir.path())?.len(), 2);
    Ok(())
}

#[test]
fn test_stop_before_capture_creates_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let stop = StopFlag::new();
    stop.raise();

    let outcome = Recorder::new(
        MockHost::new(&["Mock Mic"]).with_silence(44100, 1, 1),
        settings(dir.path()),
        stop,
    )
    .run();

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert_eq!(outcome.exit_code(), EXIT_OK);
    assert!(wav_files(dir.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_session_on_blocking_thread_with_async_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let output_dir = dir.path().to_path_buf();
    let stop = StopFlag::new();

    let session_stop = stop.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let host = MockHost::new(&["Mock Mic"])
            .with_silence(44100, 1, 2)
            .with_ending(MockEnding::HoldUntilStopped);
        Recorder::new(host, settings(&output_dir), session_stop).run()
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.raise();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle).await??;

    assert_eq!(outcome.state, LifecycleState::Stopped);
    assert_eq!(outcome.summary.unwrap().data_bytes, 2 * 44100 * 2);
    Ok(())
}
