// Integration tests for reading recordings back
//
// Recordings are produced with the crate's own writer and read with a
// standard WAV reader, the way `mic-recorder inspect` does.

use anyhow::Result;
use mic_recorder::audio::{AudioFile, FlushPolicy, FrameBlock, WavFileWriter};
use std::path::PathBuf;
use tempfile::TempDir;

fn write_recording(dir: &TempDir, name: &str, channels: u16, samples: Vec<i16>) -> Result<PathBuf> {
    let path = dir.path().join(name);
    let mut writer = WavFileWriter::create(&path, 16000, channels, FlushPolicy::default())?;
    writer.append(&FrameBlock::new(samples, channels))?;
    writer.finalize()?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_recording(&dir, "sample.wav", 1, vec![0i16; 16000])?;

    let audio = AudioFile::open(&path)?;

    assert!((audio.duration_seconds - 1.0).abs() < 1e-9, "Duration should be 1s");
    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.bits_per_sample, 16);
    assert_eq!(audio.data_bytes, 32000);
    assert!(audio.path.contains("sample.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_garbage() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("garbage.wav");
    std::fs::write(&path, b"definitely not a RIFF file")?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}

#[test]
fn test_audio_file_interleaved_channels() -> Result<()> {
    let dir = TempDir::new()?;
    let samples = vec![100, -100, 200, -200, 300, -300];
    let path = write_recording(&dir, "stereo.wav", 2, samples.clone())?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.frames, 3);
    assert_eq!(
        audio.read_samples()?,
        samples,
        "Samples should keep their L/R order"
    );

    Ok(())
}

#[test]
fn test_audio_file_json_omits_samples() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_recording(&dir, "json.wav", 1, vec![1, 2, 3, 4])?;

    let audio = AudioFile::open(&path)?;
    let json: serde_json::Value = serde_json::to_value(&audio)?;

    assert_eq!(json["sample_rate"], 16000);
    assert_eq!(json["data_bytes"], 8);
    assert_eq!(json["frames"], 4);
    assert!(json.get("samples").is_none());

    Ok(())
}
