// Microphone capture through cpal
//
// The device callback converts whatever sample format the device delivers
// into i16 and pushes it into a bounded queue; the capture loop reads fixed
// size blocks from the other end.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig, StreamError};
use tracing::{debug, error, info, warn};

use super::backend::{AudioHost, CaptureParams, DeviceRef, FrameBlock, FrameSource};
use super::queue::{capture_queue, QueueFeed, QueuedSource};
use crate::error::{CaptureError, RecorderError, Result};
use crate::recording::StopFlag;

/// Platform audio host
pub struct CpalHost {
    host: cpal::Host,
}

impl CpalHost {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn find_device(&self, device: &DeviceRef) -> Result<Device> {
        let open_error = |reason: String| RecorderError::DeviceOpen {
            device: device.name.clone(),
            reason,
        };

        let found = self
            .host
            .input_devices()
            .map_err(|e| open_error(e.to_string()))?
            .nth(device.index)
            .ok_or_else(|| open_error("device disappeared before it could be opened".into()))?;

        let name = found.name().unwrap_or_default();
        if name != device.name {
            return Err(open_error(format!(
                "device at index {} is now '{}'",
                device.index, name
            )));
        }

        Ok(found)
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for CpalHost {
    fn input_devices(&self) -> Result<Vec<DeviceRef>> {
        let devices = self.host.input_devices().map_err(|e| {
            error!("Failed to enumerate input devices: {}", e);
            RecorderError::NoDeviceFound
        })?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| DeviceRef {
                index,
                name: device.name().unwrap_or_else(|_| "Unknown Device".to_string()),
            })
            .collect())
    }

    fn open(
        &self,
        device: &DeviceRef,
        params: &CaptureParams,
        stop: &StopFlag,
    ) -> Result<Box<dyn FrameSource>> {
        params.validate()?;
        let cpal_device = self.find_device(device)?;
        let sample_format = pick_sample_format(&cpal_device, params).map_err(|reason| {
            RecorderError::DeviceOpen {
                device: device.name.clone(),
                reason,
            }
        })?;

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "Opening '{}' at {}Hz, {} channel(s), device format {:?}",
            device.name, params.sample_rate, params.channels, sample_format
        );

        let (feed, queue) = capture_queue(params, stop);

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&cpal_device, &config, feed),
            SampleFormat::U16 => build_stream::<u16>(&cpal_device, &config, feed),
            SampleFormat::F32 => build_stream::<f32>(&cpal_device, &config, feed),
            other => Err(format!("unsupported sample format {:?}", other)),
        }
        .map_err(|reason| RecorderError::DeviceOpen {
            device: device.name.clone(),
            reason,
        })?;

        stream.play().map_err(|e| RecorderError::DeviceOpen {
            device: device.name.clone(),
            reason: format!("failed to start stream: {}", e),
        })?;

        Ok(Box::new(CpalSource {
            stream: Some(stream),
            queue,
            device_name: device.name.clone(),
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Prefer a native i16 stream; otherwise any format we can convert from
fn pick_sample_format(device: &Device, params: &CaptureParams) -> std::result::Result<SampleFormat, String> {
    let rate = cpal::SampleRate(params.sample_rate);
    let formats: Vec<SampleFormat> = device
        .supported_input_configs()
        .map_err(|e| format!("failed to query supported configs: {}", e))?
        .filter(|range| {
            range.channels() == params.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .map(|range| range.sample_format())
        .collect();

    debug!("Formats supporting requested config: {:?}", formats);

    [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16]
        .into_iter()
        .find(|wanted| formats.contains(wanted))
        .ok_or_else(|| {
            format!(
                "no supported config for {}Hz with {} channel(s)",
                params.sample_rate, params.channels
            )
        })
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    feed: QueueFeed,
) -> std::result::Result<Stream, String>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let fault_feed = feed.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                feed.push(data.iter().map(|&s| sample_to_i16(s)).collect());
            },
            move |err| fault_feed.fault(classify_stream_error(err)),
            None,
        )
        .map_err(|e| e.to_string())
}

fn classify_stream_error(err: StreamError) -> CaptureError {
    match err {
        StreamError::DeviceNotAvailable => {
            CaptureError::DeviceLost("device is no longer available".to_string())
        }
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Convert any device sample type to i16 for the WAV data chunk
fn sample_to_i16<T>(sample: T) -> i16
where
    i16: FromSample<T>,
{
    i16::from_sample_(sample)
}

/// Capture stream on a cpal device
struct CpalSource {
    stream: Option<Stream>,
    queue: QueuedSource,
    device_name: String,
}

impl FrameSource for CpalSource {
    fn next_block(&mut self) -> std::result::Result<Option<FrameBlock>, CaptureError> {
        self.queue.next_block()
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream on '{}': {}", self.device_name, e);
            }
        }
        self.queue.stop();
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Released input device '{}'", self.device_name);
        }
        self.queue.close();
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}
