// Scripted audio host for tests and dry runs
//
// Devices and the audio each opened stream delivers are fixed up front. The
// script is pushed through the same bounded queue the cpal host uses, so
// block assembly and overrun reporting behave identically.

use std::sync::Mutex;

use super::backend::{AudioHost, CaptureParams, DeviceRef, FrameBlock, FrameSource};
use super::queue::{capture_queue, QueueFeed, QueuedSource};
use crate::error::{CaptureError, RecorderError, Result};
use crate::recording::StopFlag;

/// One step of a scripted stream
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// A buffer as a device callback would deliver it
    Samples(Vec<i16>),
    /// A stream error reported by the device
    Fault(CaptureError),
}

/// What happens after the script has been delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEnding {
    /// The stream ends on its own
    EndOfStream,
    /// The stream stays open until the stop flag is raised
    HoldUntilStopped,
}

pub struct MockHost {
    devices: Vec<String>,
    script: Vec<MockEvent>,
    ending: MockEnding,
    layout_change: Option<(usize, u16)>,
    open_failures: Mutex<u32>,
    opened: Mutex<u32>,
    live_feed: Mutex<Option<QueueFeed>>,
}

impl MockHost {
    pub fn new(devices: &[&str]) -> Self {
        Self {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            script: Vec::new(),
            ending: MockEnding::EndOfStream,
            layout_change: None,
            open_failures: Mutex::new(0),
            opened: Mutex::new(0),
            live_feed: Mutex::new(None),
        }
    }

    /// Host with no input devices at all
    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub fn with_script(mut self, script: Vec<MockEvent>) -> Self {
        self.script = script;
        self
    }

    /// Append `seconds` of silence in callback-sized buffers
    pub fn with_silence(mut self, sample_rate: u32, channels: u16, seconds: u32) -> Self {
        let buffer_len = (sample_rate / 100) as usize * channels as usize; // 10ms callbacks
        let buffers = seconds as usize * 100;
        self.script
            .extend((0..buffers).map(|_| MockEvent::Samples(vec![0i16; buffer_len])));
        self
    }

    pub fn with_ending(mut self, ending: MockEnding) -> Self {
        self.ending = ending;
        self
    }

    /// After `blocks` blocks, label every further block with `channels`
    ///
    /// Models a device that changes its layout mid-stream; the writer
    /// refuses such blocks.
    pub fn switch_layout_after(mut self, blocks: usize, channels: u16) -> Self {
        self.layout_change = Some((blocks, channels));
        self
    }

    /// Make the next `count` open attempts fail
    pub fn failing_opens(self, count: u32) -> Self {
        *self.open_failures.lock().unwrap_or_else(|e| e.into_inner()) = count;
        self
    }

    /// Number of streams successfully opened so far
    pub fn opened_streams(&self) -> u32 {
        *self.opened.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioHost for MockHost {
    fn input_devices(&self) -> Result<Vec<DeviceRef>> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, name)| DeviceRef {
                index,
                name: name.clone(),
            })
            .collect())
    }

    fn open(
        &self,
        device: &DeviceRef,
        params: &CaptureParams,
        stop: &StopFlag,
    ) -> Result<Box<dyn FrameSource>> {
        {
            let mut failures = self.open_failures.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(RecorderError::DeviceOpen {
                    device: device.name.clone(),
                    reason: "scripted open failure".to_string(),
                });
            }
        }

        params.validate()?;

        // Large enough that the script itself never overruns
        let script_samples: usize = self
            .script
            .iter()
            .map(|event| match event {
                MockEvent::Samples(samples) => samples.len(),
                MockEvent::Fault(_) => 0,
            })
            .sum();
        let params = CaptureParams {
            queue_blocks: params
                .queue_blocks
                .max(script_samples.div_ceil(params.block_len())),
            ..params.clone()
        };
        let (feed, source) = capture_queue(&params, stop);

        for event in &self.script {
            match event {
                MockEvent::Samples(samples) => feed.push(samples.clone()),
                MockEvent::Fault(err) => feed.fault(err.clone()),
            }
        }

        if self.ending == MockEnding::HoldUntilStopped {
            *self.live_feed.lock().unwrap_or_else(|e| e.into_inner()) = Some(feed);
        }

        *self.opened.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        match self.layout_change {
            Some((after, channels)) => Ok(Box::new(LayoutChange {
                source,
                after,
                channels,
                delivered: 0,
            })),
            None => Ok(Box::new(source)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Scripted source whose blocks switch channel count part way through
struct LayoutChange {
    source: QueuedSource,
    after: usize,
    channels: u16,
    delivered: usize,
}

impl FrameSource for LayoutChange {
    fn next_block(&mut self) -> std::result::Result<Option<FrameBlock>, CaptureError> {
        let block = match self.source.next_block()? {
            Some(block) => block,
            None => return Ok(None),
        };
        self.delivered += 1;
        if self.delivered > self.after {
            return Ok(Some(FrameBlock::new(block.samples().to_vec(), self.channels)));
        }
        Ok(Some(block))
    }

    fn stop(&mut self) {
        self.source.stop();
    }

    fn close(&mut self) {
        self.source.close();
    }
}
