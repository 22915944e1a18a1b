// Bounded hand-off between a device callback and the capture loop
//
// The queue holds at most `queue_blocks` blocks worth of samples, however
// the device happens to slice them into callbacks. The callback side never
// blocks: buffers that do not fit are counted and surfaced to the reader as
// an overrun before any later audio. Faults travel on their own channel,
// tagged with the number of buffers sent before them, so they are reported
// in stream order and never dropped.

use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{CaptureParams, FrameBlock, FrameSource};
use crate::error::CaptureError;
use crate::recording::StopFlag;

/// Longest a reader waits before re-checking the stop flag
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Create a connected feed/source pair
pub fn capture_queue(params: &CaptureParams, stop: &StopFlag) -> (QueueFeed, QueuedSource) {
    let block_len = params.block_len().max(1);
    let (samples_tx, samples_rx) = mpsc::channel();
    let (faults_tx, faults_rx) = mpsc::channel();
    let dropped = Arc::new(AtomicU64::new(0));
    let queued = Arc::new(AtomicUsize::new(0));

    let feed = QueueFeed {
        samples_tx,
        faults_tx,
        dropped: Arc::clone(&dropped),
        sent: Arc::new(AtomicU64::new(0)),
        queued: Arc::clone(&queued),
        capacity: params.queue_blocks.max(1).saturating_mul(block_len),
    };

    let source = QueuedSource {
        samples_rx,
        faults_rx,
        dropped,
        queued,
        reported_dropped: 0,
        received: 0,
        held_fault: None,
        pending: Vec::with_capacity(block_len),
        block_len,
        channels: params.channels.max(1),
        stop: stop.clone(),
        stopping: false,
        ended: false,
    };

    (feed, source)
}

/// Producer half, owned by the device callback
#[derive(Clone)]
pub struct QueueFeed {
    samples_tx: Sender<Vec<i16>>,
    faults_tx: Sender<(CaptureError, u64)>,
    dropped: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    /// Samples sent but not yet taken by the reader
    queued: Arc<AtomicUsize>,
    /// Most samples `queued` may reach
    capacity: usize,
}

impl QueueFeed {
    /// Hand over captured samples without blocking
    pub fn push(&self, samples: Vec<i16>) {
        let len = samples.len();
        let reserved = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                (queued + len <= self.capacity).then_some(queued + len)
            });

        if reserved.is_err() {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        // A send error means the reader is gone, nothing left to deliver to
        if self.samples_tx.send(samples).is_ok() {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn fault(&self, err: CaptureError) {
        let _ = self.faults_tx.send((err, self.sent.load(Ordering::SeqCst)));
    }
}

/// Consumer half: assembles fixed-size blocks from whatever the callback
/// delivered
pub struct QueuedSource {
    samples_rx: Receiver<Vec<i16>>,
    faults_rx: Receiver<(CaptureError, u64)>,
    dropped: Arc<AtomicU64>,
    queued: Arc<AtomicUsize>,
    reported_dropped: u64,
    /// Buffers taken off the sample queue so far
    received: u64,
    /// Fault waiting for the buffers sent ahead of it
    held_fault: Option<(CaptureError, u64)>,
    pending: Vec<i16>,
    block_len: usize,
    channels: u16,
    stop: StopFlag,
    stopping: bool,
    ended: bool,
}

impl QueuedSource {
    fn take_block(&mut self) -> FrameBlock {
        let rest = self.pending.split_off(self.block_len);
        let block = mem::replace(&mut self.pending, rest);
        FrameBlock::new(block, self.channels)
    }

    /// Final short block holding whole frames only
    fn take_tail(&mut self) -> Option<FrameBlock> {
        let whole = self.pending.len() - self.pending.len() % self.channels.max(1) as usize;
        self.pending.truncate(whole);
        if self.pending.is_empty() {
            return None;
        }
        Some(FrameBlock::new(mem::take(&mut self.pending), self.channels))
    }

    fn receive(&mut self, samples: Vec<i16>) {
        self.queued.fetch_sub(samples.len(), Ordering::SeqCst);
        self.received += 1;
        self.pending.extend(samples);
    }

    fn drain_queued(&mut self) {
        while let Ok(samples) = self.samples_rx.try_recv() {
            self.receive(samples);
        }
    }

    fn due_fault(&mut self) -> Option<CaptureError> {
        if self.held_fault.is_none() {
            self.held_fault = self.faults_rx.try_recv().ok();
        }
        match &self.held_fault {
            Some((_, sent_before)) if self.received >= *sent_before => {
                self.held_fault.take().map(|(err, _)| err)
            }
            _ => None,
        }
    }
}

impl FrameSource for QueuedSource {
    fn next_block(&mut self) -> Result<Option<FrameBlock>, CaptureError> {
        loop {
            if self.pending.len() >= self.block_len {
                return Ok(Some(self.take_block()));
            }

            if let Some(err) = self.due_fault() {
                return Err(err);
            }

            let dropped = self.dropped.load(Ordering::SeqCst);
            if dropped > self.reported_dropped {
                let dropped_blocks = dropped - self.reported_dropped;
                self.reported_dropped = dropped;
                return Err(CaptureError::Overrun { dropped_blocks });
            }

            if self.ended {
                return Ok(self.take_tail());
            }

            if self.stopping || self.stop.is_raised() {
                self.stopping = true;
                self.drain_queued();
                self.ended = true;
                continue;
            }

            match self.samples_rx.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(samples) => self.receive(samples),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => self.ended = true,
            }
        }
    }

    fn stop(&mut self) {
        self.stopping = true;
    }

    fn close(&mut self) {
        self.stopping = true;
        self.ended = true;
    }
}
