//! Recording session - drains the capture ring buffer into a growing take

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{CaptureConfig, RingConsumer};

/// Count down `seconds` before a take, calling `announce` with N..=1
/// and waiting `tick` after each
pub fn countdown(seconds: u32, tick: Duration, mut announce: impl FnMut(u32)) {
    for remaining in (1..=seconds).rev() {
        announce(remaining);
        thread::sleep(tick);
    }
}

/// Consumer side of one recording
///
/// Owns the reading half of the ring buffer and accumulates everything it
/// drains, in order, into the session's sample buffer.
pub struct RecordingSession {
    consumer: RingConsumer,
    config: CaptureConfig,
    /// Batch buffer reused by every drain
    scratch: Vec<f32>,
    recorded: Vec<f32>,
    /// Drop count already reported
    last_dropped: u64,
}

impl RecordingSession {
    /// Ring buffer capacity giving roughly one second of headroom
    pub fn capacity_for(config: &CaptureConfig) -> usize {
        config.samples_per_second().max(1)
    }

    pub fn new(consumer: RingConsumer, config: CaptureConfig, batch: usize) -> Self {
        Self {
            consumer,
            config,
            scratch: vec![0.0; batch.max(1)],
            recorded: Vec::new(),
            last_dropped: 0,
        }
    }

    /// Move everything currently buffered into the recording
    ///
    /// Only the samples available when the drain starts are taken, so a fast
    /// producer cannot keep this call running. Returns the samples moved.
    pub fn drain(&mut self) -> usize {
        let mut remaining = self.consumer.available();
        let mut total = 0;

        while remaining > 0 {
            let want = remaining.min(self.scratch.len());
            let n = self.consumer.read_into(&mut self.scratch[..want]);
            if n == 0 {
                break;
            }
            self.recorded.extend_from_slice(&self.scratch[..n]);
            remaining -= n;
            total += n;
        }

        if total > 0 {
            log::debug!("Drained {} samples ({} recorded)", total, self.recorded.len());
        }
        self.report_overflow();
        total
    }

    fn report_overflow(&mut self) {
        let dropped = self.consumer.samples_dropped();
        if dropped > self.last_dropped {
            log::warn!(
                "buffer overflow: {} samples dropped ({} total)",
                dropped - self.last_dropped,
                dropped
            );
            self.last_dropped = dropped;
        }
    }

    /// Poll the ring buffer until `duration` elapses
    pub fn run_for(&mut self, duration: Duration, poll_interval: Duration) {
        self.run(duration, poll_interval, None);
    }

    /// Poll the ring buffer until `duration` elapses or `stop` is set
    pub fn run_until(&mut self, duration: Duration, poll_interval: Duration, stop: &AtomicBool) {
        self.run(duration, poll_interval, Some(stop));
    }

    fn run(&mut self, duration: Duration, poll_interval: Duration, stop: Option<&AtomicBool>) {
        // Durations past the end of the clock never expire
        let deadline = Instant::now().checked_add(duration);
        log::info!("Recording for {:.1}s", duration.as_secs_f64());

        while !stop.is_some_and(|stop| stop.load(Ordering::Relaxed)) {
            self.drain();
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            thread::sleep(wait);
        }

        self.drain();
        log::info!("Recorded {:.2}s of audio", self.duration().as_secs_f64());
    }

    /// Interleaved samples recorded so far
    pub fn samples(&self) -> &[f32] {
        &self.recorded
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.recorded
    }

    pub fn config(&self) -> CaptureConfig {
        self.config
    }

    /// Complete frames recorded (one sample per channel)
    pub fn frames(&self) -> usize {
        self.recorded.len() / self.config.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.config.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.config.sample_rate as f64)
    }

    /// Samples lost to ring buffer overflow during this session
    pub fn samples_dropped(&self) -> u64 {
        self.consumer.samples_dropped()
    }
}
