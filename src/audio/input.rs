//! Audio input capture
//!
//! This module handles capturing audio from input devices (microphones, etc.)
//! and feeding the interleaved samples into the session's ring buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::buffer::RingProducer;

/// Stack scratch size for converting integer samples in the callback
const SCRATCH_LEN: usize = 512;

/// Errors that can occur while opening or starting a capture stream
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input device available")]
    NoDevice,

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to query input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture was already started for this ring buffer")]
    ProducerTaken,
}

/// Requested capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
        }
    }
}

impl CaptureConfig {
    /// Interleaved samples produced per second of audio
    pub fn samples_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize
    }
}

#[inline]
fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Unsigned samples are centred on 32768
#[inline]
fn u16_to_f32(sample: u16) -> f32 {
    (sample as f32 - 32768.0) / 32768.0
}

/// Index of `name` in `devices`, or `None` for the host default
fn device_index(devices: &[String], name: Option<&str>) -> Result<Option<usize>, CaptureError> {
    match name {
        None => Ok(None),
        Some(name) => devices
            .iter()
            .position(|d| d == name)
            .map(Some)
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string())),
    }
}

/// Names of the input devices on the default host
pub fn list_input_devices() -> Vec<String> {
    cpal::default_host()
        .input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Audio input capture engine
pub struct AudioInput {
    /// Whether capture is active
    is_capturing: Arc<AtomicBool>,

    /// The audio input stream
    stream: Option<cpal::Stream>,

    /// Ring buffer writer, moved into the stream callback on start
    producer: Option<RingProducer>,

    /// Callbacks that could not hand their whole block to the ring buffer
    overflow_events: Arc<AtomicU64>,

    config: CaptureConfig,

    /// Available input devices
    pub devices: Vec<String>,

    /// Selected device index (`None` uses the host default)
    pub selected_device: Option<usize>,

    /// Status message
    pub status: String,
}

impl AudioInput {
    /// Create a new audio input handler writing into `producer`
    pub fn new(producer: RingProducer, config: CaptureConfig) -> Self {
        let devices = list_input_devices();
        let device_count = devices.len();

        Self {
            is_capturing: Arc::new(AtomicBool::new(false)),
            stream: None,
            producer: Some(producer),
            overflow_events: Arc::new(AtomicU64::new(0)),
            config,
            devices,
            selected_device: None,
            status: if device_count > 0 {
                format!("Found {} input device(s)", device_count)
            } else {
                "No input devices found".to_string()
            },
        }
    }

    /// Select a device by name, or the host default with `None`
    pub fn select_device(&mut self, name: Option<&str>) -> Result<(), CaptureError> {
        self.selected_device = device_index(&self.devices, name)?;
        Ok(())
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::Relaxed)
    }

    /// Number of callbacks that overflowed the ring buffer so far
    pub fn overflow_events(&self) -> u64 {
        self.overflow_events.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> CaptureConfig {
        self.config
    }

    fn open_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match self.selected_device {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(index) => host.input_devices()?.nth(index).ok_or_else(|| {
                CaptureError::DeviceNotFound(
                    self.devices.get(index).cloned().unwrap_or_default(),
                )
            }),
        }
    }

    /// Start audio capture
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        log::info!("Starting audio capture...");

        let result = self.build_stream();
        match &result {
            Ok(device_name) => {
                self.status = format!("Capturing: {}", device_name);
                log::info!("Capture started");
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
            }
        }
        result.map(|_| ())
    }

    fn build_stream(&mut self) -> Result<String, CaptureError> {
        let device = self.open_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let sample_format = device.default_input_config()?.sample_format();
        let stream_config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        log::info!("Audio config: {:?} ({:?})", stream_config, sample_format);

        let mut producer = self.producer.take().ok_or(CaptureError::ProducerTaken)?;
        let is_capturing = Arc::clone(&self.is_capturing);
        let overflow_events = Arc::clone(&self.overflow_events);
        let on_error = |err: cpal::StreamError| log::error!("Audio error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    if producer.write(data) < data.len() {
                        overflow_events.fetch_add(1, Ordering::Relaxed);
                    }
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    if !write_converted(&mut producer, data, i16_to_f32) {
                        overflow_events.fetch_add(1, Ordering::Relaxed);
                    }
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    if !write_converted(&mut producer, data, u16_to_f32) {
                        overflow_events.fetch_add(1, Ordering::Relaxed);
                    }
                },
                on_error,
                None,
            )?,
            format => return Err(CaptureError::UnsupportedFormat(format!("{:?}", format))),
        };

        play_capturing(&self.is_capturing, || stream.play())?;
        self.stream = Some(stream);
        Ok(device_name)
    }

    /// Stop audio capture
    ///
    /// Dropping the stream releases the ring buffer producer; a stopped
    /// input cannot be restarted.
    pub fn stop(&mut self) {
        self.is_capturing.store(false, Ordering::Relaxed);
        self.stream = None;
        self.status = "Stopped".to_string();
        log::info!("Capture stopped");
    }
}

/// Raise `is_capturing` and run `play`, lowering the flag again if it fails.
///
/// The flag goes up first so the backend's first blocks reach the ring.
fn play_capturing<E>(
    is_capturing: &AtomicBool,
    play: impl FnOnce() -> Result<(), E>,
) -> Result<(), E> {
    is_capturing.store(true, Ordering::Relaxed);
    play().map_err(|e| {
        is_capturing.store(false, Ordering::Relaxed);
        e
    })
}

/// Convert `data` to f32 through a stack scratch buffer and write it.
///
/// Returns `false` if the ring buffer could not take the whole block; the
/// remainder is counted as dropped without being offered.
fn write_converted<T: Copy>(
    producer: &mut RingProducer,
    data: &[T],
    convert: impl Fn(T) -> f32,
) -> bool {
    let mut scratch = [0.0_f32; SCRATCH_LEN];
    let mut offered = 0;

    for chunk in data.chunks(SCRATCH_LEN) {
        let out = &mut scratch[..chunk.len()];
        for (dst, &sample) in out.iter_mut().zip(chunk) {
            *dst = convert(sample);
        }

        offered += chunk.len();
        if producer.write(out) < chunk.len() {
            producer.record_dropped(data.len() - offered);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RingBuffer;

    #[test]
    fn test_samples_per_second() {
        let config = CaptureConfig {
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(config.samples_per_second(), 96000);
    }

    #[test]
    fn test_write_converted_scales_i16() {
        let (mut producer, mut consumer) = RingBuffer::new(8).unwrap().split();

        let data = [0i16, 16384, -32768];

        let ok = write_converted(&mut producer, &data[..], i16_to_f32);

        assert!(ok);
        assert_eq!(consumer.read(3), vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_write_converted_centres_u16() {
        let (mut producer, mut consumer) = RingBuffer::new(8).unwrap().split();

        let data = [32768u16, 0, 49152, 16384];

        let ok = write_converted(&mut producer, &data[..], u16_to_f32);

        assert!(ok);
        assert_eq!(consumer.read(4), vec![0.0, -1.0, 0.5, -0.5]);
    }

    #[test]
    fn test_capturing_before_play_returns() {
        let flag = AtomicBool::new(false);
        let mut during = false;

        let result = play_capturing(&flag, || {
            during = flag.load(Ordering::Relaxed);
            Ok::<(), ()>(())
        });

        assert!(result.is_ok());
        assert!(during);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_failed_play_clears_capturing() {
        let flag = AtomicBool::new(false);
        let mut during = false;

        let result = play_capturing(&flag, || {
            during = flag.load(Ordering::Relaxed);
            Err("device busy")
        });

        assert_eq!(result, Err("device busy"));
        assert!(during);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_device_index_by_name() {
        let devices = vec!["Built-in Mic".to_string(), "USB Mic".to_string()];

        assert_eq!(device_index(&devices, None).unwrap(), None);
        assert_eq!(device_index(&devices, Some("USB Mic")).unwrap(), Some(1));
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let devices = vec!["Built-in Mic".to_string()];

        match device_index(&devices, Some("Headset")) {
            Err(CaptureError::DeviceNotFound(name)) => assert_eq!(name, "Headset"),
            other => panic!("expected DeviceNotFound, got {:?}", other),
        }
        assert!(matches!(
            device_index(&[], Some("Headset")),
            Err(CaptureError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_write_converted_counts_unoffered_chunks() {
        let (mut producer, consumer) = RingBuffer::new(SCRATCH_LEN + 10).unwrap().split();
        let data = vec![1i16; SCRATCH_LEN * 3];

        let ok = write_converted(&mut producer, &data, |s| s as f32);

        assert!(!ok);
        assert_eq!(consumer.available(), SCRATCH_LEN + 10);
        assert_eq!(
            consumer.samples_dropped(),
            (SCRATCH_LEN * 3 - (SCRATCH_LEN + 10)) as u64
        );
    }
}
