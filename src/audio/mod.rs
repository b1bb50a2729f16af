//! Audio module - handles audio capture, sample buffering and export
//!
//! This module provides:
//! - Ring buffer for lock-free sample hand-off between threads
//! - Audio input capture
//! - WAV export of finished recordings

mod buffer;
mod input;
pub mod wav;

pub use buffer::{RingBuffer, RingBufferError, RingConsumer, RingProducer, MAX_CAPACITY};
pub use input::{list_input_devices, AudioInput, CaptureConfig, CaptureError};
pub use wav::ExportError;
