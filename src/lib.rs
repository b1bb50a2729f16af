//! vocals - microphone recorder built around a lock-free sample ring buffer
//!
//! The platform audio callback writes captured samples into a fixed-capacity
//! [`RingBuffer`](audio::RingBuffer); a [`RecordingSession`](session::RecordingSession)
//! drains it at its own pace and the finished take is exported as WAV.

pub mod audio;
pub mod session;
pub mod settings;
