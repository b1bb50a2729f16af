//! WAV export
//!
//! Recordings are written as 16-bit PCM. Samples are clamped to [-1, 1]
//! and scaled by `i16::MAX`.

use std::path::Path;

use thiserror::Error;

/// Errors that can occur while writing or reading WAV files
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat {
        bits: u16,
        format: hound::SampleFormat,
    },
}

#[inline]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Write interleaved samples to `path` as a 16-bit PCM WAV file
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;

    log::debug!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

/// Read a WAV file back as interleaved f32 samples
///
/// Accepts 16-bit PCM (as written by [`write_wav`]) and 32-bit float files.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, hound::WavSpec), ExportError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
            .collect::<Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Float, 32) => {
            reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
        }
        (format, bits) => return Err(ExportError::UnsupportedFormat { bits, format }),
    };

    Ok((samples, spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_clamps() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), i16::MAX);
        assert_eq!(to_pcm16(4.0), i16::MAX);
        assert_eq!(to_pcm16(-4.0), -i16::MAX);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let samples = [0.0, 0.5, -0.5, 1.0, -1.0, 0.25];

        write_wav(&path, &samples, 22050, 2).unwrap();
        let (read, spec) = read_wav(&path).unwrap();

        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(read.len(), samples.len());
        for (a, b) in read.iter().zip(&samples) {
            assert!((a - b).abs() < 1.0 / 16384.0, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_empty_recording_writes_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");

        write_wav(&path, &[], 44100, 1).unwrap();
        let (read, _) = read_wav(&path).unwrap();

        assert!(read.is_empty());
    }
}
