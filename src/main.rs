//! vocals - record vocals from a microphone to a WAV file

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use vocals::audio::{list_input_devices, wav, AudioInput, RingBuffer};
use vocals::session::{countdown, RecordingSession};
use vocals::settings::RecordSettings;

#[derive(Parser)]
#[command(name = "vocals")]
#[command(about = "Record vocals to a WAV file", long_about = None)]
#[command(version)]
struct Cli {
    /// Output WAV filename
    #[arg(required_unless_present = "list_devices")]
    outfile: Option<PathBuf>,

    /// Duration in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Sample rate
    #[arg(short, long)]
    rate: Option<u32>,

    /// Number of input channels
    #[arg(long)]
    channels: Option<u16>,

    /// Countdown in seconds before recording starts
    #[arg(short, long)]
    countdown: Option<u32>,

    /// Input device name (defaults to the host default device)
    #[arg(long)]
    device: Option<String>,

    /// Samples moved out of the ring buffer per read
    #[arg(long)]
    batch: Option<usize>,

    /// Persist the effective settings as the new defaults
    #[arg(long)]
    save_settings: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    /// Override persisted settings with anything given on the command line
    fn apply(&self, settings: &mut RecordSettings) {
        if let Some(duration) = self.duration {
            settings.duration_secs = duration;
        }
        if let Some(rate) = self.rate {
            settings.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            settings.channels = channels;
        }
        if let Some(countdown) = self.countdown {
            settings.countdown_secs = countdown;
        }
        if let Some(device) = &self.device {
            settings.device = Some(device.clone());
        }
        if let Some(batch) = self.batch {
            settings.drain_batch = batch;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Starting vocals");

    let cli = Cli::parse();

    if cli.list_devices {
        for (i, name) in list_input_devices().iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let mut settings = RecordSettings::load();
    cli.apply(&mut settings);
    if cli.save_settings {
        settings.save();
    }

    let outfile = cli.outfile.ok_or("missing output file")?;
    let config = settings.capture_config();

    let ring = RingBuffer::new(RecordingSession::capacity_for(&config))?;
    log::info!("Ring buffer capacity: {} samples", ring.capacity());
    let (producer, consumer) = ring.split();

    let mut input = AudioInput::new(producer, config);
    input.select_device(settings.device.as_deref())?;

    countdown(settings.countdown_secs, Duration::from_secs(1), |n| println!("{}", n));
    input.start()?;

    let mut session = RecordingSession::new(consumer, config, settings.drain_batch);
    session.run_for(settings.duration(), settings.poll_interval());

    input.stop();
    session.drain();

    if input.overflow_events() > 0 {
        log::warn!(
            "{} capture callbacks overflowed, {} samples lost",
            input.overflow_events(),
            session.samples_dropped()
        );
    }

    wav::write_wav(&outfile, session.samples(), config.sample_rate, config.channels)?;
    println!(
        "Saved {:.2}s to {}",
        session.duration().as_secs_f64(),
        outfile.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_c_is_countdown() {
        let cli = Cli::try_parse_from(["vocals", "take.wav", "-c", "3", "--channels", "2"]).unwrap();
        let mut settings = RecordSettings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.countdown_secs, 3);
        assert_eq!(settings.channels, 2);
    }

    #[test]
    fn test_outfile_required_unless_listing() {
        assert!(Cli::try_parse_from(["vocals"]).is_err());
        assert!(Cli::try_parse_from(["vocals", "--list-devices"]).is_ok());
    }
}
