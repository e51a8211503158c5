// Sound output behind a lazily opened device handle.
//
// The device is created on first use, never at construction. A failed open is
// remembered for the rest of the session so the engine keeps running
// visual-only without retrying on every tone.

use std::fmt;

use super::pattern::Tone;
use crate::core::error::AudioUnavailable;

/// Something that can render tones.
pub trait ToneOutput {
    fn play(&mut self, tone: &Tone);
    /// Stop anything currently sounding.
    fn silence(&mut self);
}

/// Creates the output on demand.
pub trait OutputOpener {
    fn open(&mut self) -> Result<Box<dyn ToneOutput>, AudioUnavailable>;
}

impl<F> OutputOpener for F
where
    F: FnMut() -> Result<Box<dyn ToneOutput>, AudioUnavailable>,
{
    fn open(&mut self) -> Result<Box<dyn ToneOutput>, AudioUnavailable> {
        self()
    }
}

enum DeviceState {
    Pending(Box<dyn OutputOpener>),
    Ready(Box<dyn ToneOutput>),
    Unavailable(AudioUnavailable),
}

pub struct AudioDevice {
    state: DeviceState,
}

impl fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            DeviceState::Pending(_) => "pending",
            DeviceState::Ready(_) => "ready",
            DeviceState::Unavailable(_) => "unavailable",
        };
        f.debug_struct("AudioDevice").field("state", &state).finish()
    }
}

impl AudioDevice {
    pub fn new(opener: impl OutputOpener + 'static) -> Self {
        Self {
            state: DeviceState::Pending(Box::new(opener)),
        }
    }

    /// The default system output.
    #[cfg(feature = "playback")]
    pub fn system() -> Self {
        Self::new(|| rodio_output::RodioOutput::open().map(|out| Box::new(out) as Box<dyn ToneOutput>))
    }

    #[cfg(not(feature = "playback"))]
    pub fn system() -> Self {
        Self::disabled()
    }

    /// A device that is never available; the engine runs visual-only.
    pub fn disabled() -> Self {
        Self {
            state: DeviceState::Unavailable(AudioUnavailable::new("audio playback disabled")),
        }
    }

    /// Open the device if needed. Only the first failure is logged.
    pub fn ensure_ready(&mut self) -> Result<&mut dyn ToneOutput, AudioUnavailable> {
        if let DeviceState::Pending(opener) = &mut self.state {
            self.state = match opener.open() {
                Ok(output) => {
                    log::info!("Audio output ready");
                    DeviceState::Ready(output)
                }
                Err(err) => {
                    log::warn!("{err}; continuing without sound");
                    DeviceState::Unavailable(err)
                }
            };
        }
        match &mut self.state {
            DeviceState::Ready(output) => Ok(output.as_mut()),
            DeviceState::Unavailable(err) => Err(err.clone()),
            DeviceState::Pending(_) => Err(AudioUnavailable::new("audio output not opened")),
        }
    }

    /// Silence without opening the device.
    pub fn silence(&mut self) {
        if let DeviceState::Ready(output) = &mut self.state {
            output.silence();
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state, DeviceState::Unavailable(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, DeviceState::Ready(_))
    }
}

#[cfg(feature = "playback")]
mod rodio_output {
    use std::time::Duration;

    use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};

    use super::ToneOutput;
    use crate::core::audio::pattern::Tone;
    use crate::core::error::AudioUnavailable;

    const SAMPLE_RATE: u32 = 48_000;

    /// Renders one enveloped sine tone as mono samples.
    struct ToneSource {
        tone: Tone,
        sample: u32,
        total: u32,
    }

    impl ToneSource {
        fn new(tone: Tone) -> Self {
            let total = (tone.duration.as_secs_f32() * SAMPLE_RATE as f32).round() as u32;
            Self {
                tone,
                sample: 0,
                total,
            }
        }
    }

    impl Iterator for ToneSource {
        type Item = f32;

        fn next(&mut self) -> Option<f32> {
            if self.sample >= self.total {
                return None;
            }
            let t = self.sample as f32 / SAMPLE_RATE as f32;
            self.sample += 1;
            Some(self.tone.sample_at(t))
        }
    }

    impl Source for ToneSource {
        fn current_span_len(&self) -> Option<usize> {
            None
        }

        fn channels(&self) -> rodio::ChannelCount {
            1
        }

        fn sample_rate(&self) -> rodio::SampleRate {
            SAMPLE_RATE
        }

        fn total_duration(&self) -> Option<Duration> {
            Some(self.tone.duration)
        }
    }

    pub struct RodioOutput {
        stream: OutputStream,
        sink: Option<Sink>,
    }

    impl RodioOutput {
        pub fn open() -> Result<Self, AudioUnavailable> {
            let mut stream = OutputStreamBuilder::open_default_stream()
                .map_err(|err| AudioUnavailable::new(err.to_string()))?;
            stream.log_on_drop(false);
            Ok(Self { stream, sink: None })
        }
    }

    impl ToneOutput for RodioOutput {
        fn play(&mut self, tone: &Tone) {
            let stream = &self.stream;
            let sink = self.sink.get_or_insert_with(|| Sink::connect_new(stream.mixer()));
            sink.append(ToneSource::new(*tone));
        }

        fn silence(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
        }
    }
}
