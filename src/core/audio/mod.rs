// Audio annunciation.
//
// - pattern.rs: Tone sequences and envelope per tier
// - output.rs: Lazily opened output device (rodio behind the `playback` feature)
// - scheduler.rs: Repeating pattern playback driven by engine timers

pub mod output;
pub mod pattern;
pub mod scheduler;

pub use output::{AudioDevice, OutputOpener, ToneOutput};
pub use scheduler::AudioScheduler;
