// Tone patterns for each annunciated tier.

use std::time::Duration;

use crate::core::model::RiskTier;

/// Length of the linear attack ramp.
pub const ATTACK: Duration = Duration::from_millis(100);
/// Gain the exponential decay settles to at the end of a tone.
pub const DECAY_FLOOR: f32 = 0.01;

/// One sine tone within a pass, positioned relative to the pass start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration: Duration,
    pub offset: Duration,
    pub volume: f32,
}

impl Tone {
    const fn new(frequency_hz: f32, duration_ms: u64, offset_ms: u64, volume: f32) -> Self {
        Self {
            frequency_hz,
            duration: Duration::from_millis(duration_ms),
            offset: Duration::from_millis(offset_ms),
            volume,
        }
    }

    /// Envelope gain `t` seconds into the tone: linear ramp from silence to
    /// `volume` over the attack, then exponential decay towards
    /// `DECAY_FLOOR` at the end of the tone.
    pub fn gain_at(&self, t: f32) -> f32 {
        let length = self.duration.as_secs_f32();
        if t < 0.0 || t >= length {
            return 0.0;
        }
        let attack = ATTACK.as_secs_f32().min(length);
        if t < attack {
            return self.volume * t / attack;
        }
        let decay_len = length - attack;
        if decay_len <= f32::EPSILON || self.volume <= DECAY_FLOOR {
            return self.volume;
        }
        let progress = (t - attack) / decay_len;
        self.volume * (DECAY_FLOOR / self.volume).powf(progress)
    }

    pub fn sample_at(&self, t: f32) -> f32 {
        self.gain_at(t) * (std::f32::consts::TAU * self.frequency_hz * t).sin()
    }
}

/// The full cue for one tier: a pass of tones repeated on a fixed period.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneSequence {
    pub tier: RiskTier,
    pub tones: &'static [Tone],
    pub repeat_every: Duration,
    /// How long the "playing" indicator stays lit after a pass starts.
    pub pass_length: Duration,
}

static CRITICAL_TONES: [Tone; 4] = [
    Tone::new(1000.0, 200, 0, 0.4),
    Tone::new(1200.0, 200, 300, 0.4),
    Tone::new(1000.0, 200, 600, 0.4),
    Tone::new(1400.0, 300, 900, 0.4),
];

static WARNING_TONES: [Tone; 3] = [
    Tone::new(600.0, 400, 0, 0.4),
    Tone::new(800.0, 400, 500, 0.4),
    Tone::new(600.0, 400, 1000, 0.4),
];

static CRITICAL: ToneSequence = ToneSequence {
    tier: RiskTier::Critical,
    tones: &CRITICAL_TONES,
    repeat_every: Duration::from_secs(2),
    pass_length: Duration::from_millis(1200),
};

static WARNING: ToneSequence = ToneSequence {
    tier: RiskTier::Warning,
    tones: &WARNING_TONES,
    repeat_every: Duration::from_secs(3),
    pass_length: Duration::from_millis(1500),
};

/// LOW has no cue.
pub fn sequence_for(tier: RiskTier) -> Option<&'static ToneSequence> {
    match tier {
        RiskTier::Critical => Some(&CRITICAL),
        RiskTier::Warning => Some(&WARNING),
        RiskTier::Low => None,
    }
}
