// Drives tone playback from scheduler timers.
//
// At most one pattern repeats at a time. Every timer carries the epoch it was
// scheduled under; callbacks from another epoch are dropped on arrival.

use std::time::Duration;

use super::output::AudioDevice;
use super::pattern::sequence_for;
use crate::core::model::RiskTier;
use crate::core::scheduler::{EngineScheduler, Epoch, Fired, Timer, TimerId};

pub struct AudioScheduler {
    device: AudioDevice,
    muted: bool,
    active: Option<RiskTier>,
    epoch: Epoch,
    repeat: Option<TimerId>,
    pending_tones: Vec<TimerId>,
    pass_end: Option<TimerId>,
    playing: bool,
}

impl AudioScheduler {
    pub fn new(device: AudioDevice, muted: bool) -> Self {
        Self {
            device,
            muted,
            active: None,
            epoch: Epoch::ZERO,
            repeat: None,
            pending_tones: Vec::new(),
            pass_end: None,
            playing: false,
        }
    }

    /// Begin the repeating pattern for `tier`. LOW stops playback.
    ///
    /// Calling again for the tier already running under the same epoch does
    /// nothing, so the repeat timer keeps its original phase.
    pub fn start(&mut self, sched: &mut EngineScheduler, tier: RiskTier, epoch: Epoch) {
        let Some(seq) = sequence_for(tier) else {
            self.stop(sched);
            return;
        };
        let running = self.repeat.is_some_and(|id| sched.is_pending(id));
        if running && self.active == Some(tier) && self.epoch == epoch {
            return;
        }

        self.cancel_timers(sched);
        self.active = Some(tier);
        self.epoch = epoch;
        log::debug!("Starting {tier} pattern (epoch {})", epoch.value());

        self.play_pass(sched, tier, false);
        self.repeat = Some(sched.schedule_after(
            seq.repeat_every,
            Some(epoch),
            Timer::PatternRepeat(tier),
        ));
    }

    pub fn stop(&mut self, sched: &mut EngineScheduler) {
        if self.active.take().is_some() {
            log::debug!("Audio stopped");
        }
        self.cancel_timers(sched);
        self.device.silence();
    }

    /// Idempotent. Muting silences immediately and drops queued tones but
    /// leaves the repeat timer running; unmuting lets its next tick play.
    pub fn set_muted(&mut self, sched: &mut EngineScheduler, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        log::info!("Audio {}", if muted { "muted" } else { "unmuted" });
        if muted {
            self.cancel_pass(sched);
            self.device.silence();
        }
    }

    /// One pass of `tier`'s pattern, outside the repeat cycle. The playing
    /// indicator is shown even while muted.
    pub fn test(&mut self, sched: &mut EngineScheduler, tier: RiskTier, epoch: Epoch) {
        if sequence_for(tier).is_none() {
            return;
        }
        if self.active.is_none() {
            self.epoch = epoch;
        }
        self.play_pass(sched, tier, true);
    }

    pub fn on_timer(&mut self, sched: &mut EngineScheduler, fired: &Fired<Timer>) {
        match fired.key {
            Timer::Tone { tier, index } => {
                self.pending_tones.retain(|id| *id != fired.id);
                if fired.epoch != Some(self.epoch) || self.muted {
                    return;
                }
                let Some(tone) = sequence_for(tier).and_then(|seq| seq.tones.get(index)) else {
                    return;
                };
                if let Ok(output) = self.device.ensure_ready() {
                    output.play(tone);
                }
            }
            Timer::PatternRepeat(tier) => {
                if self.repeat != Some(fired.id) || fired.epoch != Some(self.epoch) {
                    return;
                }
                let Some(seq) = sequence_for(tier) else {
                    return;
                };
                self.repeat = Some(sched.schedule_at(
                    fired.deadline + seq.repeat_every,
                    fired.epoch,
                    Timer::PatternRepeat(tier),
                ));
                if !self.muted {
                    self.play_pass(sched, tier, false);
                }
            }
            Timer::PassEnded => {
                if self.pass_end == Some(fired.id) {
                    self.pass_end = None;
                    self.playing = false;
                }
            }
            _ => {}
        }
    }

    pub fn next_repeat_at(&self, sched: &EngineScheduler) -> Option<Duration> {
        self.repeat.and_then(|id| sched.deadline(id))
    }

    pub fn pending_tones(&self, sched: &EngineScheduler) -> usize {
        self.pending_tones
            .iter()
            .filter(|id| sched.is_pending(**id))
            .count()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn active_tier(&self) -> Option<RiskTier> {
        self.active
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn audio_unavailable(&self) -> bool {
        self.device.is_unavailable()
    }

    fn play_pass(&mut self, sched: &mut EngineScheduler, tier: RiskTier, force_indicator: bool) {
        let Some(seq) = sequence_for(tier) else {
            return;
        };
        self.cancel_pass(sched);

        let audible = !self.muted && !self.device.is_unavailable();
        if audible {
            for (index, tone) in seq.tones.iter().enumerate() {
                let id = sched.schedule_after(tone.offset, Some(self.epoch), Timer::Tone { tier, index });
                self.pending_tones.push(id);
            }
        }
        if audible || force_indicator {
            self.playing = true;
            self.pass_end = Some(sched.schedule_after(seq.pass_length, Some(self.epoch), Timer::PassEnded));
        }
    }

    fn cancel_pass(&mut self, sched: &mut EngineScheduler) {
        for id in self.pending_tones.drain(..) {
            sched.cancel(id);
        }
        if let Some(id) = self.pass_end.take() {
            sched.cancel(id);
        }
        self.playing = false;
    }

    fn cancel_timers(&mut self, sched: &mut EngineScheduler) {
        if let Some(id) = self.repeat.take() {
            sched.cancel(id);
        }
        self.cancel_pass(sched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::output::testing::{failing_device, recording_device, PlayEvent, PlayLog};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup(muted: bool) -> (AudioScheduler, EngineScheduler, PlayLog) {
        let (device, log) = recording_device();
        (AudioScheduler::new(device, muted), EngineScheduler::new(), log)
    }

    fn run_until(audio: &mut AudioScheduler, sched: &mut EngineScheduler, until: Duration) {
        while let Some(fired) = sched.pop_due(until) {
            audio.on_timer(sched, &fired);
        }
        sched.advance_to(until);
    }

    #[test]
    fn test_critical_pass_plays_four_tones() {
        let (mut audio, mut sched, log) = setup(false);
        let epoch = Epoch::ZERO.next();

        audio.start(&mut sched, RiskTier::Critical, epoch);
        run_until(&mut audio, &mut sched, ms(1500));

        assert_eq!(log.tones(), vec![1000.0, 1200.0, 1000.0, 1400.0]);
        assert_eq!(audio.next_repeat_at(&sched), Some(ms(2000)));
    }

    #[test]
    fn test_pattern_repeats_on_period() {
        let (mut audio, mut sched, log) = setup(false);
        audio.start(&mut sched, RiskTier::Warning, Epoch::ZERO.next());

        run_until(&mut audio, &mut sched, ms(7500));
        assert_eq!(log.tone_count(), 9, "Passes at 0s, 3s and 6s");
        assert_eq!(audio.next_repeat_at(&sched), Some(ms(9000)));
    }

    #[test]
    fn test_start_same_tier_same_epoch_is_noop() {
        let (mut audio, mut sched, _log) = setup(false);
        let epoch = Epoch::ZERO.next();
        audio.start(&mut sched, RiskTier::Critical, epoch);
        run_until(&mut audio, &mut sched, ms(700));

        let before = audio.next_repeat_at(&sched);
        audio.start(&mut sched, RiskTier::Critical, epoch);

        assert_eq!(audio.next_repeat_at(&sched), before);
        assert_eq!(audio.pending_tones(&sched), 1, "Remaining tone of the first pass untouched");
    }

    #[test]
    fn test_switching_tier_cancels_previous_repeat() {
        let (mut audio, mut sched, log) = setup(false);
        let first = Epoch::ZERO.next();
        audio.start(&mut sched, RiskTier::Warning, first);
        run_until(&mut audio, &mut sched, ms(100));
        log.clear();

        audio.start(&mut sched, RiskTier::Critical, first.next());
        run_until(&mut audio, &mut sched, ms(5000));

        assert!(log.tones().iter().all(|f| *f != 600.0 && *f != 800.0));
        let repeats = sched
            .pending_keys()
            .filter(|key| matches!(key, Timer::PatternRepeat(_)))
            .count();
        assert_eq!(repeats, 1);
    }

    #[test]
    fn test_mute_is_idempotent_and_resumes() {
        let (mut audio, mut sched, log) = setup(false);
        audio.start(&mut sched, RiskTier::Critical, Epoch::ZERO.next());
        run_until(&mut audio, &mut sched, ms(100));

        audio.set_muted(&mut sched, true);
        audio.set_muted(&mut sched, true);
        assert_eq!(log.events().last(), Some(&PlayEvent::Silence));
        assert_eq!(audio.pending_tones(&sched), 0);
        assert_eq!(audio.next_repeat_at(&sched), Some(ms(2000)), "Repeat keeps ticking");

        log.clear();
        run_until(&mut audio, &mut sched, ms(3900));
        assert_eq!(log.tone_count(), 0, "Muted ticks are no-ops");

        audio.set_muted(&mut sched, false);
        run_until(&mut audio, &mut sched, ms(5500));
        assert_eq!(log.tones(), vec![1000.0, 1200.0, 1000.0, 1400.0]);
    }

    #[test]
    fn test_stop_silences_and_clears() {
        let (mut audio, mut sched, log) = setup(false);
        audio.start(&mut sched, RiskTier::Warning, Epoch::ZERO.next());
        run_until(&mut audio, &mut sched, ms(10));

        audio.stop(&mut sched);
        assert!(audio.active_tier().is_none());
        assert!(!audio.is_playing());
        assert!(sched.is_empty());
        assert_eq!(log.events().last(), Some(&PlayEvent::Silence));
    }

    #[test]
    fn test_stale_epoch_tone_is_dropped() {
        let (mut audio, mut sched, log) = setup(false);
        let old = Epoch::ZERO.next();
        sched.schedule_at(ms(0), Some(old), Timer::Tone { tier: RiskTier::Critical, index: 0 });
        audio.start(&mut sched, RiskTier::Warning, old.next());
        log.clear();

        run_until(&mut audio, &mut sched, ms(1));
        assert_eq!(log.tones(), vec![600.0]);
    }

    #[test]
    fn test_preview_while_muted_lights_indicator_only() {
        let (mut audio, mut sched, log) = setup(true);
        audio.test(&mut sched, RiskTier::Critical, Epoch::ZERO);

        assert!(audio.is_playing());
        run_until(&mut audio, &mut sched, ms(1199));
        assert!(audio.is_playing());
        run_until(&mut audio, &mut sched, ms(1200));
        assert!(!audio.is_playing());
        assert_eq!(log.tone_count(), 0);
    }

    #[test]
    fn test_unavailable_device_degrades_silently() {
        let (device, attempts) = failing_device();
        let mut audio = AudioScheduler::new(device, false);
        let mut sched = EngineScheduler::new();

        audio.start(&mut sched, RiskTier::Critical, Epoch::ZERO.next());
        run_until(&mut audio, &mut sched, ms(4500));

        assert_eq!(attempts.get(), 1);
        assert!(audio.audio_unavailable());
        assert_eq!(audio.active_tier(), Some(RiskTier::Critical));
        assert!(audio.next_repeat_at(&sched).is_some());
    }
}
