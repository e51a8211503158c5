// Annunciation state machine.
//
// Maps the aggregated alert condition onto exactly one of three states and
// drives the banner, the acknowledgement modal and the audio pattern from it.
// Every state change bumps the epoch and cancels timers from older epochs.

use std::time::Duration;

use super::alerts::aggregator::Aggregation;
use super::alerts::model::Alert;
use super::audio::AudioScheduler;
use super::events::{NoticeLevel, UiEvent};
use super::model::RiskTier;
use super::scheduler::{EngineScheduler, Epoch, Fired, Timer, TimerId};

pub const TEST_CRITICAL_MESSAGE: &str =
    "TEST: Critical danger detected in Zone B - Immediate evacuation required!";
pub const TEST_WARNING_MESSAGE: &str =
    "TEST: Warning conditions detected in Zone D - Increased monitoring required!";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnnunciationState {
    #[default]
    Inactive,
    WarningActive,
    CriticalActive,
}

impl AnnunciationState {
    pub fn for_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low => Self::Inactive,
            RiskTier::Warning => Self::WarningActive,
            RiskTier::Critical => Self::CriticalActive,
        }
    }

    pub fn tier(&self) -> RiskTier {
        match self {
            Self::Inactive => RiskTier::Low,
            Self::WarningActive => RiskTier::Warning,
            Self::CriticalActive => RiskTier::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveTest {
    tier: RiskTier,
    expiry: TimerId,
}

pub struct AnnunciationController {
    audio: AudioScheduler,
    state: AnnunciationState,
    message: Option<String>,
    epoch: Epoch,
    /// Epoch entered by the most recent manual test.
    manual_epoch: Epoch,
    lead_id: Option<String>,
    banner_visible: bool,
    modal_visible: bool,
    test: Option<ActiveTest>,
    test_critical_for: Duration,
    test_warning_for: Duration,
    events: Vec<UiEvent>,
}

impl AnnunciationController {
    pub fn new(audio: AudioScheduler, test_critical_for: Duration, test_warning_for: Duration) -> Self {
        Self {
            audio,
            state: AnnunciationState::Inactive,
            message: None,
            epoch: Epoch::ZERO,
            manual_epoch: Epoch::ZERO,
            lead_id: None,
            banner_visible: false,
            modal_visible: false,
            test: None,
            test_critical_for,
            test_warning_for,
            events: Vec::new(),
        }
    }

    /// Apply a real aggregation result.
    ///
    /// While a test is running, results below the test tier are ignored;
    /// anything at or above it ends the test.
    pub fn update(&mut self, sched: &mut EngineScheduler, result: Aggregation) {
        if let Some(test) = self.test {
            if result.tier < test.tier {
                log::debug!("Ignoring {} result during {} test", result.tier, test.tier);
                return;
            }
            sched.cancel(test.expiry);
            self.test = None;
            self.lead_id = None;
            log::info!("{} test superseded by real {} condition", test.tier, result.tier);
        }

        self.apply(sched, &result);
    }

    pub fn test_critical(&mut self, sched: &mut EngineScheduler) {
        self.start_test(sched, RiskTier::Critical, TEST_CRITICAL_MESSAGE, self.test_critical_for);
    }

    pub fn test_warning(&mut self, sched: &mut EngineScheduler) {
        self.start_test(sched, RiskTier::Warning, TEST_WARNING_MESSAGE, self.test_warning_for);
    }

    /// Expiry always returns to Inactive. A real condition comes back with
    /// the next poll.
    pub fn on_test_expired(&mut self, sched: &mut EngineScheduler, fired: &Fired<Timer>) {
        let Some(test) = self.test.filter(|test| test.expiry == fired.id) else {
            return;
        };
        self.test = None;
        self.lead_id = None;
        log::info!("{} test expired", test.tier);

        self.apply(sched, &Aggregation::default());
    }

    pub fn on_audio_timer(&mut self, sched: &mut EngineScheduler, fired: &Fired<Timer>) {
        self.audio.on_timer(sched, fired);
    }

    pub fn dismiss_banner(&mut self) {
        if self.banner_visible {
            self.banner_visible = false;
            self.events.push(UiEvent::BannerHidden);
        }
    }

    pub fn acknowledge_modal(&mut self) {
        if self.modal_visible {
            self.modal_visible = false;
            self.events.push(UiEvent::ModalHidden);
        }
    }

    pub fn set_muted(&mut self, sched: &mut EngineScheduler, muted: bool) {
        self.audio.set_muted(sched, muted);
    }

    /// Play one pass of `tier`'s pattern without changing state.
    pub fn preview(&mut self, sched: &mut EngineScheduler, tier: RiskTier) {
        self.audio.test(sched, tier, self.epoch);
    }

    /// Return to Inactive and forget everything seen so far.
    pub fn shutdown(&mut self, sched: &mut EngineScheduler) {
        if let Some(test) = self.test.take() {
            sched.cancel(test.expiry);
        }
        self.apply(sched, &Aggregation::default());
        self.audio.stop(sched);
    }

    pub fn take_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> AnnunciationState {
        self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn manual_epoch(&self) -> Epoch {
        self.manual_epoch
    }

    pub fn lead_id(&self) -> Option<&str> {
        self.lead_id.as_deref()
    }

    pub fn is_test_active(&self) -> bool {
        self.test.is_some()
    }

    pub fn banner_visible(&self) -> bool {
        self.banner_visible
    }

    pub fn modal_visible(&self) -> bool {
        self.modal_visible
    }

    pub fn audio(&self) -> &AudioScheduler {
        &self.audio
    }

    fn start_test(&mut self, sched: &mut EngineScheduler, tier: RiskTier, message: &str, lasts: Duration) {
        if let Some(previous) = self.test.take() {
            sched.cancel(previous.expiry);
        }

        // Always re-enter, even from the same state, so the pattern restarts.
        self.enter(sched, AnnunciationState::for_tier(tier));
        self.manual_epoch = self.epoch;
        self.lead_id = None;
        self.show(tier, message.to_string(), false);

        let expiry = sched.schedule_after(lasts, Some(self.epoch), Timer::TestExpiry(tier));
        self.test = Some(ActiveTest { tier, expiry });
        log::info!("{tier} test started for {}ms", lasts.as_millis());
        self.events.push(UiEvent::notice(
            NoticeLevel::Info,
            format!("Test {} alert triggered", tier.describe()),
        ));
    }

    fn apply(&mut self, sched: &mut EngineScheduler, result: &Aggregation) {
        let next = AnnunciationState::for_tier(result.tier);
        let changed = next != self.state;
        if changed {
            self.enter(sched, next);
        }

        if next == AnnunciationState::Inactive {
            self.message = None;
            self.lead_id = None;
            self.hide_all();
            return;
        }

        let lead_id = result.lead_id().map(str::to_string);
        if !changed && lead_id == self.lead_id {
            return;
        }
        self.lead_id = lead_id;

        let message = match &result.lead {
            Some(alert) => describe(alert),
            None => format!("Elevated {} conditions detected.", result.tier.describe()),
        };
        let critical = result.tier == RiskTier::Critical;
        let (level, label) = match &result.lead {
            Some(alert) => (
                if critical { NoticeLevel::Error } else { NoticeLevel::Warning },
                alert.zone_label().to_string(),
            ),
            None => (NoticeLevel::Warning, "unknown zone".to_string()),
        };
        self.show(result.tier, message, critical);
        self.events.push(UiEvent::notice(
            level,
            format!("New {} alert: {label}", result.tier.describe()),
        ));
    }

    fn enter(&mut self, sched: &mut EngineScheduler, next: AnnunciationState) {
        self.epoch = self.epoch.next();
        sched.cancel_before(self.epoch);
        log::info!(
            "Annunciation {:?} -> {:?} (epoch {})",
            self.state,
            next,
            self.epoch.value()
        );
        self.state = next;
        self.audio.start(sched, next.tier(), self.epoch);
    }

    fn show(&mut self, tier: RiskTier, message: String, modal: bool) {
        self.message = Some(message.clone());
        self.banner_visible = true;
        self.events.push(UiEvent::BannerShown {
            tier,
            message: message.clone(),
        });

        if modal {
            self.modal_visible = true;
            self.events.push(UiEvent::ModalShown { message });
        } else if self.modal_visible {
            self.modal_visible = false;
            self.events.push(UiEvent::ModalHidden);
        }
    }

    fn hide_all(&mut self) {
        self.dismiss_banner();
        self.acknowledge_modal();
    }
}

/// `"<zone> shows <tier> conditions. <action>"`
fn describe(alert: &Alert) -> String {
    let mut message = format!("{} shows {} conditions.", alert.zone_label(), alert.tier.describe());
    let action = alert.recommended_action.trim();
    if !action.is_empty() {
        message.push(' ');
        message.push_str(action);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::aggregator::aggregate;
    use crate::core::audio::output::testing::{recording_device, PlayLog};
    use chrono::Utc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup() -> (AnnunciationController, EngineScheduler, PlayLog) {
        let (device, log) = recording_device();
        let controller = AnnunciationController::new(
            AudioScheduler::new(device, false),
            Duration::from_secs(10),
            Duration::from_secs(8),
        );
        (controller, EngineScheduler::new(), log)
    }

    fn run_until(ctl: &mut AnnunciationController, sched: &mut EngineScheduler, until: Duration) {
        while let Some(fired) = sched.pop_due(until) {
            match fired.key {
                Timer::TestExpiry(_) => ctl.on_test_expired(sched, &fired),
                _ => ctl.on_audio_timer(sched, &fired),
            }
        }
        sched.advance_to(until);
    }

    fn alert(id: &str, zone: &str, name: &str, tier: RiskTier, action: &str) -> Alert {
        let mut alert = Alert::active(id, zone, name, tier, Utc::now());
        alert.recommended_action = action.to_string();
        alert
    }

    fn critical_b() -> Aggregation {
        aggregate(&[alert(
            "ALT001",
            "B",
            "South Slope",
            RiskTier::Critical,
            "Immediate evacuation required",
        )])
    }

    #[test]
    fn test_critical_shows_banner_and_modal() {
        let (mut ctl, mut sched, _) = setup();
        ctl.update(&mut sched, critical_b());

        assert_eq!(ctl.state(), AnnunciationState::CriticalActive);
        assert_eq!(
            ctl.message(),
            Some("South Slope shows critical conditions. Immediate evacuation required")
        );
        assert!(ctl.banner_visible() && ctl.modal_visible());
        assert_eq!(ctl.audio().active_tier(), Some(RiskTier::Critical));
    }

    #[test]
    fn test_warning_hides_modal() {
        let (mut ctl, mut sched, _) = setup();
        ctl.update(&mut sched, critical_b());
        ctl.take_events();

        let warning = aggregate(&[alert("ALT002", "D", "West Highwall", RiskTier::Warning, "")]);
        ctl.update(&mut sched, warning);

        assert_eq!(ctl.state(), AnnunciationState::WarningActive);
        assert!(ctl.banner_visible());
        assert!(!ctl.modal_visible());
        assert!(ctl.take_events().contains(&UiEvent::ModalHidden));
        assert_eq!(ctl.message(), Some("West Highwall shows warning conditions."));
    }

    #[test]
    fn test_same_tier_keeps_dismissed_banner() {
        let (mut ctl, mut sched, _) = setup();
        ctl.update(&mut sched, critical_b());
        let epoch = ctl.epoch();
        ctl.dismiss_banner();
        ctl.take_events();

        ctl.update(&mut sched, critical_b());
        assert_eq!(ctl.epoch(), epoch);
        assert!(!ctl.banner_visible());
        assert!(ctl.take_events().is_empty());
    }

    #[test]
    fn test_new_lead_reshows_banner() {
        let (mut ctl, mut sched, _) = setup();
        ctl.update(&mut sched, critical_b());
        ctl.dismiss_banner();
        ctl.acknowledge_modal();

        let other = aggregate(&[alert("ALT007", "C", "East Bench", RiskTier::Critical, "")]);
        ctl.update(&mut sched, other);

        assert!(ctl.banner_visible() && ctl.modal_visible());
        assert_eq!(ctl.lead_id(), Some("ALT007"));
    }

    #[test]
    fn test_low_hides_everything_and_stops_audio() {
        let (mut ctl, mut sched, _) = setup();
        ctl.update(&mut sched, critical_b());
        ctl.update(&mut sched, Aggregation::default());

        assert_eq!(ctl.state(), AnnunciationState::Inactive);
        assert!(!ctl.banner_visible() && !ctl.modal_visible());
        assert!(ctl.message().is_none());
        assert!(ctl.audio().active_tier().is_none());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_critical_test_expires_back_to_inactive() {
        let (mut ctl, mut sched, _) = setup();
        ctl.test_critical(&mut sched);

        assert_eq!(ctl.state(), AnnunciationState::CriticalActive);
        assert_eq!(ctl.message(), Some(TEST_CRITICAL_MESSAGE));
        assert!(ctl.banner_visible());
        assert!(!ctl.modal_visible());
        assert_eq!(ctl.manual_epoch(), ctl.epoch());

        run_until(&mut ctl, &mut sched, ms(9999));
        assert!(ctl.is_test_active());
        run_until(&mut ctl, &mut sched, ms(10_000));
        assert_eq!(ctl.state(), AnnunciationState::Inactive);
        assert!(ctl.audio().active_tier().is_none());
    }

    #[test]
    fn test_lower_real_result_does_not_preempt_test() {
        let (mut ctl, mut sched, _) = setup();
        ctl.test_critical(&mut sched);
        run_until(&mut ctl, &mut sched, ms(4000));

        let warning = aggregate(&[alert("ALT002", "D", "West Highwall", RiskTier::Warning, "")]);
        ctl.update(&mut sched, warning);
        assert_eq!(ctl.state(), AnnunciationState::CriticalActive);

        run_until(&mut ctl, &mut sched, ms(10_000));
        assert_eq!(ctl.state(), AnnunciationState::Inactive);
        assert!(ctl.audio().active_tier().is_none());
        assert!(!ctl.banner_visible());
        assert!(ctl.lead_id().is_none());
    }

    #[test]
    fn test_warning_test_expires_after_eight_seconds() {
        let (mut ctl, mut sched, log) = setup();
        ctl.test_warning(&mut sched);
        assert_eq!(ctl.message(), Some(TEST_WARNING_MESSAGE));

        run_until(&mut ctl, &mut sched, ms(7_999));
        assert_eq!(ctl.state(), AnnunciationState::WarningActive);
        assert_eq!(ctl.audio().active_tier(), Some(RiskTier::Warning));

        run_until(&mut ctl, &mut sched, ms(8_000));
        assert_eq!(ctl.state(), AnnunciationState::Inactive);
        assert!(ctl.audio().active_tier().is_none());
        assert!(sched.is_empty());

        log.clear();
        run_until(&mut ctl, &mut sched, ms(20_000));
        assert_eq!(log.tone_count(), 0);
    }

    #[test]
    fn test_equal_real_result_supersedes_test() {
        let (mut ctl, mut sched, _) = setup();
        ctl.test_warning(&mut sched);
        let epoch = ctl.epoch();

        let warning = aggregate(&[alert("ALT002", "D", "West Highwall", RiskTier::Warning, "")]);
        ctl.update(&mut sched, warning);

        assert!(!ctl.is_test_active());
        assert_eq!(ctl.epoch(), epoch, "Same state, no re-entry");
        assert_eq!(ctl.message(), Some("West Highwall shows warning conditions."));
        assert!(!sched.pending_keys().any(|k| matches!(k, Timer::TestExpiry(_))));
    }

    #[test]
    fn test_repeated_test_restarts_pattern() {
        let (mut ctl, mut sched, log) = setup();
        ctl.test_critical(&mut sched);
        run_until(&mut ctl, &mut sched, ms(500));
        let first_epoch = ctl.epoch();
        log.clear();

        ctl.test_critical(&mut sched);
        run_until(&mut ctl, &mut sched, ms(500));

        assert!(ctl.epoch() > first_epoch);
        assert_eq!(log.tones().first(), Some(&1000.0), "Pattern starts from the first tone");
        assert_eq!(ctl.audio().next_repeat_at(&sched), Some(ms(2500)));
    }
}
