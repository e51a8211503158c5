use std::time::Duration;

use super::alerts::aggregator::aggregate;
use super::alerts::model::Alert;
use super::annunciation::{AnnunciationController, AnnunciationState};
use super::audio::{AudioDevice, AudioScheduler};
use super::classifier::RiskClassifier;
use super::config::Settings;
use super::events::{NoticeLevel, UiEvent};
use super::model::{Prediction, RiskTier, Zone};
use super::polling::{FetchReason, FetchTicket, PollingLoop};
use super::provider::SnapshotOutcome;
use super::scheduler::{EngineScheduler, Timer};

pub const FETCH_FAILED_NOTICE: &str = "Failed to load data from server";

/// Work the host must perform on the engine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Snapshot(FetchTicket),
    Prediction(Zone),
}

#[derive(Debug, Default)]
pub struct CoordinatorOutput {
    pub requests: Vec<FetchRequest>,
    pub events: Vec<UiEvent>,
}

/// Owns the whole engine and runs it on caller-supplied virtual time.
///
/// Every entry point takes `now` (time since engine creation), fires the
/// timers due up to it, performs its action, and queues any resulting fetch
/// requests and UI events for `take_output`.
pub struct Coordinator {
    scheduler: EngineScheduler,
    polling: PollingLoop,
    classifier: RiskClassifier,
    annunciation: AnnunciationController,

    // Last accepted snapshot
    zones: Vec<Zone>,
    alerts: Vec<Alert>,

    requests: Vec<FetchRequest>,
    events: Vec<UiEvent>,
    playing: bool,
    running: bool,
}

impl Coordinator {
    pub fn new(settings: &Settings, device: AudioDevice) -> Self {
        let audio = AudioScheduler::new(device, settings.start_muted);
        Self {
            scheduler: EngineScheduler::new(),
            polling: PollingLoop::new(settings.warmup(), settings.poll_interval()),
            classifier: RiskClassifier::new(settings.score_thresholds),
            annunciation: AnnunciationController::new(
                audio,
                settings.test_critical_duration(),
                settings.test_warning_duration(),
            ),
            zones: Vec::new(),
            alerts: Vec::new(),
            requests: Vec::new(),
            events: Vec::new(),
            playing: false,
            running: false,
        }
    }

    pub fn start(&mut self, now: Duration) {
        self.advance(now);
        self.running = true;
        self.polling.start(&mut self.scheduler);
        self.settle(now);
    }

    /// Idempotent. Cancels polling, silences audio and returns to Inactive.
    pub fn stop(&mut self, now: Duration) {
        self.advance(now);
        if self.running {
            log::info!("Engine stopped");
        }
        self.running = false;
        self.polling.stop(&mut self.scheduler);
        self.annunciation.shutdown(&mut self.scheduler);
        self.settle(now);
    }

    /// Fire every timer due at or before `now`.
    pub fn advance(&mut self, now: Duration) {
        self.dispatch_due(now);
        self.collect_events();
    }

    /// Out-of-band fetch. The polling schedule is not disturbed.
    pub fn refresh_now(&mut self, now: Duration) {
        self.advance(now);
        if !self.running {
            log::debug!("Refresh ignored while stopped");
            return;
        }
        let ticket = self.polling.refresh_now(self.annunciation.epoch());
        self.requests.push(FetchRequest::Snapshot(ticket));
        self.events
            .push(UiEvent::notice(NoticeLevel::Info, "Refreshing data..."));
    }

    pub fn test_critical(&mut self, now: Duration) {
        self.advance(now);
        self.annunciation.test_critical(&mut self.scheduler);
        self.settle(now);
    }

    pub fn test_warning(&mut self, now: Duration) {
        self.advance(now);
        self.annunciation.test_warning(&mut self.scheduler);
        self.settle(now);
    }

    pub fn set_muted(&mut self, now: Duration, muted: bool) {
        self.advance(now);
        self.annunciation.set_muted(&mut self.scheduler, muted);
        self.settle(now);
    }

    pub fn preview_tone(&mut self, now: Duration, tier: RiskTier) {
        self.advance(now);
        self.annunciation.preview(&mut self.scheduler, tier);
        self.settle(now);
    }

    pub fn dismiss_banner(&mut self, now: Duration) {
        self.advance(now);
        self.annunciation.dismiss_banner();
        self.collect_events();
    }

    pub fn acknowledge_modal(&mut self, now: Duration) {
        self.advance(now);
        self.annunciation.acknowledge_modal();
        self.collect_events();
    }

    /// Request a prediction for a zone from the last snapshot.
    pub fn inspect_zone(&mut self, now: Duration, zone_id: &str) {
        self.advance(now);
        match self.zones.iter().find(|zone| zone.id == zone_id) {
            Some(zone) => self.requests.push(FetchRequest::Prediction(zone.clone())),
            None => self.events.push(UiEvent::notice(
                NoticeLevel::Warning,
                format!("Unknown zone '{zone_id}'"),
            )),
        }
    }

    /// Deliver the result of a snapshot fetch.
    ///
    /// Results are dropped after `stop` and when issued before the most
    /// recent manual test. A zones failure leaves the zone list empty; an
    /// alerts failure leaves everything as it was.
    pub fn complete_fetch(&mut self, now: Duration, ticket: FetchTicket, outcome: SnapshotOutcome) {
        self.advance(now);
        if !self.running {
            log::debug!("Dropping fetch #{} completed after stop", ticket.id);
            return;
        }
        if ticket.epoch < self.annunciation.manual_epoch() {
            log::debug!(
                "Discarding fetch #{} from epoch {} (manual test at epoch {})",
                ticket.id,
                ticket.epoch.value(),
                self.annunciation.manual_epoch().value()
            );
            return;
        }

        let SnapshotOutcome { zones, alerts } = outcome;
        let zones = zones.unwrap_or_else(|err| {
            log::warn!("Zone fetch failed: {err}");
            Vec::new()
        });
        let alerts = match alerts {
            Ok(alerts) => alerts,
            Err(err) => {
                log::warn!("Alert fetch failed: {err}");
                self.events
                    .push(UiEvent::notice(NoticeLevel::Error, FETCH_FAILED_NOTICE));
                return;
            }
        };

        let summary = self.classifier.summarize(&zones);
        self.zones = zones;
        self.alerts = alerts;
        self.events.push(UiEvent::Snapshot {
            zones: self.zones.clone(),
            alerts: self.alerts.clone(),
            summary,
        });

        let result = aggregate(&self.alerts);
        log::debug!(
            "Snapshot #{}: {} zones, {} alerts, governing tier {}",
            ticket.id,
            self.zones.len(),
            self.alerts.len(),
            result.tier
        );
        self.annunciation.update(&mut self.scheduler, result);

        if ticket.reason == FetchReason::Manual {
            self.events
                .push(UiEvent::notice(NoticeLevel::Info, "Data refreshed"));
        }
        self.settle(now);
    }

    pub fn complete_prediction(&mut self, now: Duration, zone_id: String, prediction: Prediction) {
        self.advance(now);
        self.events.push(UiEvent::Prediction {
            zone_id,
            prediction,
        });
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn take_output(&mut self) -> CoordinatorOutput {
        CoordinatorOutput {
            requests: std::mem::take(&mut self.requests),
            events: std::mem::take(&mut self.events),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> AnnunciationState {
        self.annunciation.state()
    }

    pub fn annunciation(&self) -> &AnnunciationController {
        &self.annunciation
    }

    pub fn scheduler(&self) -> &EngineScheduler {
        &self.scheduler
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Fire timers made due by the action just performed (zero-offset
    /// tones) and publish the resulting events.
    fn settle(&mut self, now: Duration) {
        self.dispatch_due(now);
        self.collect_events();
    }

    fn dispatch_due(&mut self, now: Duration) {
        while let Some(fired) = self.scheduler.pop_due(now) {
            match fired.key {
                Timer::PollWarmup | Timer::PollInterval => {
                    let epoch = self.annunciation.epoch();
                    if let Some(ticket) = self.polling.on_timer(&mut self.scheduler, &fired, epoch) {
                        log::debug!("Poll #{} ({:?})", ticket.id, ticket.reason);
                        self.requests.push(FetchRequest::Snapshot(ticket));
                    }
                }
                Timer::TestExpiry(_) => self.annunciation.on_test_expired(&mut self.scheduler, &fired),
                Timer::Tone { .. } | Timer::PatternRepeat(_) | Timer::PassEnded => {
                    self.annunciation.on_audio_timer(&mut self.scheduler, &fired);
                }
            }
            self.sync_playing();
        }
        self.scheduler.advance_to(now);
    }

    fn collect_events(&mut self) {
        self.events.extend(self.annunciation.take_events());
        self.sync_playing();
    }

    fn sync_playing(&mut self) {
        let playing = self.annunciation.audio().is_playing();
        if playing != self.playing {
            self.events.extend(self.annunciation.take_events());
            self.playing = playing;
            self.events.push(UiEvent::Playing(playing));
        }
    }
}
