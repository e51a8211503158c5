use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::{
    audio::AudioDevice,
    config::{ConfigManager, Settings},
    coordinator::{Coordinator, FetchRequest},
    events::UiEvent,
    model::{Prediction, RiskTier},
    polling::FetchTicket,
    provider::{self, SnapshotOutcome, SnapshotProvider},
};

/// Host operations accepted by the background loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RefreshNow,
    TestCritical,
    TestWarning,
    PreviewTone(RiskTier),
    SetMuted(bool),
    DismissBanner,
    AcknowledgeModal,
    InspectZone(String),
    Stop,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let tier = |arg: Option<&str>| -> Result<RiskTier, String> {
            match arg.map(RiskTier::from_str) {
                Some(Ok(tier)) if tier != RiskTier::Low => Ok(tier),
                _ => Err(format!("'{verb}' expects 'critical' or 'warning'")),
            }
        };

        Ok(match verb.as_str() {
            "refresh" => Self::RefreshNow,
            "test" => match tier(arg)? {
                RiskTier::Critical => Self::TestCritical,
                _ => Self::TestWarning,
            },
            "preview" => Self::PreviewTone(tier(arg)?),
            "mute" => Self::SetMuted(true),
            "unmute" => Self::SetMuted(false),
            "dismiss" => Self::DismissBanner,
            "ack" | "acknowledge" => Self::AcknowledgeModal,
            "inspect" => match arg {
                Some(zone) => Self::InspectZone(zone.to_string()),
                None => return Err("'inspect' expects a zone id".to_string()),
            },
            "quit" | "exit" | "stop" => Self::Stop,
            other => return Err(format!("unknown command '{other}'")),
        })
    }
}

enum Completion {
    Snapshot(FetchTicket, SnapshotOutcome),
    Prediction(String, Prediction),
}

/// Background loop: drives the coordinator from wall-clock time, host
/// commands and fetch completions until `Command::Stop` or the command
/// channel closes.
pub async fn run_engine(
    settings: Settings,
    provider: Arc<dyn SnapshotProvider>,
    device: AudioDevice,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<UiEvent>,
) {
    let origin = Instant::now();
    let elapsed = || Instant::now().saturating_duration_since(origin);

    let mut coordinator = Coordinator::new(&settings, device);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    coordinator.start(elapsed());
    log::info!("Risk annunciation engine started");

    loop {
        forward(&mut coordinator, &provider, &done_tx, &events);
        let deadline = coordinator.next_deadline().map(|d| origin + d);

        tokio::select! {
            _ = sleep_until(deadline) => coordinator.advance(elapsed()),
            command = commands.recv() => match command {
                Some(Command::Stop) | None => {
                    coordinator.stop(elapsed());
                    forward(&mut coordinator, &provider, &done_tx, &events);
                    break;
                }
                Some(command) => apply(&mut coordinator, command, elapsed()),
            },
            Some(done) = done_rx.recv() => match done {
                Completion::Snapshot(ticket, outcome) => {
                    coordinator.complete_fetch(elapsed(), ticket, outcome);
                }
                Completion::Prediction(zone_id, prediction) => {
                    coordinator.complete_prediction(elapsed(), zone_id, prediction);
                }
            },
        }
    }
    log::info!("Risk annunciation engine stopped");
}

fn apply(coordinator: &mut Coordinator, command: Command, now: Duration) {
    match command {
        Command::RefreshNow => coordinator.refresh_now(now),
        Command::TestCritical => coordinator.test_critical(now),
        Command::TestWarning => coordinator.test_warning(now),
        Command::PreviewTone(tier) => coordinator.preview_tone(now, tier),
        Command::SetMuted(muted) => coordinator.set_muted(now, muted),
        Command::DismissBanner => coordinator.dismiss_banner(now),
        Command::AcknowledgeModal => coordinator.acknowledge_modal(now),
        Command::InspectZone(zone_id) => coordinator.inspect_zone(now, &zone_id),
        Command::Stop => coordinator.stop(now),
    }
}

/// Spawn requested fetches and publish queued events.
fn forward(
    coordinator: &mut Coordinator,
    provider: &Arc<dyn SnapshotProvider>,
    done: &mpsc::UnboundedSender<Completion>,
    events: &mpsc::UnboundedSender<UiEvent>,
) {
    let output = coordinator.take_output();
    let classifier = *coordinator.classifier();

    for request in output.requests {
        let provider = provider.clone();
        let done = done.clone();
        match request {
            FetchRequest::Snapshot(ticket) => {
                tokio::spawn(async move {
                    let outcome = provider::fetch_snapshot(provider.as_ref()).await;
                    let _ = done.send(Completion::Snapshot(ticket, outcome));
                });
            }
            FetchRequest::Prediction(zone) => {
                tokio::spawn(async move {
                    let prediction = provider::predict_or_fallback(provider.as_ref(), &classifier, &zone).await;
                    let _ = done.send(Completion::Prediction(zone.id, prediction));
                });
            }
        }
    }

    for event in output.events {
        if events.send(event).is_err() {
            log::debug!("UI event receiver closed");
            break;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(err) => log::warn!("{err}"),
            },
            Ok(None) => {
                let _ = tx.send(Command::Stop).await;
                break;
            }
            Err(err) => {
                log::warn!("Failed to read command: {err}");
                let _ = tx.send(Command::Stop).await;
                break;
            }
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rockfall_sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ROCKFALL_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn run() {
    init_logging();

    let config_manager = ConfigManager::new(config_dir());
    let settings = config_manager.load();
    log::info!("Settings loaded from {}", config_manager.path().display());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            return;
        }
    };

    runtime.block_on(async move {
        let provider = match provider::from_settings(&settings) {
            Ok(provider) => provider,
            Err(err) => {
                log::error!("Failed to create snapshot provider: {err}");
                return;
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_commands(cmd_tx));
        let printer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => log::warn!("Failed to encode UI event: {err}"),
                }
            }
        });

        run_engine(settings, provider, AudioDevice::system(), cmd_rx, event_tx).await;
        let _ = printer.await;
    });

    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_background();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::Alert;
    use crate::core::audio::output::testing::recording_device;
    use crate::core::error::FetchFailure;
    use crate::core::model::Zone;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedProvider {
        alerts: Vec<Alert>,
    }

    #[async_trait]
    impl SnapshotProvider for FixedProvider {
        async fn fetch_zones(&self) -> Result<Vec<Zone>, FetchFailure> {
            Ok(vec![Zone::new("B", "South Slope").with_metrics(12.4, 3.8)])
        }

        async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchFailure> {
            Ok(self.alerts.clone())
        }

        async fn fetch_prediction(&self, _zone: &Zone) -> Result<Prediction, FetchFailure> {
            Err(FetchFailure::Provider("offline".to_string()))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("refresh".parse::<Command>(), Ok(Command::RefreshNow));
        assert_eq!("test Critical".parse::<Command>(), Ok(Command::TestCritical));
        assert_eq!("test warning".parse::<Command>(), Ok(Command::TestWarning));
        assert_eq!(
            "preview critical".parse::<Command>(),
            Ok(Command::PreviewTone(RiskTier::Critical))
        );
        assert_eq!("inspect B".parse::<Command>(), Ok(Command::InspectZone("B".to_string())));
        assert_eq!("ack".parse::<Command>(), Ok(Command::AcknowledgeModal));
        assert!("test low".parse::<Command>().is_err());
        assert!("inspect".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_annunciates_first_poll() {
        let (device, log) = recording_device();
        let alert = Alert::active("ALT001", "B", "South Slope", RiskTier::Critical, Utc::now());
        let provider: Arc<dyn SnapshotProvider> = Arc::new(FixedProvider { alerts: vec![alert] });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let driver = async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cmd_tx.send(Command::Stop).await.unwrap();
        };
        tokio::join!(
            run_engine(Settings::default(), provider, device, cmd_rx, event_tx),
            driver
        );

        let events = drain(&mut event_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::BannerShown { tier: RiskTier::Critical, .. })));
        assert!(events.contains(&UiEvent::BannerHidden), "Stop clears the banner");
        assert!(log.tone_count() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspect_falls_back_to_heuristic() {
        let (device, _log) = recording_device();
        let provider: Arc<dyn SnapshotProvider> = Arc::new(FixedProvider { alerts: Vec::new() });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let driver = async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cmd_tx.send(Command::InspectZone("B".to_string())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            cmd_tx.send(Command::Stop).await.unwrap();
        };
        tokio::join!(
            run_engine(Settings::default(), provider, device, cmd_rx, event_tx),
            driver
        );

        let prediction = drain(&mut event_rx)
            .into_iter()
            .find_map(|e| match e {
                UiEvent::Prediction { zone_id, prediction } => Some((zone_id, prediction)),
                _ => None,
            })
            .unwrap();
        assert_eq!(prediction.0, "B");
        assert_eq!(prediction.1.risk_level, RiskTier::Critical);
        assert_eq!(prediction.1.prediction, "Zone B assessment complete");
    }
}
