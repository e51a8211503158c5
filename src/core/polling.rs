// Snapshot polling schedule.
//
// One warm-up fetch shortly after start, then fetches on a fixed interval
// measured from start. Manual refreshes are issued out of band and never
// move the schedule.

use std::time::Duration;

use super::scheduler::{EngineScheduler, Epoch, Fired, Timer, TimerId};

const MIN_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Warmup,
    Interval,
    Manual,
}

/// Identifies one snapshot fetch. `epoch` is the annunciation epoch current
/// when the fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    pub epoch: Epoch,
    pub reason: FetchReason,
}

pub struct PollingLoop {
    warmup: Duration,
    interval: Duration,
    warmup_timer: Option<TimerId>,
    interval_timer: Option<TimerId>,
    next_ticket: u64,
}

impl PollingLoop {
    pub fn new(warmup: Duration, interval: Duration) -> Self {
        Self {
            warmup,
            interval: interval.max(MIN_INTERVAL),
            warmup_timer: None,
            interval_timer: None,
            next_ticket: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restarting an already running loop resets both timers.
    pub fn start(&mut self, sched: &mut EngineScheduler) {
        self.stop(sched);
        self.warmup_timer = Some(sched.schedule_after(self.warmup, None, Timer::PollWarmup));
        self.interval_timer = Some(sched.schedule_after(self.interval, None, Timer::PollInterval));
        log::info!(
            "Polling started (warm-up {}ms, interval {}ms)",
            self.warmup.as_millis(),
            self.interval.as_millis()
        );
    }

    pub fn stop(&mut self, sched: &mut EngineScheduler) {
        let timers = [self.warmup_timer.take(), self.interval_timer.take()];
        let mut stopped = false;
        for id in timers.into_iter().flatten() {
            stopped |= sched.cancel(id);
        }
        if stopped {
            log::info!("Polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval_timer.is_some()
    }

    pub fn refresh_now(&mut self, epoch: Epoch) -> FetchTicket {
        self.ticket(epoch, FetchReason::Manual)
    }

    /// Handle a polling timer; returns the fetch it asks for, if any.
    pub fn on_timer(&mut self, sched: &mut EngineScheduler, fired: &Fired<Timer>, epoch: Epoch) -> Option<FetchTicket> {
        match fired.key {
            Timer::PollWarmup if self.warmup_timer == Some(fired.id) => {
                self.warmup_timer = None;
                Some(self.ticket(epoch, FetchReason::Warmup))
            }
            Timer::PollInterval if self.interval_timer == Some(fired.id) => {
                self.interval_timer =
                    Some(sched.schedule_at(fired.deadline + self.interval, None, Timer::PollInterval));
                Some(self.ticket(epoch, FetchReason::Interval))
            }
            _ => None,
        }
    }

    pub fn next_poll_at(&self, sched: &EngineScheduler) -> Option<Duration> {
        [self.warmup_timer, self.interval_timer]
            .into_iter()
            .flatten()
            .filter_map(|id| sched.deadline(id))
            .min()
    }

    fn ticket(&mut self, epoch: Epoch, reason: FetchReason) -> FetchTicket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        FetchTicket { id, epoch, reason }
    }
}
