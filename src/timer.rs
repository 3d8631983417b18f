//! The periodic broadcast timer.
//!
//! At most one timer is ever active. Arming always deletes the previous timer
//! before creating the next one, so a rate change can never leave a stale
//! timer firing alongside the new one.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::TimerError;
use crate::event::{Event, EventSender};

pub struct TimerManager {
    events: EventSender,
    active: Option<JoinHandle<()>>,
    interval: u32,
}

impl TimerManager {
    /// Creates a disarmed timer that will deliver [`Event::TimerExpired`] into `events`.
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            active: None,
            interval: 0,
        }
    }

    /// Arms a repeating timer with the given interval in seconds.
    ///
    /// The first expiry happens one full interval after arming, never
    /// immediately. An interval of `0` leaves the timer disarmed.
    ///
    /// # Errors
    /// Returns [`TimerError::Create`] if there is no runtime to drive the
    /// timer, or [`TimerError::Set`] if the first deadline is not
    /// representable. In both cases the timer is left disarmed.
    pub fn arm(&mut self, seconds: u32) -> Result<(), TimerError> {
        self.disarm();
        if seconds == 0 {
            info!("Periodic broadcast disabled");
            return Ok(());
        }

        let period = Duration::from_secs(u64::from(seconds));
        let start = Instant::now()
            .checked_add(period)
            .ok_or(TimerError::Set { seconds })?;
        let runtime = Handle::try_current().map_err(|e| TimerError::Create(e.to_string()))?;

        let events = self.events.clone();
        let task = runtime.spawn(async move {
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(Event::TimerExpired).is_err() {
                    debug!("Timer stopping: event channel closed");
                    break;
                }
            }
        });

        self.active = Some(task);
        self.interval = seconds;
        info!("Periodic broadcast every {}s", seconds);
        Ok(())
    }

    /// Deletes the active timer, if any.
    pub fn disarm(&mut self) {
        if let Some(task) = self.active.take() {
            task.abort();
            debug!("Deleted {}s timer", self.interval);
        }
        self.interval = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Interval of the active timer in seconds, `0` when disarmed.
    pub fn interval(&self) -> u32 {
        self.interval
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.disarm();
    }
}
