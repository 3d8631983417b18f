//! The single-threaded event loop.
//!
//! [`Engine`] is the context every handler works on. [`Engine::run`] pulls
//! one [`Event`] at a time and handles it to completion before pulling the
//! next; nothing is coalesced, and an event that arrives during a broadcast
//! cycle waits until the cycle is over.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::{Seeds, VarNames};
use crate::cycle::{BroadcastConfig, BroadcastCycle};
use crate::error::{ConfigError, TimerError};
use crate::event::{Event, EventReceiver};
use crate::stats::StatsCounter;
use crate::store::{ConfigStore, NotifyKind, OnChange, SessionId, VarDef, VarHandle, VarType, VarValue};
use crate::timer::TimerManager;

/// Byte bound of the interface allow-list variable.
pub const INTERFACE_LIST_LEN: usize = 256;

/// Byte bound of the published address variable.
pub const IP_ADDR_LEN: usize = 64;

/// Handles of every variable the engine uses.
#[derive(Debug, Clone, Copy)]
pub struct Handles {
    pub verbose: VarHandle,
    pub trigger: VarHandle,
    pub rate: VarHandle,
    pub enable: VarHandle,
    pub interfaces: VarHandle,
    pub port: VarHandle,
    pub metrics: VarHandle,
    pub ip: VarHandle,
}

impl Handles {
    /// Registers every engine variable and fixes its dispatch entry.
    ///
    /// Seed values only apply to variables this process creates.
    ///
    /// # Errors
    /// Fails on the first variable that cannot be registered.
    pub fn register(store: &mut ConfigStore, names: &VarNames, seeds: &Seeds) -> Result<Self, ConfigError> {
        let verbose = store.register(
            VarDef::new(&names.verbose, VarType::U16)
                .notify(NotifyKind::Modified)
                .initial(VarValue::U16(u16::from(seeds.verbose))),
            OnChange::Nothing,
        )?;
        let trigger = store.register(
            VarDef::new(&names.trigger, VarType::U16).notify(NotifyKind::Modified),
            OnChange::Broadcast,
        )?;
        let rate = store.register(
            VarDef::new(&names.rate, VarType::U32)
                .notify(NotifyKind::Modified)
                .initial(VarValue::U32(seeds.rate)),
            OnChange::RearmTimer,
        )?;
        let enable = store.register(
            VarDef::new(&names.enable, VarType::U16)
                .notify(NotifyKind::Modified)
                .initial(VarValue::U16(u16::from(seeds.enable))),
            OnChange::Nothing,
        )?;
        let interfaces = store.register(
            VarDef::new(&names.interfaces, VarType::Str)
                .max_len(INTERFACE_LIST_LEN)
                .notify(NotifyKind::Modified)
                .initial(VarValue::Str(seeds.interfaces.clone())),
            OnChange::Nothing,
        )?;
        let port = store.register(
            VarDef::new(&names.port, VarType::U16)
                .notify(NotifyKind::Modified)
                .initial(VarValue::U16(seeds.port)),
            OnChange::Nothing,
        )?;
        let metrics = store.register(
            VarDef::new(&names.metrics, VarType::U16).notify(NotifyKind::Print),
            OnChange::Nothing,
        )?;
        let ip = store.register(
            VarDef::new(&names.ip, VarType::Str).max_len(IP_ADDR_LEN),
            OnChange::Nothing,
        )?;

        Ok(Self {
            verbose,
            trigger,
            rate,
            enable,
            interfaces,
            port,
            metrics,
            ip,
        })
    }
}

/// Engine context: all state the handlers read and mutate.
pub struct Engine {
    store: ConfigStore,
    handles: Handles,
    template: PathBuf,
    timer: TimerManager,
    cycle: BroadcastCycle,
    stats: StatsCounter,
}

impl Engine {
    pub fn new(
        store: ConfigStore,
        handles: Handles,
        template: PathBuf,
        timer: TimerManager,
        cycle: BroadcastCycle,
    ) -> Self {
        Self {
            store,
            handles,
            template,
            timer,
            cycle,
            stats: StatsCounter::new(),
        }
    }

    /// Arms the timer from the configured rate.
    ///
    /// # Errors
    /// A failure here is fatal to startup.
    pub fn start(&mut self) -> Result<(), TimerError> {
        let rate = self.config().rate;
        self.timer.arm(rate)
    }

    /// Current broadcast settings from the cached variable values.
    pub fn config(&self) -> BroadcastConfig {
        BroadcastConfig {
            enable: self.store.get_u32(self.handles.enable) != 0,
            rate: self.store.get_u32(self.handles.rate),
            port: u16::try_from(self.store.get_u32(self.handles.port)).unwrap_or(0),
            interfaces: self.store.get_str(self.handles.interfaces).to_string(),
            template: self.template.clone(),
        }
    }

    pub fn stats(&self) -> StatsCounter {
        self.stats
    }

    pub fn timer(&self) -> &TimerManager {
        &self.timer
    }

    /// Dispatches events until the channel closes.
    pub async fn run(mut self, mut events: EventReceiver) {
        info!("Dispatcher running");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Event channel closed, dispatcher exiting");
    }

    /// Handles a single event to completion.
    pub async fn handle(&mut self, event: Event) {
        debug!("Handling {:?}", event);
        match event {
            Event::TimerExpired => self.broadcast().await,
            Event::VariableChanged(handle) => self.on_variable_changed(handle).await,
            Event::ReportRequested(id) => self.on_report_requested(id),
        }
    }

    async fn broadcast(&mut self) {
        let config = self.config();
        let verbose = self.store.get_u32(self.handles.verbose) != 0;
        let outcome = self
            .cycle
            .run(&mut self.store, self.handles.ip, &config, &mut self.stats, verbose)
            .await;
        debug!(
            "Cycle done: {} sent, {} failed (totals tx={} err={})",
            outcome.sent,
            outcome.failed,
            self.stats.txcount(),
            self.stats.errcount()
        );
    }

    async fn on_variable_changed(&mut self, handle: VarHandle) {
        let Some(action) = self.store.on_change(handle) else {
            warn!("Change notification for unregistered variable {}", handle);
            return;
        };
        if let Err(e) = self.store.refresh(handle) {
            warn!("Cannot refresh {}: {}", handle, e);
        }

        match action {
            OnChange::Nothing => {
                if let (Some(name), Some(value)) = (self.store.name(handle), self.store.get(handle)) {
                    debug!("{} is now {}", name, value);
                }
            }
            OnChange::RearmTimer => {
                let rate = self.store.get_u32(self.handles.rate);
                // A failed re-arm leaves the timer disarmed until the next rate change.
                if let Err(e) = self.timer.arm(rate) {
                    error!("Cannot re-arm timer at {}s, periodic broadcast stopped: {}", rate, e);
                }
            }
            OnChange::Broadcast => self.broadcast().await,
        }
    }

    fn on_report_requested(&mut self, id: SessionId) {
        let session = match self.store.store().open_report_session(id) {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot open report session {}: {}", id, e);
                return;
            }
        };
        if session.handle() != self.handles.metrics {
            debug!("Report session {} is not for the metrics variable", id);
            return;
        }
        match self.stats.snapshot(&self.config()).to_json() {
            Ok(body) => session.write(body),
            Err(e) => error!("Cannot serialize report: {}", e),
        }
    }
}
