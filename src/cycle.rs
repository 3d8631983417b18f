//! One broadcast cycle: publish IP, render, send, account, for every
//! eligible interface in enumeration order.
//!
//! The template is re-rendered per interface right after that interface's
//! address has been published, so one template yields a different payload
//! on every interface.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::interfaces::{self, InterfaceSource};
use crate::network::Broadcaster;
use crate::stats::StatsCounter;
use crate::store::{ConfigStore, VarHandle, VarValue};
use crate::template::{Payload, Render};

/// Broadcast settings derived from the current variable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub enable: bool,
    /// Seconds between periodic broadcasts, `0` for none.
    pub rate: u32,
    pub port: u16,
    pub interfaces: String,
    pub template: PathBuf,
}

/// What one cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub sent: usize,
    pub failed: usize,
}

pub struct BroadcastCycle {
    renderer: Box<dyn Render>,
    interfaces: Box<dyn InterfaceSource>,
    broadcaster: Box<dyn Broadcaster>,
    payload: Payload,
}

impl BroadcastCycle {
    /// Wires up the collaborators and allocates the render staging buffer.
    ///
    /// # Errors
    /// Returns [`RenderError::Alloc`] if the staging buffer cannot be allocated.
    pub fn new(
        renderer: Box<dyn Render>,
        interfaces: Box<dyn InterfaceSource>,
        broadcaster: Box<dyn Broadcaster>,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            renderer,
            interfaces,
            broadcaster,
            payload: Payload::new()?,
        })
    }

    /// Runs one cycle to completion.
    ///
    /// Does nothing when broadcasting is disabled. Failures are logged and
    /// counted per interface; they never abort the cycle.
    ///
    /// # Arguments
    /// * `store` - Where each interface's address is published before rendering.
    /// * `ip_var` - Handle of the variable that receives the address.
    /// * `config` - Current broadcast settings.
    /// * `stats` - Counters to account sends and failures in.
    /// * `verbose` - Log every send at `info` instead of `debug`.
    pub async fn run(
        &mut self,
        store: &mut ConfigStore,
        ip_var: VarHandle,
        config: &BroadcastConfig,
        stats: &mut StatsCounter,
        verbose: bool,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if !config.enable {
            debug!("Broadcast disabled, skipping cycle");
            return outcome;
        }

        let eligible = interfaces::filter(self.interfaces.list(), &config.interfaces);
        debug!("Broadcasting to {} interface address(es)", eligible.len());

        for iface in eligible {
            let host = iface.local_host();
            if let Err(e) = store.set(ip_var, VarValue::Str(host.clone())) {
                warn!("Cannot publish address {} of {}: {}", host, iface.name, e);
                stats.record_err();
                outcome.failed += 1;
                continue;
            }

            self.payload.clear();
            if let Err(e) = self.renderer.render(&config.template, &mut self.payload) {
                warn!("Template error for {} ({}): {}", iface.name, host, e);
                stats.record_err();
                outcome.failed += 1;
                continue;
            }

            let destination = iface.destination(config.port);
            match self.broadcaster.send(destination, self.payload.as_bytes()).await {
                Ok(sent) => {
                    stats.record_tx();
                    outcome.sent += 1;
                    if verbose {
                        info!("Sent {} bytes on {} ({}) to {}", sent, iface.name, iface.family, destination);
                    } else {
                        debug!("Sent {} bytes on {} ({}) to {}", sent, iface.name, iface.family, destination);
                    }
                }
                Err(e) => {
                    warn!("Broadcast on {} failed: {}", iface.name, e);
                    stats.record_err();
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
