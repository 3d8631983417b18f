//! Transmit/error accounting and the on-demand report.

use serde::Serialize;

use crate::cycle::BroadcastConfig;

/// Process-lifetime counters. Only the dispatcher mutates them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsCounter {
    txcount: u64,
    errcount: u64,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tx(&mut self) {
        self.txcount += 1;
    }

    pub fn record_err(&mut self) {
        self.errcount += 1;
    }

    pub fn txcount(&self) -> u64 {
        self.txcount
    }

    pub fn errcount(&self) -> u64 {
        self.errcount
    }

    /// Point-in-time report combining the counters with the live configuration.
    pub fn snapshot(&self, config: &BroadcastConfig) -> Report {
        Report {
            enabled: if config.enable { "yes" } else { "no" }.to_string(),
            port: config.port,
            txrate: config.rate,
            txcount: self.txcount,
            errcount: self.errcount,
            interfaces: config.interfaces.clone(),
        }
    }
}

/// The metrics report, serialized as a flat JSON object in field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub enabled: String,
    pub port: u16,
    pub txrate: u32,
    pub txcount: u64,
    pub errcount: u64,
    pub interfaces: String,
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
